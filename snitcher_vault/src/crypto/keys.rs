//! Snitcher Vault - Key Material

use rand::RngCore;
use secrecy::{ExposeSecret, Secret};

use crate::error::{VaultError, VaultResult};

/// Key length for AES-256
pub const KEY_LEN: usize = 32;

/// Secret key bytes, zeroized on drop
pub struct FileKey {
    inner: Secret<[u8; KEY_LEN]>,
}

impl FileKey {
    pub fn new(bytes: [u8; KEY_LEN]) -> Self {
        Self {
            inner: Secret::new(bytes),
        }
    }

    /// Rebuild a key from an unwrapped blob
    pub fn from_slice(bytes: &[u8]) -> VaultResult<Self> {
        let bytes: [u8; KEY_LEN] = bytes.try_into().map_err(|_| {
            VaultError::InvalidFileFormat(format!(
                "key blob is {} bytes, expected {}",
                bytes.len(),
                KEY_LEN
            ))
        })?;
        Ok(Self::new(bytes))
    }

    /// Expose the key bytes (use with caution)
    pub fn expose(&self) -> &[u8; KEY_LEN] {
        self.inner.expose_secret()
    }

    /// Generate a random key
    pub fn generate() -> Self {
        Self::new(random_bytes())
    }
}

impl std::fmt::Debug for FileKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("FileKey([REDACTED])")
    }
}

/// Fill an array from the thread CSPRNG
pub fn random_bytes<const N: usize>() -> [u8; N] {
    let mut bytes = [0u8; N];
    rand::thread_rng().fill_bytes(&mut bytes);
    bytes
}
