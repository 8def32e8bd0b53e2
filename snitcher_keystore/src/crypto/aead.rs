//! AEAD cipher context - AES-256-GCM, 96-bit IV, 128-bit tag, no padding

use std::fmt;

use aes_gcm::{
    aead::{generic_array::GenericArray, Aead, KeyInit},
    Aes256Gcm, Nonce,
};

use crate::error::{KeystoreError, KeystoreResult};

/// Key length for AES-256
pub const KEY_LEN: usize = 32;

/// IV length for AES-GCM
pub const GCM_IV_LEN: usize = 12;

/// GCM authentication tag length (128 bits)
pub const GCM_TAG_LEN: usize = 16;

/// Direction of a cipher context
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CipherMode {
    Encrypt,
    Decrypt,
}

impl CipherMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Encrypt => "encrypt",
            Self::Decrypt => "decrypt",
        }
    }
}

impl fmt::Display for CipherMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An initialized, single-use cipher over one stored key.
///
/// In encrypt mode the IV is generated here and must be read back with
/// [`CipherContext::iv`] before the ciphertext is stored. Callers cannot
/// choose an encryption IV, so an IV can never be reused under the same key.
pub struct CipherContext {
    alias: String,
    mode: CipherMode,
    cipher: Aes256Gcm,
    iv: [u8; GCM_IV_LEN],
}

impl CipherContext {
    pub(crate) fn new(
        alias: &str,
        mode: CipherMode,
        key: &[u8; KEY_LEN],
        iv: Option<&[u8]>,
    ) -> KeystoreResult<Self> {
        let iv = match (mode, iv) {
            (CipherMode::Encrypt, Some(_)) => return Err(KeystoreError::CallerProvidedIv),
            (CipherMode::Encrypt, None) => generate_iv()?,
            (CipherMode::Decrypt, None) => {
                return Err(KeystoreError::InvalidIv {
                    expected: GCM_IV_LEN,
                    actual: 0,
                })
            }
            (CipherMode::Decrypt, Some(iv)) => {
                let iv: [u8; GCM_IV_LEN] = iv.try_into().map_err(|_| KeystoreError::InvalidIv {
                    expected: GCM_IV_LEN,
                    actual: iv.len(),
                })?;
                iv
            }
        };

        Ok(Self {
            alias: alias.to_string(),
            mode,
            cipher: Aes256Gcm::new(GenericArray::from_slice(key)),
            iv,
        })
    }

    /// IV bound to this context
    pub fn iv(&self) -> &[u8; GCM_IV_LEN] {
        &self.iv
    }

    pub fn mode(&self) -> CipherMode {
        self.mode
    }

    pub fn alias(&self) -> &str {
        &self.alias
    }

    /// Encrypt (ciphertext || tag) or decrypt-and-verify, consuming the context
    pub fn do_final(self, input: &[u8]) -> KeystoreResult<Vec<u8>> {
        let nonce = Nonce::from_slice(&self.iv);

        match self.mode {
            CipherMode::Encrypt => self
                .cipher
                .encrypt(nonce, input)
                .map_err(|e| KeystoreError::Crypto(format!("AES-GCM encryption failed: {}", e))),
            CipherMode::Decrypt => {
                if input.len() < GCM_TAG_LEN {
                    return Err(KeystoreError::TagMismatch);
                }
                self.cipher
                    .decrypt(nonce, input)
                    .map_err(|_| KeystoreError::TagMismatch)
            }
        }
    }
}

impl fmt::Debug for CipherContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CipherContext")
            .field("alias", &self.alias)
            .field("mode", &self.mode)
            .finish_non_exhaustive()
    }
}

fn generate_iv() -> KeystoreResult<[u8; GCM_IV_LEN]> {
    let mut iv = [0u8; GCM_IV_LEN];
    getrandom::getrandom(&mut iv)
        .map_err(|e| KeystoreError::Crypto(format!("RNG failed: {}", e)))?;
    Ok(iv)
}
