//! Snitcher Vault - HKDF Key Derivation

use hkdf::Hkdf;
use sha2::Sha256;

use super::keys::{FileKey, KEY_LEN};
use crate::error::{VaultError, VaultResult};

/// Derive a key using HKDF-SHA256
pub fn derive_key(ikm: &[u8], salt: &[u8], info: &[u8]) -> VaultResult<FileKey> {
    let hk = Hkdf::<Sha256>::new(Some(salt), ikm);
    let mut okm = [0u8; KEY_LEN];

    hk.expand(info, &mut okm)
        .map_err(|e| VaultError::KeyDerivationFailed(e.to_string()))?;

    Ok(FileKey::new(okm))
}

/// Per-file segment key. The file name is bound in, so a renamed file no
/// longer decrypts.
pub fn derive_segment_key(keyset: &FileKey, salt: &[u8], file_name: &str) -> VaultResult<FileKey> {
    derive_key(keyset.expose(), salt, file_name.as_bytes())
}
