//! Snitcher Vault - Credential Vault
//!
//! Protects the login secret with a key that lives in the key store and is
//! usable only for a short window after a successful user authentication.
//! The vault never sees key bytes: it asks the store for a cipher, keeps the
//! IV the cipher produced, and hands back ciphertext.

use std::sync::Arc;

use chrono::Duration;
use rand::rngs::OsRng;
use rand::RngCore;
use secrecy::SecretVec;
use snitcher_keystore::{CipherMode, KeyHandle, KeyPolicy, KeyStore};
use zeroize::Zeroizing;

use crate::error::{VaultError, VaultResult};
use crate::settings::{self, SettingsStore};

/// Key store alias of the login key
pub const LOGIN_KEY_ALIAS: &str = "SnitcherLoginKey";

/// Length of the random login secret
pub const LOGIN_SECRET_LEN: usize = 256;

/// Vault state as seen by the key store
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VaultState {
    /// No login key provisioned yet
    NoKey,
    /// Key exists, no live authorization (never authenticated, expired, invalidated)
    Locked,
    /// Key usable for `remaining` more
    Unlocked { remaining: Duration },
}

/// Credential vault over an injected key store and settings store
pub struct CredentialVault {
    keystore: Arc<dyn KeyStore>,
    settings: Arc<dyn SettingsStore>,
    validity_seconds: u64,
}

impl CredentialVault {
    pub fn new(
        keystore: Arc<dyn KeyStore>,
        settings: Arc<dyn SettingsStore>,
        validity_seconds: u64,
    ) -> Self {
        Self {
            keystore,
            settings,
            validity_seconds,
        }
    }

    pub fn keystore(&self) -> &Arc<dyn KeyStore> {
        &self.keystore
    }

    // ═══════════════════════════════════════════════════════════════════════
    // KEY PROVISIONING
    // ═══════════════════════════════════════════════════════════════════════

    /// Provision the login key. Fails if it already exists.
    pub fn generate_key(&self) -> VaultResult<()> {
        self.keystore
            .generate_key(LOGIN_KEY_ALIAS, KeyPolicy::auth_bound(self.validity_seconds))?;

        log::info!(
            "Login key provisioned ({}s authorization window)",
            self.validity_seconds
        );
        Ok(())
    }

    pub fn has_key(&self) -> bool {
        self.keystore.contains_alias(LOGIN_KEY_ALIAS)
    }

    pub fn state(&self) -> VaultState {
        let key = match self.keystore.get_key(LOGIN_KEY_ALIAS) {
            Ok(key) => key,
            Err(_) => return VaultState::NoKey,
        };

        match self.keystore.authorization_remaining(&key) {
            Some(remaining) => VaultState::Unlocked { remaining },
            None => VaultState::Locked,
        }
    }

    // ═══════════════════════════════════════════════════════════════════════
    // LOGIN SECRET
    // ═══════════════════════════════════════════════════════════════════════

    /// Generate a fresh random secret, encrypt it, save the IV and return
    /// ciphertext with the tag appended.
    pub fn create_login_secret(&self) -> VaultResult<Vec<u8>> {
        let mut secret = Zeroizing::new(vec![0u8; LOGIN_SECRET_LEN]);
        OsRng.fill_bytes(&mut secret);

        self.seal_secret(&secret)
    }

    /// Decrypt a login secret produced by [`Self::create_login_secret`]
    pub fn unlock_login_secret(&self, ciphertext: &[u8]) -> VaultResult<SecretVec<u8>> {
        let iv = settings::iv(self.settings.as_ref())?.ok_or(VaultError::MissingIv)?;
        let key = self.login_key()?;

        let cipher = self
            .keystore
            .init_cipher(CipherMode::Decrypt, &key, Some(&iv))?;
        let plaintext = cipher.do_final(ciphertext)?;

        log::debug!("Login secret unlocked");
        Ok(SecretVec::new(plaintext))
    }

    pub(crate) fn seal_secret(&self, plaintext: &[u8]) -> VaultResult<Vec<u8>> {
        let key = self.login_key()?;

        let cipher = self.keystore.init_cipher(CipherMode::Encrypt, &key, None)?;
        let iv = *cipher.iv();
        let ciphertext = cipher.do_final(plaintext)?;

        settings::save_iv(self.settings.as_ref(), &iv)?;

        log::debug!("Login secret sealed ({} bytes)", ciphertext.len());
        Ok(ciphertext)
    }

    fn login_key(&self) -> VaultResult<KeyHandle> {
        Ok(self.keystore.get_key(LOGIN_KEY_ALIAS)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::MemorySettings;
    use secrecy::ExposeSecret;
    use snitcher_keystore::{ManualClock, SoftwareKeyStore};

    struct Fixture {
        vault: CredentialVault,
        keystore: Arc<SoftwareKeyStore>,
        settings: Arc<MemorySettings>,
        clock: Arc<ManualClock>,
    }

    fn fixture() -> Fixture {
        let clock = Arc::new(ManualClock::default());
        let keystore = Arc::new(SoftwareKeyStore::with_clock(clock.clone()));
        let settings = Arc::new(MemorySettings::new());
        let vault = CredentialVault::new(keystore.clone(), settings.clone(), 120);

        Fixture {
            vault,
            keystore,
            settings,
            clock,
        }
    }

    fn provisioned() -> Fixture {
        let f = fixture();
        f.vault.generate_key().unwrap();
        f.keystore.record_user_authentication();
        f
    }

    #[test]
    fn test_login_secret_roundtrip() {
        let f = provisioned();

        let ciphertext = f.vault.create_login_secret().unwrap();
        assert_eq!(ciphertext.len(), LOGIN_SECRET_LEN + 16);
        assert_eq!(settings::iv(f.settings.as_ref()).unwrap().unwrap().len(), 12);

        let plaintext = f.vault.unlock_login_secret(&ciphertext).unwrap();
        assert_eq!(plaintext.expose_secret().len(), LOGIN_SECRET_LEN);
    }

    #[test]
    fn test_known_plaintext_roundtrip() {
        let f = provisioned();

        let ciphertext = f.vault.seal_secret(b"correct horse").unwrap();
        let plaintext = f.vault.unlock_login_secret(&ciphertext).unwrap();
        assert_eq!(plaintext.expose_secret().as_slice(), b"correct horse");
    }

    #[test]
    fn test_ciphertext_bit_flip_rejected() {
        let f = provisioned();
        let ciphertext = f.vault.create_login_secret().unwrap();

        for index in [0, LOGIN_SECRET_LEN / 2, ciphertext.len() - 1] {
            let mut tampered = ciphertext.clone();
            tampered[index] ^= 0x01;
            assert!(matches!(
                f.vault.unlock_login_secret(&tampered),
                Err(VaultError::Cipher(_))
            ));
        }
    }

    #[test]
    fn test_iv_bit_flip_rejected() {
        let f = provisioned();
        let ciphertext = f.vault.create_login_secret().unwrap();

        let mut iv = settings::iv(f.settings.as_ref()).unwrap().unwrap();
        iv[0] ^= 0x80;
        settings::save_iv(f.settings.as_ref(), &iv).unwrap();

        assert!(matches!(
            f.vault.unlock_login_secret(&ciphertext),
            Err(VaultError::Cipher(_))
        ));
    }

    #[test]
    fn test_missing_iv() {
        let f = provisioned();
        assert!(matches!(
            f.vault.unlock_login_secret(&[0u8; 32]),
            Err(VaultError::MissingIv)
        ));
    }

    #[test]
    fn test_second_generate_fails() {
        let f = fixture();
        f.vault.generate_key().unwrap();

        let err = f.vault.generate_key().unwrap_err();
        assert!(matches!(err, VaultError::KeyProvisioning(_)));
    }

    #[test]
    fn test_requires_authentication() {
        let f = fixture();
        f.vault.generate_key().unwrap();

        assert!(matches!(
            f.vault.create_login_secret(),
            Err(VaultError::AuthenticationExpired(_))
        ));
    }

    #[test]
    fn test_window_expiry() {
        let f = provisioned();
        let ciphertext = f.vault.create_login_secret().unwrap();

        f.clock.advance_secs(121);
        match f.vault.unlock_login_secret(&ciphertext) {
            Err(err) => {
                assert!(matches!(err, VaultError::AuthenticationExpired(_)));
                assert!(err.requires_reauthentication());
            }
            Ok(_) => panic!("unlock succeeded after the window lapsed"),
        }

        f.keystore.record_user_authentication();
        assert!(f.vault.unlock_login_secret(&ciphertext).is_ok());
    }

    #[test]
    fn test_enrollment_change_invalidates() {
        let f = provisioned();
        let ciphertext = f.vault.create_login_secret().unwrap();

        f.keystore.invalidate_enrollment().unwrap();
        f.keystore.record_user_authentication();

        assert!(matches!(
            f.vault.unlock_login_secret(&ciphertext),
            Err(VaultError::Cipher(_))
        ));
    }

    #[test]
    fn test_state_transitions() {
        let f = fixture();
        assert_eq!(f.vault.state(), VaultState::NoKey);
        assert!(!f.vault.has_key());

        f.vault.generate_key().unwrap();
        assert_eq!(f.vault.state(), VaultState::Locked);

        f.keystore.record_user_authentication();
        match f.vault.state() {
            VaultState::Unlocked { remaining } => assert_eq!(remaining.num_seconds(), 120),
            other => panic!("unexpected state {:?}", other),
        }

        f.clock.advance_secs(200);
        assert_eq!(f.vault.state(), VaultState::Locked);
    }
}
