//! Snitcher Vault - Login Flow
//!
//! Sign-up provisions the login key, seals a fresh secret and stores it as
//! the account password. Later logins unseal that secret; a non-empty plaintext
//! means the key store accepted the fresh authentication.

use std::sync::{Arc, OnceLock};

use chrono::{DateTime, Utc};
use regex_lite::Regex;
use secrecy::ExposeSecret;

use crate::biometrics::{self, BiometricAuthenticator};
use crate::error::{VaultError, VaultResult};
use crate::settings::{self, SettingsStore};
use crate::users::{UserStore, UserTemplate};
use crate::vault::CredentialVault;

const EMAIL_PATTERN: &str = r"^[A-Za-z0-9._%+\-]+@[A-Za-z0-9.\-]+\.[A-Za-z]{2,4}$";

/// How a successful login ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoginOutcome {
    /// First run: account created
    SignedUp,
    /// Existing account unlocked; `last_login` is the previous login, if any
    LoggedIn { last_login: Option<DateTime<Utc>> },
}

fn email_regex() -> Option<&'static Regex> {
    static EMAIL_RE: OnceLock<Option<Regex>> = OnceLock::new();

    EMAIL_RE
        .get_or_init(|| match Regex::new(EMAIL_PATTERN) {
            Ok(re) => Some(re),
            Err(e) => {
                log::error!("Email pattern failed to compile: {e}");
                None
            }
        })
        .as_ref()
}

/// Check an email address against the sign-up pattern
pub fn validate_email(email: &str) -> VaultResult<()> {
    match email_regex() {
        Some(re) if !email.is_empty() && re.is_match(email) => Ok(()),
        _ => Err(VaultError::InvalidEmail),
    }
}

pub struct LoginService {
    vault: Arc<CredentialVault>,
    users: UserStore,
    settings: Arc<dyn SettingsStore>,
}

impl LoginService {
    pub fn new(
        vault: Arc<CredentialVault>,
        users: UserStore,
        settings: Arc<dyn SettingsStore>,
    ) -> Self {
        Self {
            vault,
            users,
            settings,
        }
    }

    pub fn is_signed_up(&self) -> bool {
        self.users.is_signed_up()
    }

    /// Full flow: email check, biometric prompt, then sign-up or unlock
    pub fn login(
        &self,
        email: &str,
        authenticator: &dyn BiometricAuthenticator,
    ) -> VaultResult<LoginOutcome> {
        let signed_up = self.check_email(email)?;

        biometrics::authenticate(authenticator, self.vault.keystore().as_ref())?;

        self.finish(signed_up)
    }

    /// Flow for callers that ran the prompt themselves and already recorded
    /// the authentication on the key store
    pub fn complete_login(&self, email: &str) -> VaultResult<LoginOutcome> {
        let signed_up = self.check_email(email)?;
        self.finish(signed_up)
    }

    fn check_email(&self, email: &str) -> VaultResult<bool> {
        let signed_up = self.users.is_signed_up();
        if !signed_up {
            validate_email(email)?;
        }
        Ok(signed_up)
    }

    fn finish(&self, signed_up: bool) -> VaultResult<LoginOutcome> {
        let previous = settings::last_logged_in(self.settings.as_ref())?;

        let outcome = if signed_up {
            self.unlock_existing()?;
            LoginOutcome::LoggedIn {
                last_login: previous,
            }
        } else {
            self.sign_up()?;
            LoginOutcome::SignedUp
        };

        settings::save_last_logged_in(self.settings.as_ref(), Utc::now())?;
        Ok(outcome)
    }

    fn sign_up(&self) -> VaultResult<()> {
        // Template first: a broken template must not leave a key behind
        let template = UserTemplate::bundled()?;

        // A key without an account is left over from an interrupted sign-up
        if !self.vault.has_key() {
            self.vault.generate_key()?;
        }

        let encrypted = self.vault.create_login_secret()?;
        self.users.save(&template.instantiate(&encrypted))?;

        log::info!("Sign-up complete");
        Ok(())
    }

    fn unlock_existing(&self) -> VaultResult<()> {
        let user = self.users.load()?.ok_or(VaultError::NotSignedUp)?;
        let ciphertext = user.password_bytes()?;
        let secret = self.vault.unlock_login_secret(&ciphertext)?;

        if secret.expose_secret().is_empty() {
            log::warn!("Stored credentials rejected");
            return Err(VaultError::CredentialsRejected);
        }

        log::info!("Login complete");
        Ok(())
    }
}
