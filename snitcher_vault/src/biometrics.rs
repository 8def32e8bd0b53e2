//! Snitcher Vault - Biometric Authentication
//!
//! Boundary to the platform's biometric prompt. The core never touches
//! biometric hardware: it asks an authenticator for a one-shot outcome and,
//! on success, opens the key store's authorization window.

use serde::{Deserialize, Serialize};
use snitcher_keystore::KeyStore;

use crate::error::{VaultError, VaultResult};

/// What the platform reports about biometric capability
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum BiometricStatus {
    /// Enrolled biometric hardware is ready
    Available,
    /// No biometric hardware: fall back to the device credential
    NoHardware,
    /// Hardware present but currently unusable
    HardwareUnavailable,
    /// Hardware present, nothing enrolled
    NoneEnrolled,
    Unknown,
}

/// Prompt shown to the user
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PromptInfo {
    pub title: String,
    pub subtitle: String,
    /// Negative button label; absent when the device credential is allowed
    pub negative_button: Option<String>,
    /// Accept PIN/pattern/password instead of a biometric
    pub device_credential_allowed: bool,
}

impl PromptInfo {
    /// Biometric prompt with an "account password" escape hatch
    pub fn biometric() -> Self {
        Self {
            title: "Biometric login for Snitcher".into(),
            subtitle: "Log in using your biometric credential".into(),
            negative_button: Some("Use account password".into()),
            device_credential_allowed: false,
        }
    }

    /// Prompt that accepts the device credential
    pub fn device_credential() -> Self {
        Self {
            title: "Biometric login for Snitcher".into(),
            subtitle: "Log in using your biometric credential".into(),
            negative_button: None,
            device_credential_allowed: true,
        }
    }

    /// Pick the prompt for a capability status, or refuse
    pub fn for_status(status: BiometricStatus) -> VaultResult<Self> {
        match status {
            BiometricStatus::Available => Ok(Self::biometric()),
            BiometricStatus::NoHardware => Ok(Self::device_credential()),
            BiometricStatus::HardwareUnavailable => Err(VaultError::BiometricUnavailable(
                "biometric features are currently unavailable".into(),
            )),
            BiometricStatus::NoneEnrolled => Err(VaultError::BiometricUnavailable(
                "associate a biometric credential with your account".into(),
            )),
            BiometricStatus::Unknown => Err(VaultError::BiometricUnavailable(
                "unknown error, check biometric settings".into(),
            )),
        }
    }
}

/// Result of one prompt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthOutcome {
    Succeeded,
    /// Biometric not recognized
    Failed,
    /// Prompt aborted (cancelled, lockout, hardware error)
    Error { code: i32, message: String },
}

/// Platform biometric capability
pub trait BiometricAuthenticator {
    fn status(&self) -> BiometricStatus;

    fn authenticate(&self, prompt: &PromptInfo) -> AuthOutcome;
}

/// Run the prompt and, on success, open the authorization window on `keystore`
pub fn authenticate(
    authenticator: &dyn BiometricAuthenticator,
    keystore: &dyn KeyStore,
) -> VaultResult<()> {
    let prompt = PromptInfo::for_status(authenticator.status())?;

    match authenticator.authenticate(&prompt) {
        AuthOutcome::Succeeded => {
            keystore.record_user_authentication();
            log::info!("Authentication succeeded");
            Ok(())
        }
        AuthOutcome::Failed => {
            log::warn!("Authentication failed");
            Err(VaultError::BiometricFailed)
        }
        AuthOutcome::Error { code, message } => {
            log::warn!("Authentication error {}: {}", code, message);
            Err(VaultError::AuthenticationError(message))
        }
    }
}

/// Authenticator with a predetermined answer (headless runs, tests)
#[derive(Debug, Clone)]
pub struct FixedAuthenticator {
    status: BiometricStatus,
    outcome: AuthOutcome,
}

impl FixedAuthenticator {
    pub fn new(status: BiometricStatus, outcome: AuthOutcome) -> Self {
        Self { status, outcome }
    }

    pub fn succeeding() -> Self {
        Self::new(BiometricStatus::Available, AuthOutcome::Succeeded)
    }

    pub fn failing() -> Self {
        Self::new(BiometricStatus::Available, AuthOutcome::Failed)
    }
}

impl BiometricAuthenticator for FixedAuthenticator {
    fn status(&self) -> BiometricStatus {
        self.status
    }

    fn authenticate(&self, _prompt: &PromptInfo) -> AuthOutcome {
        self.outcome.clone()
    }
}
