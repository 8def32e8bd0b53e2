//! Error types for the Snitcher keystore

use thiserror::Error;

#[derive(Debug, Error)]
pub enum KeystoreError {
    #[error("Key store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("Alias already in use: {0}")]
    AliasExists(String),

    #[error("No key under alias: {0}")]
    KeyNotFound(String),

    #[error("Unsupported key policy: {0}")]
    UnsupportedPolicy(String),

    #[error("Key {alias} is not authorized for {mode}")]
    IncompatiblePurpose { alias: String, mode: String },

    #[error("User not authenticated for key {0}")]
    UserNotAuthenticated(String),

    #[error("Authorization window for key {0} has expired")]
    AuthenticationExpired(String),

    #[error("Key {0} permanently invalidated by enrollment change")]
    KeyInvalidated(String),

    #[error("Caller-provided IV not permitted in encrypt mode")]
    CallerProvidedIv,

    #[error("Invalid IV length: expected {expected}, got {actual}")]
    InvalidIv { expected: usize, actual: usize },

    #[error("Authentication tag mismatch - ciphertext or IV tampered")]
    TagMismatch,

    #[error("Crypto error: {0}")]
    Crypto(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid key store JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),

    #[error("Invalid base64: {0}")]
    Base64(#[from] base64::DecodeError),
}

pub type KeystoreResult<T> = std::result::Result<T, KeystoreError>;

impl KeystoreError {
    /// Errors raised while creating or looking up key material
    pub fn is_provisioning(&self) -> bool {
        matches!(
            self,
            Self::StoreUnavailable(_)
                | Self::AliasExists(_)
                | Self::KeyNotFound(_)
                | Self::UnsupportedPolicy(_)
                | Self::Io(_)
                | Self::InvalidJson(_)
                | Self::Base64(_)
        )
    }

    /// Errors that a fresh user authentication would clear
    pub fn is_authorization(&self) -> bool {
        matches!(
            self,
            Self::UserNotAuthenticated(_) | Self::AuthenticationExpired(_)
        )
    }

    pub fn is_security_critical(&self) -> bool {
        matches!(self, Self::TagMismatch | Self::KeyInvalidated(_))
    }
}
