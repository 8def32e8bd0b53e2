//! Snitcher Vault - Error Types

use snitcher_keystore::KeystoreError;
use thiserror::Error;

/// Result type for vault operations
pub type VaultResult<T> = Result<T, VaultError>;

/// Vault error types
#[derive(Error, Debug)]
pub enum VaultError {
    // ═══════════════════════════════════════════════════════════════
    // KEY STORE / CIPHER ERRORS
    // ═══════════════════════════════════════════════════════════════

    #[error("Key provisioning failed: {0}")]
    KeyProvisioning(String),

    #[error("Cipher error: {0}")]
    Cipher(String),

    #[error("Authorization expired: {0}")]
    AuthenticationExpired(String),

    #[error("No saved initialization vector")]
    MissingIv,

    #[error("Key derivation failed: {0}")]
    KeyDerivationFailed(String),

    // ═══════════════════════════════════════════════════════════════
    // AUTHENTICATION ERRORS
    // ═══════════════════════════════════════════════════════════════

    #[error("Biometric authentication failed")]
    BiometricFailed,

    #[error("Biometric authentication unavailable: {0}")]
    BiometricUnavailable(String),

    #[error("Authentication error: {0}")]
    AuthenticationError(String),

    #[error("Invalid email address")]
    InvalidEmail,

    // ═══════════════════════════════════════════════════════════════
    // USER STORE ERRORS
    // ═══════════════════════════════════════════════════════════════

    #[error("User template could not be loaded: {0}")]
    TemplateLoad(String),

    #[error("No user is signed up")]
    NotSignedUp,

    #[error("Stored credentials rejected")]
    CredentialsRejected,

    // ═══════════════════════════════════════════════════════════════
    // FILE ERRORS
    // ═══════════════════════════════════════════════════════════════

    #[error("File not found: {0}")]
    FileNotFound(String),

    #[error("File already exists: {0}")]
    FileAlreadyExists(String),

    #[error("Invalid file format: {0}")]
    InvalidFileFormat(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    // ═══════════════════════════════════════════════════════════════
    // REPORT ERRORS
    // ═══════════════════════════════════════════════════════════════

    #[error("A report is already being sent")]
    SubmissionInProgress,

    #[error("Report not found: {0}")]
    ReportNotFound(String),

    #[error("Worker failed: {0}")]
    Worker(String),

    // ═══════════════════════════════════════════════════════════════
    // CONFIG / SERIALIZATION ERRORS
    // ═══════════════════════════════════════════════════════════════

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("Deserialization error: {0}")]
    DeserializationError(String),
}

impl VaultError {
    /// Check if this is a security-critical error
    pub fn is_security_critical(&self) -> bool {
        matches!(
            self,
            VaultError::Cipher(_) | VaultError::CredentialsRejected
        )
    }

    /// Check if a fresh biometric prompt would let the caller retry
    pub fn requires_reauthentication(&self) -> bool {
        matches!(
            self,
            VaultError::AuthenticationExpired(_) | VaultError::BiometricFailed
        )
    }

    /// Check if this error came from creating or retrieving key material
    pub fn is_provisioning(&self) -> bool {
        matches!(self, VaultError::KeyProvisioning(_))
    }
}

impl From<KeystoreError> for VaultError {
    fn from(e: KeystoreError) -> Self {
        if e.is_provisioning() {
            VaultError::KeyProvisioning(e.to_string())
        } else if e.is_authorization() {
            VaultError::AuthenticationExpired(e.to_string())
        } else {
            VaultError::Cipher(e.to_string())
        }
    }
}

impl From<serde_json::Error> for VaultError {
    fn from(e: serde_json::Error) -> Self {
        VaultError::SerializationError(e.to_string())
    }
}

impl From<bincode::Error> for VaultError {
    fn from(e: bincode::Error) -> Self {
        VaultError::DeserializationError(e.to_string())
    }
}

impl From<base64::DecodeError> for VaultError {
    fn from(e: base64::DecodeError) -> Self {
        VaultError::DeserializationError(e.to_string())
    }
}
