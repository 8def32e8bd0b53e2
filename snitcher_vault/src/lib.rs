//! # Snitcher Vault
//!
//! Local credential protection and file encryption for the Snitcher app.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │                       SNITCHER                           │
//! │  ┌─────────────┐  ┌─────────────┐  ┌─────────────────┐  │
//! │  │  BIOMETRICS │  │ CREDENTIAL  │  │  REPORT SEALER  │  │
//! │  │  + LOGIN    │  │ VAULT (GCM) │  │  (AES-GCM-HKDF) │  │
//! │  └──────┬──────┘  └──────┬──────┘  └────────┬────────┘  │
//! │         │                │                   │           │
//! │  ┌──────┴────────────────┴───────────────────┴────────┐ │
//! │  │                  SNITCHER KEYSTORE                  │ │
//! │  │     SnitcherLoginKey (auth-bound) / master key      │ │
//! │  └─────────────────────────────────────────────────────┘ │
//! │                                                          │
//! │  ┌─────────────┐  ┌─────────────┐  ┌─────────────────┐  │
//! │  │  SETTINGS   │  │ USER STORE  │  │  JPEG CHECK     │  │
//! │  │  (iv, ...)  │  │  (bincode)  │  │  (SOI / EOI)    │  │
//! │  └─────────────┘  └─────────────┘  └─────────────────┘  │
//! └─────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Security Model
//!
//! - Login secret encrypted under a key usable only shortly after authentication
//! - Key bytes never leave the key store; IVs come from the cipher, never the caller
//! - Reports sealed in 4 KiB AES-256-GCM segments, key derived per file via HKDF
//! - Attachments accepted only with JPEG start and end markers

pub mod crypto;
pub mod vault;
pub mod secure_fs;
pub mod settings;
pub mod config;
pub mod biometrics;
pub mod users;
pub mod login;
pub mod sealer;
pub mod jpeg;
pub mod reports;
pub mod error;
pub mod api;

#[cfg(feature = "android")]
pub mod android;

pub use error::{VaultError, VaultResult};
pub use config::SnitcherConfig;
pub use vault::{CredentialVault, VaultState, LOGIN_KEY_ALIAS};
pub use settings::{display_timestamp, FileSettings, MemorySettings, SettingsStore};
pub use biometrics::{AuthOutcome, BiometricAuthenticator, BiometricStatus, FixedAuthenticator, PromptInfo};
pub use users::{UserRecord, UserStore, UserTemplate};
pub use login::{LoginOutcome, LoginService};
pub use sealer::{ReportSealer, SealedReportFile, SealedWriter, MASTER_KEY_ALIAS};
pub use jpeg::{has_jpeg_signature, is_well_formed_jpeg, ImageSignatureWindow};
pub use reports::{
    purge_cache, sanitize_report, ReportReceipt, ReportService, ReportSubmission, ReportTracker,
    REPORT_CATEGORIES,
};
pub use api::{Snitcher, SnitcherStatus};

/// Snitcher version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert_eq!(VERSION, "1.0.0");
    }
}
