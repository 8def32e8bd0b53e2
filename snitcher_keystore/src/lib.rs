//! # Snitcher Keystore
//!
//! Alias-addressed secret keys that never leave the store.
//!
//! ## Capabilities:
//! - AES-256 keys restricted to GCM without padding
//! - Per-key policy: purposes, user-authentication requirement, validity window
//! - One-shot authorization signal ("biometric check just succeeded")
//! - Enrollment invalidation of authentication-bound keys
//! - Cipher primitive: `init_cipher(mode, key, iv?)` → `do_final(bytes)`
//!
//! The store hands out [`KeyHandle`]s, never raw key bytes. All cryptographic
//! work on stored keys happens inside a [`CipherContext`].

pub mod error;
pub mod clock;
pub mod crypto;
pub mod policy;
pub mod store;

// Re-exports
pub use error::{KeystoreError, KeystoreResult};
pub use clock::{Clock, ManualClock, SystemClock};
pub use crypto::{CipherContext, CipherMode, GCM_IV_LEN, GCM_TAG_LEN, KEY_LEN};
pub use policy::{BlockMode, KeyPolicy, KeyPurposes, Padding, MAX_AUTH_VALIDITY_SECONDS};
pub use store::{KeyHandle, KeyStore, SoftwareKeyStore};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Provider name reported in logs
pub const PROVIDER: &str = "SnitcherSoftwareKeyStore";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert_eq!(VERSION, "1.0.0");
    }
}
