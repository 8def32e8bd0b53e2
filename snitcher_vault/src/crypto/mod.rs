//! Snitcher Vault - Cryptographic Core
//!
//! Streaming AEAD for sealed report files: AES-256-GCM segments under a key
//! derived per file with HKDF-SHA256.

pub mod keys;
pub mod aead;
pub mod hkdf;

pub use keys::*;
pub use aead::*;
pub use hkdf::*;
