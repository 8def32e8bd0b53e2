//! Cipher primitive - AES-256-GCM over keys held by the store

mod aead;

pub use aead::{CipherContext, CipherMode, GCM_IV_LEN, GCM_TAG_LEN, KEY_LEN};
