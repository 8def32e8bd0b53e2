//! Key policies - what a stored key may be used for, and when

use chrono::Duration;
use serde::{Deserialize, Serialize};

use crate::error::{KeystoreError, KeystoreResult};

/// Longest authorization window a key may carry (one hour)
pub const MAX_AUTH_VALIDITY_SECONDS: u64 = 3600;

/// Block mode a key is restricted to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BlockMode {
    Gcm,
    Cbc,
    Ctr,
}

impl Default for BlockMode {
    fn default() -> Self {
        Self::Gcm
    }
}

impl BlockMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Gcm => "GCM",
            Self::Cbc => "CBC",
            Self::Ctr => "CTR",
        }
    }
}

/// Encryption padding a key is restricted to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Padding {
    None,
    Pkcs7,
}

impl Default for Padding {
    fn default() -> Self {
        Self::None
    }
}

/// Purposes a key may serve
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyPurposes {
    pub encrypt: bool,
    pub decrypt: bool,
}

impl Default for KeyPurposes {
    fn default() -> Self {
        Self {
            encrypt: true,
            decrypt: true,
        }
    }
}

/// Policy fixed at key generation time
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyPolicy {
    pub purposes: KeyPurposes,
    pub block_mode: BlockMode,
    pub padding: Padding,

    /// Every use requires a recent user authentication
    pub user_authentication_required: bool,

    /// How long one authentication keeps the key usable (seconds)
    pub authentication_validity_seconds: u64,
}

impl Default for KeyPolicy {
    fn default() -> Self {
        Self {
            purposes: KeyPurposes::default(),
            block_mode: BlockMode::Gcm,
            padding: Padding::None,
            user_authentication_required: false,
            authentication_validity_seconds: 0,
        }
    }
}

impl KeyPolicy {
    /// GCM/no-padding key usable for `validity_seconds` after each authentication
    pub fn auth_bound(validity_seconds: u64) -> Self {
        Self {
            user_authentication_required: true,
            authentication_validity_seconds: validity_seconds,
            ..Default::default()
        }
    }

    /// GCM/no-padding key with no authentication gate (master keys)
    pub fn unrestricted() -> Self {
        Self::default()
    }

    /// Rejects anything other than a usable AES-GCM/no-padding policy
    pub fn validate(&self) -> KeystoreResult<()> {
        if self.block_mode != BlockMode::Gcm {
            return Err(KeystoreError::UnsupportedPolicy(format!(
                "block mode {} (only GCM)",
                self.block_mode.as_str()
            )));
        }

        if self.padding != Padding::None {
            return Err(KeystoreError::UnsupportedPolicy(
                "GCM keys take no padding".into(),
            ));
        }

        if !self.purposes.encrypt && !self.purposes.decrypt {
            return Err(KeystoreError::UnsupportedPolicy("key has no purpose".into()));
        }

        if self.user_authentication_required && self.authentication_validity_seconds == 0 {
            return Err(KeystoreError::UnsupportedPolicy(
                "authentication-bound key needs a validity window".into(),
            ));
        }

        if self.authentication_validity_seconds > MAX_AUTH_VALIDITY_SECONDS {
            return Err(KeystoreError::UnsupportedPolicy(format!(
                "validity window {}s exceeds {}s",
                self.authentication_validity_seconds, MAX_AUTH_VALIDITY_SECONDS
            )));
        }

        Ok(())
    }

    /// Authorization window, capped at [`MAX_AUTH_VALIDITY_SECONDS`]
    pub fn validity_window(&self) -> Duration {
        let secs = self.authentication_validity_seconds.min(MAX_AUTH_VALIDITY_SECONDS);
        i64::try_from(secs)
            .ok()
            .and_then(Duration::try_seconds)
            .unwrap_or_else(Duration::zero)
    }
}
