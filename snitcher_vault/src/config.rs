//! Snitcher Vault - Configuration

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use snitcher_keystore::MAX_AUTH_VALIDITY_SECONDS;

use crate::error::{VaultError, VaultResult};

/// Runtime configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct SnitcherConfig {
    /// Private app data: users, settings, key store, sealed reports
    pub data_dir: PathBuf,
    /// Scratch space, purged when the report screen goes away
    pub cache_dir: PathBuf,
    /// Seconds a login key stays usable after one authentication
    pub auth_validity_seconds: u64,
    /// Endpoint reports are addressed to
    pub report_endpoint: String,
    pub application_id: u64,
    pub provider_id: u64,
}

impl Default for SnitcherConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("snitcher-data"),
            cache_dir: PathBuf::from("snitcher-data/cache"),
            auth_validity_seconds: 120,
            report_endpoint: "https://example.com/?send_report".into(),
            application_id: 46341,
            provider_id: 46341,
        }
    }
}

impl SnitcherConfig {
    /// Load from a JSON file, falling back to defaults when it does not exist
    pub fn load<P: AsRef<Path>>(path: P) -> VaultResult<Self> {
        let path = path.as_ref();

        if !path.exists() {
            log::debug!("No config at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let data = std::fs::read(path)?;
        let config: Self = serde_json::from_slice(&data)
            .map_err(|e| VaultError::Config(format!("{}: {}", path.display(), e)))?;
        config.validate()?;

        Ok(config)
    }

    /// Defaults rooted at `data_dir`
    pub fn with_data_dir<P: AsRef<Path>>(data_dir: P) -> Self {
        let data_dir = data_dir.as_ref().to_path_buf();
        Self {
            cache_dir: data_dir.join("cache"),
            data_dir,
            ..Self::default()
        }
    }

    pub fn validate(&self) -> VaultResult<()> {
        if self.auth_validity_seconds == 0 {
            return Err(VaultError::Config(
                "auth_validity_seconds must be positive".into(),
            ));
        }
        if self.auth_validity_seconds > MAX_AUTH_VALIDITY_SECONDS {
            return Err(VaultError::Config(format!(
                "auth_validity_seconds must not exceed {}",
                MAX_AUTH_VALIDITY_SECONDS
            )));
        }
        if self.report_endpoint.is_empty() {
            return Err(VaultError::Config("report_endpoint is empty".into()));
        }
        self.report_application_id()?;
        Ok(())
    }

    /// Application id sent with reports: `application_id * provider_id`
    pub fn report_application_id(&self) -> VaultResult<u64> {
        self.application_id
            .checked_mul(self.provider_id)
            .ok_or_else(|| VaultError::Config("application_id * provider_id overflows".into()))
    }

    pub fn users_path(&self) -> PathBuf {
        self.data_dir.join("users.dat")
    }

    pub fn settings_path(&self) -> PathBuf {
        self.data_dir.join("settings.json")
    }

    pub fn keystore_path(&self) -> PathBuf {
        self.data_dir.join("keystore.json")
    }

    pub fn reports_dir(&self) -> PathBuf {
        self.data_dir.join("reports")
    }
}
