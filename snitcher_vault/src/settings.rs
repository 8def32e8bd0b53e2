//! Snitcher Vault - Durable Settings
//!
//! Small key-value store for values kept outside the key store: the login
//! IV, the last-logged-in timestamp and the sealer's wrapped keyset.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use chrono::{DateTime, Local, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::error::{VaultError, VaultResult};
use crate::secure_fs::write_atomic;

/// Well-known setting keys
pub mod keys {
    /// IV produced when the login secret was encrypted
    pub const IV: &str = "iv";

    /// RFC 3339 timestamp of the last successful login
    pub const LAST_LOGGED_IN: &str = "last_logged_in";

    /// Streaming keyset wrapped by the file master key
    pub const FILE_KEYSET: &str = "__snitcher_encrypted_file_keyset__";
}

/// Key-value settings storage
pub trait SettingsStore: Send + Sync {
    fn get(&self, key: &str) -> VaultResult<Option<Vec<u8>>>;

    fn set(&self, key: &str, value: &[u8]) -> VaultResult<()>;

    fn remove(&self, key: &str) -> VaultResult<()>;
}

/// Volatile settings, for tests and ephemeral sessions
#[derive(Debug, Default)]
pub struct MemorySettings {
    values: RwLock<BTreeMap<String, Vec<u8>>>,
}

impl MemorySettings {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SettingsStore for MemorySettings {
    fn get(&self, key: &str) -> VaultResult<Option<Vec<u8>>> {
        Ok(self.values.read().get(key).cloned())
    }

    fn set(&self, key: &str, value: &[u8]) -> VaultResult<()> {
        self.values.write().insert(key.to_string(), value.to_vec());
        Ok(())
    }

    fn remove(&self, key: &str) -> VaultResult<()> {
        self.values.write().remove(key);
        Ok(())
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct SettingsFile {
    values: BTreeMap<String, String>,
}

/// Settings persisted as a JSON map of base64 values
#[derive(Debug)]
pub struct FileSettings {
    path: PathBuf,
    values: RwLock<BTreeMap<String, Vec<u8>>>,
}

impl FileSettings {
    /// Open (or start) a settings file at `path`
    pub fn open<P: AsRef<Path>>(path: P) -> VaultResult<Self> {
        let path = path.as_ref().to_path_buf();

        let values = if path.exists() {
            let data = std::fs::read(&path)?;
            let file: SettingsFile = serde_json::from_slice(&data)
                .map_err(|e| VaultError::DeserializationError(e.to_string()))?;

            file.values
                .into_iter()
                .map(|(k, v)| Ok((k, BASE64.decode(v)?)))
                .collect::<VaultResult<BTreeMap<_, _>>>()?
        } else {
            BTreeMap::new()
        };

        Ok(Self {
            path,
            values: RwLock::new(values),
        })
    }

    fn persist(&self, values: &BTreeMap<String, Vec<u8>>) -> VaultResult<()> {
        let file = SettingsFile {
            values: values
                .iter()
                .map(|(k, v)| (k.clone(), BASE64.encode(v)))
                .collect(),
        };
        write_atomic(&self.path, &serde_json::to_vec_pretty(&file)?)
    }
}

impl SettingsStore for FileSettings {
    fn get(&self, key: &str) -> VaultResult<Option<Vec<u8>>> {
        Ok(self.values.read().get(key).cloned())
    }

    fn set(&self, key: &str, value: &[u8]) -> VaultResult<()> {
        let mut values = self.values.write();
        let previous = values.insert(key.to_string(), value.to_vec());

        if let Err(e) = self.persist(&values) {
            match previous {
                Some(old) => values.insert(key.to_string(), old),
                None => values.remove(key),
            };
            return Err(e);
        }
        Ok(())
    }

    fn remove(&self, key: &str) -> VaultResult<()> {
        let mut values = self.values.write();
        if let Some(old) = values.remove(key) {
            if let Err(e) = self.persist(&values) {
                values.insert(key.to_string(), old);
                return Err(e);
            }
        }
        Ok(())
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// Typed helpers
// ═══════════════════════════════════════════════════════════════════════════

pub fn save_iv(store: &dyn SettingsStore, iv: &[u8]) -> VaultResult<()> {
    store.set(keys::IV, iv)
}

pub fn iv(store: &dyn SettingsStore) -> VaultResult<Option<Vec<u8>>> {
    store.get(keys::IV)
}

/// Record `at` as the last successful login
pub fn save_last_logged_in(store: &dyn SettingsStore, at: DateTime<Utc>) -> VaultResult<()> {
    store.set(keys::LAST_LOGGED_IN, at.to_rfc3339().as_bytes())
}

pub fn last_logged_in(store: &dyn SettingsStore) -> VaultResult<Option<DateTime<Utc>>> {
    let raw = match store.get(keys::LAST_LOGGED_IN)? {
        Some(raw) => raw,
        None => return Ok(None),
    };

    let text = String::from_utf8(raw)
        .map_err(|e| VaultError::DeserializationError(e.to_string()))?;
    let at = DateTime::parse_from_rfc3339(&text)
        .map_err(|e| VaultError::DeserializationError(e.to_string()))?;

    Ok(Some(at.with_timezone(&Utc)))
}

/// Human-readable local rendering of a login timestamp
pub fn display_timestamp(at: DateTime<Utc>) -> String {
    at.with_timezone(&Local).format("%Y-%m-%d %H:%M:%S").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_memory_settings() {
        let store = MemorySettings::new();
        assert!(iv(&store).unwrap().is_none());

        save_iv(&store, &[1, 2, 3]).unwrap();
        assert_eq!(iv(&store).unwrap().unwrap(), vec![1, 2, 3]);

        store.remove(keys::IV).unwrap();
        assert!(iv(&store).unwrap().is_none());
    }

    #[test]
    fn test_file_settings_persist() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("settings.json");

        {
            let store = FileSettings::open(&path).unwrap();
            save_iv(&store, &[0xFF, 0x00, 0x10]).unwrap();
        }

        let store = FileSettings::open(&path).unwrap();
        assert_eq!(iv(&store).unwrap().unwrap(), vec![0xFF, 0x00, 0x10]);

        // Values are base64 at rest
        let raw = std::fs::read_to_string(&path).unwrap();
        assert!(raw.contains("/wAQ"));
    }

    #[test]
    fn test_last_logged_in_roundtrip() {
        let store = MemorySettings::new();
        assert!(last_logged_in(&store).unwrap().is_none());

        let now = Utc::now();
        save_last_logged_in(&store, now).unwrap();
        let loaded = last_logged_in(&store).unwrap().unwrap();
        assert_eq!(loaded.timestamp(), now.timestamp());
    }

    #[test]
    fn test_failed_write_keeps_previous_value() {
        let dir = tempdir().unwrap();
        let data_dir = dir.path().join("data");
        let store = FileSettings::open(data_dir.join("settings.json")).unwrap();
        save_iv(&store, &[1, 1, 1]).unwrap();

        // Directory replaced by a plain file: every write now fails
        std::fs::remove_dir_all(&data_dir).unwrap();
        std::fs::write(&data_dir, b"").unwrap();

        assert!(save_iv(&store, &[2, 2, 2]).is_err());
        assert_eq!(iv(&store).unwrap().unwrap(), vec![1, 1, 1]);

        assert!(store.set("fresh", b"x").is_err());
        assert!(store.get("fresh").unwrap().is_none());

        assert!(store.remove(keys::IV).is_err());
        assert_eq!(iv(&store).unwrap().unwrap(), vec![1, 1, 1]);
    }

    #[test]
    fn test_corrupt_settings_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, b"{").unwrap();
        assert!(FileSettings::open(&path).is_err());
    }
}
