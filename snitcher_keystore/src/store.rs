//! Key store - alias-addressed keys, authorization windows, cipher init
//!
//! ```text
//! generate_key(alias, policy) ──► KeyHandle { alias, policy }
//!                                      │
//! record_user_authentication() ──► window opens (policy.validity seconds)
//!                                      │
//! init_cipher(mode, &handle, iv?) ─► CipherContext ─► do_final(bytes)
//! ```

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use chrono::{DateTime, Duration, TimeDelta, Utc};
use parking_lot::RwLock;
use rand::RngCore;
use secrecy::{ExposeSecret, SecretBox};
use serde::{Deserialize, Serialize};
use zeroize::{Zeroize, Zeroizing};

use crate::clock::{Clock, SystemClock};
use crate::crypto::{CipherContext, CipherMode, KEY_LEN};
use crate::error::{KeystoreError, KeystoreResult};
use crate::policy::KeyPolicy;

/// On-disk format version
const STORE_FORMAT_VERSION: u32 = 1;

/// Opaque reference to a stored key. Carries no key material.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyHandle {
    alias: String,
    policy: KeyPolicy,
}

impl KeyHandle {
    pub fn alias(&self) -> &str {
        &self.alias
    }

    pub fn policy(&self) -> &KeyPolicy {
        &self.policy
    }
}

/// Capability-backed key store
pub trait KeyStore: Send + Sync {
    /// Create a new key. Never overwrites: a taken alias is an error.
    fn generate_key(&self, alias: &str, policy: KeyPolicy) -> KeystoreResult<KeyHandle>;

    fn get_key(&self, alias: &str) -> KeystoreResult<KeyHandle>;

    fn contains_alias(&self, alias: &str) -> bool;

    fn delete_key(&self, alias: &str) -> KeystoreResult<()>;

    /// Initialize a cipher over `key`. Encrypt mode takes no IV; decrypt mode requires one.
    fn init_cipher(
        &self,
        mode: CipherMode,
        key: &KeyHandle,
        iv: Option<&[u8]>,
    ) -> KeystoreResult<CipherContext>;

    /// A user authentication (biometric or device credential) just succeeded
    fn record_user_authentication(&self);

    /// Time left in the authorization window, `None` when the key is not usable now
    fn authorization_remaining(&self, key: &KeyHandle) -> Option<Duration>;

    /// A new biometric was enrolled: authentication-bound keys become unusable
    fn invalidate_enrollment(&self) -> KeystoreResult<usize>;
}

struct KeyEntry {
    material: SecretBox<[u8; KEY_LEN]>,
    policy: KeyPolicy,
    created_at: DateTime<Utc>,
    invalidated: bool,
}

#[derive(Serialize, Deserialize)]
struct PersistedEntry {
    alias: String,
    key: String,
    policy: KeyPolicy,
    created_at: DateTime<Utc>,
    #[serde(default)]
    invalidated: bool,
}

#[derive(Serialize, Deserialize)]
struct PersistedStore {
    version: u32,
    entries: Vec<PersistedEntry>,
}

/// Software-backed key store.
///
/// Keys live in memory and, when opened with a path, in a JSON file readable
/// only by the owner. The authorization timestamp is never persisted: a new
/// process starts unauthenticated.
pub struct SoftwareKeyStore {
    entries: RwLock<HashMap<String, KeyEntry>>,
    last_authentication: RwLock<Option<DateTime<Utc>>>,
    path: Option<PathBuf>,
    clock: Arc<dyn Clock>,
}

impl SoftwareKeyStore {
    /// Volatile store
    pub fn in_memory() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    /// Volatile store with an injected clock
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            last_authentication: RwLock::new(None),
            path: None,
            clock,
        }
    }

    /// Open (or create) a store persisted at `path`
    pub fn open<P: AsRef<Path>>(path: P) -> KeystoreResult<Self> {
        Self::open_with_clock(path, Arc::new(SystemClock))
    }

    pub fn open_with_clock<P: AsRef<Path>>(path: P, clock: Arc<dyn Clock>) -> KeystoreResult<Self> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| {
                KeystoreError::StoreUnavailable(format!("{}: {}", parent.display(), e))
            })?;
        }

        let entries = if path.exists() {
            Self::load(&path)?
        } else {
            HashMap::new()
        };

        tracing::debug!(path = %path.display(), keys = entries.len(), "key store opened");

        Ok(Self {
            entries: RwLock::new(entries),
            last_authentication: RwLock::new(None),
            path: Some(path),
            clock,
        })
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    fn load(path: &Path) -> KeystoreResult<HashMap<String, KeyEntry>> {
        let data = Zeroizing::new(fs::read(path).map_err(|e| {
            KeystoreError::StoreUnavailable(format!("{}: {}", path.display(), e))
        })?);
        let persisted: PersistedStore = serde_json::from_slice(&data)?;

        if persisted.version != STORE_FORMAT_VERSION {
            return Err(KeystoreError::StoreUnavailable(format!(
                "unsupported key store version {}",
                persisted.version
            )));
        }

        let mut entries = HashMap::with_capacity(persisted.entries.len());
        for mut entry in persisted.entries {
            let mut raw = BASE64.decode(entry.key.as_bytes())?;
            entry.key.zeroize();

            if raw.len() != KEY_LEN {
                raw.zeroize();
                return Err(KeystoreError::StoreUnavailable(format!(
                    "key {} has invalid length",
                    entry.alias
                )));
            }

            let mut material = [0u8; KEY_LEN];
            material.copy_from_slice(&raw);
            raw.zeroize();

            entries.insert(
                entry.alias,
                KeyEntry {
                    material: SecretBox::new(Box::new(material)),
                    policy: entry.policy,
                    created_at: entry.created_at,
                    invalidated: entry.invalidated,
                },
            );
        }

        Ok(entries)
    }

    fn flush(&self, entries: &HashMap<String, KeyEntry>) -> KeystoreResult<()> {
        let path = match &self.path {
            Some(path) => path,
            None => return Ok(()),
        };

        let persisted = PersistedStore {
            version: STORE_FORMAT_VERSION,
            entries: entries
                .iter()
                .map(|(alias, entry)| PersistedEntry {
                    alias: alias.clone(),
                    key: BASE64.encode(entry.material.expose_secret()),
                    policy: entry.policy.clone(),
                    created_at: entry.created_at,
                    invalidated: entry.invalidated,
                })
                .collect(),
        };

        let json = Zeroizing::new(serde_json::to_vec_pretty(&persisted)?);
        for mut entry in persisted.entries {
            entry.key.zeroize();
        }

        let temp_path = path.with_extension("tmp");
        write_private(&temp_path, &json)
            .and_then(|_| fs::rename(&temp_path, path))
            .map_err(|e| KeystoreError::StoreUnavailable(format!("{}: {}", path.display(), e)))
    }

    fn check_authorization(&self, alias: &str, policy: &KeyPolicy) -> KeystoreResult<()> {
        if !policy.user_authentication_required {
            return Ok(());
        }

        let authenticated_at = match *self.last_authentication.read() {
            Some(at) => at,
            None => return Err(KeystoreError::UserNotAuthenticated(alias.to_string())),
        };

        let window = policy.validity_window();
        if self.clock.now() - authenticated_at > window {
            tracing::warn!(alias, "authorization window expired");
            return Err(KeystoreError::AuthenticationExpired(alias.to_string()));
        }

        Ok(())
    }
}

impl KeyStore for SoftwareKeyStore {
    fn generate_key(&self, alias: &str, policy: KeyPolicy) -> KeystoreResult<KeyHandle> {
        policy.validate()?;

        let mut entries = self.entries.write();
        if entries.contains_key(alias) {
            return Err(KeystoreError::AliasExists(alias.to_string()));
        }

        let mut material = [0u8; KEY_LEN];
        rand::rngs::OsRng.fill_bytes(&mut material);

        entries.insert(
            alias.to_string(),
            KeyEntry {
                material: SecretBox::new(Box::new(material)),
                policy: policy.clone(),
                created_at: self.clock.now(),
                invalidated: false,
            },
        );
        material.zeroize();

        if let Err(e) = self.flush(&entries) {
            entries.remove(alias);
            return Err(e);
        }

        tracing::info!(
            alias,
            auth_required = policy.user_authentication_required,
            validity_secs = policy.authentication_validity_seconds,
            "generated key"
        );

        Ok(KeyHandle {
            alias: alias.to_string(),
            policy,
        })
    }

    fn get_key(&self, alias: &str) -> KeystoreResult<KeyHandle> {
        self.entries
            .read()
            .get(alias)
            .map(|entry| KeyHandle {
                alias: alias.to_string(),
                policy: entry.policy.clone(),
            })
            .ok_or_else(|| KeystoreError::KeyNotFound(alias.to_string()))
    }

    fn contains_alias(&self, alias: &str) -> bool {
        self.entries.read().contains_key(alias)
    }

    fn delete_key(&self, alias: &str) -> KeystoreResult<()> {
        let mut entries = self.entries.write();
        if entries.remove(alias).is_none() {
            return Err(KeystoreError::KeyNotFound(alias.to_string()));
        }
        self.flush(&entries)?;
        tracing::info!(alias, "deleted key");
        Ok(())
    }

    fn init_cipher(
        &self,
        mode: CipherMode,
        key: &KeyHandle,
        iv: Option<&[u8]>,
    ) -> KeystoreResult<CipherContext> {
        let entries = self.entries.read();
        let entry = entries
            .get(key.alias())
            .ok_or_else(|| KeystoreError::KeyNotFound(key.alias().to_string()))?;

        if entry.invalidated {
            return Err(KeystoreError::KeyInvalidated(key.alias().to_string()));
        }

        let permitted = match mode {
            CipherMode::Encrypt => entry.policy.purposes.encrypt,
            CipherMode::Decrypt => entry.policy.purposes.decrypt,
        };
        if !permitted {
            return Err(KeystoreError::IncompatiblePurpose {
                alias: key.alias().to_string(),
                mode: mode.to_string(),
            });
        }

        self.check_authorization(key.alias(), &entry.policy)?;

        tracing::debug!(alias = key.alias(), %mode, "cipher initialized");
        CipherContext::new(key.alias(), mode, entry.material.expose_secret(), iv)
    }

    fn record_user_authentication(&self) {
        *self.last_authentication.write() = Some(self.clock.now());
        tracing::debug!("user authentication recorded");
    }

    fn authorization_remaining(&self, key: &KeyHandle) -> Option<Duration> {
        let entries = self.entries.read();
        let entry = entries.get(key.alias())?;

        if entry.invalidated {
            return None;
        }
        if !entry.policy.user_authentication_required {
            return Some(TimeDelta::MAX);
        }

        let authenticated_at = (*self.last_authentication.read())?;
        let window = entry.policy.validity_window();
        let remaining = window - (self.clock.now() - authenticated_at);

        if remaining < Duration::zero() {
            None
        } else {
            Some(remaining)
        }
    }

    fn invalidate_enrollment(&self) -> KeystoreResult<usize> {
        let mut entries = self.entries.write();
        let mut count = 0;

        for entry in entries.values_mut() {
            if entry.policy.user_authentication_required && !entry.invalidated {
                entry.invalidated = true;
                count += 1;
            }
        }

        if count > 0 {
            self.flush(&entries)?;
            tracing::warn!(count, "authentication-bound keys invalidated by enrollment change");
        }

        Ok(count)
    }
}

fn write_private(path: &Path, data: &[u8]) -> std::io::Result<()> {
    fs::write(path, data)?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(path, fs::Permissions::from_mode(0o600))?;
    }

    Ok(())
}
