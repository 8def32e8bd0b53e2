//! Snitcher Vault - User Store
//!
//! One account per install. On sign-up the first user of the bundled
//! template becomes that account and its password field is replaced with
//! the base64 of the encrypted login secret.

use std::path::Path;

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use serde::{Deserialize, Serialize};

use crate::error::{VaultError, VaultResult};
use crate::secure_fs::SecureFs;

/// Template shipped with the app
const BUNDLED_TEMPLATE: &str = include_str!("../assets/users.json");

/// Store file name under the data directory
const USERS_FILE: &str = "users.dat";

/// One account record
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct UserRecord {
    pub username: String,
    /// Base64 of the encrypted login secret
    pub password: String,
}

impl UserRecord {
    /// Decode the stored password into ciphertext bytes
    pub fn password_bytes(&self) -> VaultResult<Vec<u8>> {
        Ok(BASE64.decode(&self.password)?)
    }
}

/// Bundled template document: `{ "users": [...] }`
#[derive(Deserialize)]
struct TemplateDocument {
    users: Vec<UserRecord>,
}

/// Account template; only the first listed user is used
#[derive(Debug, Clone)]
pub struct UserTemplate {
    user: UserRecord,
}

impl UserTemplate {
    /// Template bundled into the binary
    pub fn bundled() -> VaultResult<Self> {
        Self::from_json(BUNDLED_TEMPLATE)
    }

    pub fn from_json(json: &str) -> VaultResult<Self> {
        let document: TemplateDocument =
            serde_json::from_str(json).map_err(|e| VaultError::TemplateLoad(e.to_string()))?;

        let user = document
            .users
            .into_iter()
            .next()
            .ok_or_else(|| VaultError::TemplateLoad("template has no users".into()))?;

        Ok(Self { user })
    }

    pub fn user(&self) -> &UserRecord {
        &self.user
    }

    /// The account record, password set to `encrypted_secret`
    pub fn instantiate(self, encrypted_secret: &[u8]) -> UserRecord {
        UserRecord {
            password: BASE64.encode(encrypted_secret),
            ..self.user
        }
    }
}

/// Persistent single-account slot
#[derive(Debug, Clone)]
pub struct UserStore {
    fs: SecureFs,
}

impl UserStore {
    pub fn new(data_dir: &Path) -> Self {
        Self {
            fs: SecureFs::new(data_dir),
        }
    }

    pub fn is_signed_up(&self) -> bool {
        self.fs.exists(USERS_FILE)
    }

    /// Fill the slot, replacing any previous account
    pub fn save(&self, user: &UserRecord) -> VaultResult<()> {
        let data = bincode::serialize(user)
            .map_err(|e| VaultError::SerializationError(e.to_string()))?;
        self.fs.write_file(USERS_FILE, &data)?;

        log::debug!("Saved user record {}", user.username);
        Ok(())
    }

    /// The account, or `None` before sign-up
    pub fn load(&self) -> VaultResult<Option<UserRecord>> {
        if !self.is_signed_up() {
            return Ok(None);
        }

        let data = self.fs.read_file(USERS_FILE)?;
        Ok(Some(bincode::deserialize(&data)?))
    }
}
