//! Snitcher Vault - Filesystem Helpers
//!
//! Atomic writes for small state files and cache purging.

use std::fs::{self, File, OpenOptions};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use walkdir::WalkDir;

use crate::error::{VaultError, VaultResult};

/// Filesystem handler rooted at the app's data directory
#[derive(Debug, Clone)]
pub struct SecureFs {
    root: PathBuf,
}

impl SecureFs {
    /// Create new SecureFs with root directory
    pub fn new(root: &Path) -> Self {
        Self {
            root: root.to_path_buf(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Get full path for a relative file
    pub fn full_path(&self, relative: &str) -> PathBuf {
        self.root.join(relative)
    }

    /// Write file atomically (temp file, fsync, rename)
    pub fn write_file(&self, relative_path: &str, data: &[u8]) -> VaultResult<()> {
        write_atomic(&self.full_path(relative_path), data)
    }

    /// Read file
    pub fn read_file(&self, relative_path: &str) -> VaultResult<Vec<u8>> {
        let path = self.full_path(relative_path);

        if !path.exists() {
            return Err(VaultError::FileNotFound(path.display().to_string()));
        }

        let mut file = File::open(&path)?;
        let mut data = Vec::new();
        file.read_to_end(&mut data)?;

        Ok(data)
    }

    /// Check if file exists
    pub fn exists(&self, relative_path: &str) -> bool {
        self.full_path(relative_path).exists()
    }
}

/// Write `data` to `path` through a sibling temp file
pub fn write_atomic(path: &Path, data: &[u8]) -> VaultResult<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }

    let temp_path = path.with_extension("tmp");

    {
        let mut file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&temp_path)?;

        file.write_all(data)?;
        file.sync_all()?;
    }

    fs::rename(&temp_path, path)?;

    Ok(())
}

/// Remove everything below `dir`, keeping `dir` itself. Returns files removed.
pub fn purge_dir(dir: &Path) -> VaultResult<usize> {
    if !dir.exists() {
        return Ok(0);
    }

    let mut removed = 0;

    // Deepest entries first so directories are empty when reached
    for entry in WalkDir::new(dir).min_depth(1).contents_first(true) {
        let entry = entry.map_err(|e| VaultError::IoError(e.into()))?;
        if entry.file_type().is_dir() {
            fs::remove_dir(entry.path())?;
        } else {
            fs::remove_file(entry.path())?;
            removed += 1;
        }
    }

    Ok(removed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_secure_fs() {
        let dir = tempdir().unwrap();
        let fs = SecureFs::new(dir.path());

        fs.write_file("state/users.dat", b"record").unwrap();
        assert!(fs.exists("state/users.dat"));
        assert!(!fs.exists("state/users.tmp"));

        let data = fs.read_file("state/users.dat").unwrap();
        assert_eq!(data, b"record");

        fs.write_file("state/users.dat", b"replaced").unwrap();
        assert_eq!(fs.read_file("state/users.dat").unwrap(), b"replaced");
    }

    #[test]
    fn test_read_missing_file() {
        let dir = tempdir().unwrap();
        let fs = SecureFs::new(dir.path());
        assert!(matches!(
            fs.read_file("missing"),
            Err(VaultError::FileNotFound(_))
        ));
    }

    #[test]
    fn test_purge_dir() {
        let dir = tempdir().unwrap();
        let cache = dir.path().join("cache");
        std::fs::create_dir_all(cache.join("nested/deeper")).unwrap();
        std::fs::write(cache.join("temp.jpg"), b"x").unwrap();
        std::fs::write(cache.join("nested/a"), b"x").unwrap();
        std::fs::write(cache.join("nested/deeper/b"), b"x").unwrap();

        assert_eq!(purge_dir(&cache).unwrap(), 3);
        assert!(cache.exists());
        assert_eq!(std::fs::read_dir(&cache).unwrap().count(), 0);
    }

    #[test]
    fn test_purge_missing_dir() {
        let dir = tempdir().unwrap();
        assert_eq!(purge_dir(&dir.path().join("absent")).unwrap(), 0);
    }
}
