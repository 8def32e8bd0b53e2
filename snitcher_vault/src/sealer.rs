//! Snitcher Vault - Sealed Report Files
//!
//! Report files are encrypted at rest with a streaming AEAD. The streaming
//! keyset is a random key wrapped by a master key in the key store and
//! persisted in settings; both are created on first use and reused after.

use std::fs::{self, File, OpenOptions};
use std::io::{self, BufWriter, ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::RwLock;
use snitcher_keystore::{CipherMode, KeyHandle, KeyPolicy, KeyStore, GCM_IV_LEN};
use zeroize::Zeroizing;

use crate::crypto::{
    derive_segment_key, FileKey, SegmentCipher, StreamHeader, HEADER_LEN, SEGMENT_SIZE,
    TAG_LEN,
};
use crate::error::{VaultError, VaultResult};
use crate::settings::{keys, SettingsStore};

/// Key store alias of the file master key
pub const MASTER_KEY_ALIAS: &str = "_androidx_security_master_key_";

/// Hands out sealed file handles under one lazily provisioned keyset
pub struct ReportSealer {
    keystore: Arc<dyn KeyStore>,
    settings: Arc<dyn SettingsStore>,
    keyset: RwLock<Option<Arc<FileKey>>>,
}

impl ReportSealer {
    pub fn new(keystore: Arc<dyn KeyStore>, settings: Arc<dyn SettingsStore>) -> Self {
        Self {
            keystore,
            settings,
            keyset: RwLock::new(None),
        }
    }

    /// Bind a sealed file handle to `path`
    pub fn seal<P: AsRef<Path>>(&self, path: P) -> VaultResult<SealedReportFile> {
        let path = path.as_ref().to_path_buf();
        let file_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| VaultError::InvalidFileFormat(path.display().to_string()))?
            .to_string();

        Ok(SealedReportFile {
            path,
            file_name,
            keyset: self.keyset()?,
        })
    }

    fn keyset(&self) -> VaultResult<Arc<FileKey>> {
        if let Some(keyset) = self.keyset.read().as_ref() {
            return Ok(keyset.clone());
        }

        let mut slot = self.keyset.write();
        if let Some(keyset) = slot.as_ref() {
            return Ok(keyset.clone());
        }

        let master = self.master_key()?;
        let keyset = Arc::new(match self.settings.get(keys::FILE_KEYSET)? {
            Some(blob) => self.unwrap_keyset(&master, &blob)?,
            None => self.create_keyset(&master)?,
        });

        *slot = Some(keyset.clone());
        Ok(keyset)
    }

    fn master_key(&self) -> VaultResult<KeyHandle> {
        if self.keystore.contains_alias(MASTER_KEY_ALIAS) {
            return Ok(self.keystore.get_key(MASTER_KEY_ALIAS)?);
        }

        let handle = self
            .keystore
            .generate_key(MASTER_KEY_ALIAS, KeyPolicy::unrestricted())?;
        log::info!("File master key provisioned");
        Ok(handle)
    }

    fn create_keyset(&self, master: &KeyHandle) -> VaultResult<FileKey> {
        let keyset = FileKey::generate();

        let cipher = self.keystore.init_cipher(CipherMode::Encrypt, master, None)?;
        let mut blob = cipher.iv().to_vec();
        blob.extend(cipher.do_final(keyset.expose())?);

        self.settings.set(keys::FILE_KEYSET, &blob)?;
        log::info!("Streaming keyset created");
        Ok(keyset)
    }

    fn unwrap_keyset(&self, master: &KeyHandle, blob: &[u8]) -> VaultResult<FileKey> {
        if blob.len() < GCM_IV_LEN {
            return Err(VaultError::InvalidFileFormat("keyset blob too short".into()));
        }
        let (iv, wrapped) = blob.split_at(GCM_IV_LEN);

        let cipher = self
            .keystore
            .init_cipher(CipherMode::Decrypt, master, Some(iv))?;
        let raw = Zeroizing::new(cipher.do_final(wrapped)?);

        FileKey::from_slice(&raw)
    }
}

/// Sealed file bound to one path
#[derive(Debug)]
pub struct SealedReportFile {
    path: PathBuf,
    file_name: String,
    keyset: Arc<FileKey>,
}

impl SealedReportFile {
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Create the file (it must not exist) and stream plaintext into it.
    /// On any error the partial file is removed.
    pub fn write_with<T, F>(&self, f: F) -> VaultResult<T>
    where
        F: FnOnce(&mut SealedWriter<BufWriter<File>>) -> VaultResult<T>,
    {
        let file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&self.path)
            .map_err(|e| match e.kind() {
                ErrorKind::AlreadyExists => {
                    VaultError::FileAlreadyExists(self.path.display().to_string())
                }
                _ => VaultError::IoError(e),
            })?;

        let result = self.write_stream(file, f);

        if result.is_err() {
            if let Err(e) = fs::remove_file(&self.path) {
                log::warn!("Could not remove partial file {}: {}", self.path.display(), e);
            }
        }

        result
    }

    fn write_stream<T, F>(&self, file: File, f: F) -> VaultResult<T>
    where
        F: FnOnce(&mut SealedWriter<BufWriter<File>>) -> VaultResult<T>,
    {
        let mut writer = SealedWriter::new(BufWriter::new(file), &self.keyset, &self.file_name)?;
        let value = f(&mut writer)?;

        let file = writer
            .finish()?
            .into_inner()
            .map_err(|e| VaultError::IoError(e.into_error()))?;
        file.sync_all()?;

        Ok(value)
    }

    /// Decrypt and authenticate the whole file
    pub fn read_to_vec(&self) -> VaultResult<Vec<u8>> {
        let data = match fs::read(&self.path) {
            Ok(data) => data,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(VaultError::FileNotFound(self.path.display().to_string()))
            }
            Err(e) => return Err(e.into()),
        };

        let header = StreamHeader::parse(&data)?;
        let key = derive_segment_key(&self.keyset, &header.salt, &self.file_name)?;
        let mut cipher = SegmentCipher::new(&key, &header)?;

        let mut plaintext = Vec::with_capacity(data.len());
        let mut rest = &data[HEADER_LEN..];
        let mut segment_len = SEGMENT_SIZE - HEADER_LEN;

        loop {
            if rest.len() < TAG_LEN {
                return Err(VaultError::Cipher(format!(
                    "truncated at segment {}",
                    cipher.next_index()
                )));
            }

            let last = rest.len() <= segment_len;
            let take = rest.len().min(segment_len);
            let (segment, tail) = rest.split_at(take);

            plaintext.extend(cipher.open(segment, last)?);

            if last {
                break;
            }
            rest = tail;
            segment_len = SEGMENT_SIZE;
        }

        Ok(plaintext)
    }
}

/// `io::Write` adapter that seals plaintext into segments as it arrives.
/// [`SealedWriter::finish`] must be called to write the final segment.
pub struct SealedWriter<W: Write> {
    inner: W,
    cipher: SegmentCipher,
    buffer: Zeroizing<Vec<u8>>,
}

impl<W: Write> SealedWriter<W> {
    /// Write a fresh header to `inner` and start the first segment
    pub fn new(mut inner: W, keyset: &FileKey, file_name: &str) -> VaultResult<Self> {
        let header = StreamHeader::generate();
        let key = derive_segment_key(keyset, &header.salt, file_name)?;
        let cipher = SegmentCipher::new(&key, &header)?;

        inner.write_all(&header.to_bytes())?;

        Ok(Self {
            inner,
            cipher,
            buffer: Zeroizing::new(Vec::with_capacity(SEGMENT_SIZE)),
        })
    }

    /// Seal the buffered tail as the last segment and return the sink
    pub fn finish(mut self) -> VaultResult<W> {
        let segment = self.cipher.seal(&self.buffer, true)?;
        self.buffer.clear();

        self.inner.write_all(&segment)?;
        self.inner.flush()?;
        Ok(self.inner)
    }

    // A segment is emitted only once more bytes follow it, so the last
    // segment is always the one sealed by `finish`.
    fn drain_full_segments(&mut self) -> VaultResult<()> {
        while self.buffer.len() > self.cipher.next_capacity() {
            let take = self.cipher.next_capacity();
            let segment = self.cipher.seal(&self.buffer[..take], false)?;
            self.inner.write_all(&segment)?;
            self.buffer.drain(..take);
        }
        Ok(())
    }
}

impl<W: Write> Write for SealedWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.buffer.extend_from_slice(buf);
        self.drain_full_segments()
            .map_err(|e| io::Error::new(ErrorKind::Other, e))?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::{FIRST_SEGMENT_PLAINTEXT_LEN, SEGMENT_PLAINTEXT_LEN};
    use crate::settings::MemorySettings;
    use snitcher_keystore::SoftwareKeyStore;
    use tempfile::tempdir;

    fn sealer() -> ReportSealer {
        ReportSealer::new(
            Arc::new(SoftwareKeyStore::in_memory()),
            Arc::new(MemorySettings::new()),
        )
    }

    fn write_bytes(file: &SealedReportFile, data: &[u8]) {
        file.write_with(|w| Ok(w.write_all(data)?)).unwrap();
    }

    #[test]
    fn test_roundtrip_sizes() {
        let dir = tempdir().unwrap();
        let sealer = sealer();

        let sizes = [
            0,
            1,
            FIRST_SEGMENT_PLAINTEXT_LEN,
            FIRST_SEGMENT_PLAINTEXT_LEN + 1,
            FIRST_SEGMENT_PLAINTEXT_LEN + SEGMENT_PLAINTEXT_LEN * 3 + 17,
        ];

        for (i, size) in sizes.iter().enumerate() {
            let data: Vec<u8> = (0..*size).map(|b| (b % 251) as u8).collect();
            let file = sealer.seal(dir.path().join(format!("{}.txt", i))).unwrap();
            write_bytes(&file, &data);

            assert_eq!(file.read_to_vec().unwrap(), data, "size {}", size);
        }
    }

    #[test]
    fn test_on_disk_layout() {
        let dir = tempdir().unwrap();
        let file = sealer().seal(dir.path().join("r.txt")).unwrap();
        write_bytes(&file, &vec![9u8; FIRST_SEGMENT_PLAINTEXT_LEN + 10]);

        let raw = fs::read(file.path()).unwrap();
        assert_eq!(raw[0], 40);
        // Full first block, then a 10-byte last segment
        assert_eq!(raw.len(), SEGMENT_SIZE + 10 + TAG_LEN);
        assert!(!raw.windows(16).any(|w| w == [9u8; 16].as_slice()));
    }

    #[test]
    fn test_small_writes_match_one_write() {
        let dir = tempdir().unwrap();
        let sealer = sealer();
        let data: Vec<u8> = (0..10_000u32).map(|b| (b % 13) as u8).collect();

        let file = sealer.seal(dir.path().join("pieces.txt")).unwrap();
        file.write_with(|w| {
            for chunk in data.chunks(7) {
                w.write_all(chunk)?;
            }
            Ok(())
        })
        .unwrap();

        assert_eq!(file.read_to_vec().unwrap(), data);
    }

    #[test]
    fn test_tamper_detected() {
        let dir = tempdir().unwrap();
        let file = sealer().seal(dir.path().join("t.txt")).unwrap();
        write_bytes(&file, &vec![1u8; 6000]);

        let mut raw = fs::read(file.path()).unwrap();
        raw[HEADER_LEN + 100] ^= 0x01;
        fs::write(file.path(), &raw).unwrap();

        assert!(matches!(file.read_to_vec(), Err(VaultError::Cipher(_))));
    }

    #[test]
    fn test_truncation_detected() {
        let dir = tempdir().unwrap();
        let file = sealer().seal(dir.path().join("t.txt")).unwrap();
        write_bytes(&file, &vec![1u8; 6000]);

        // Cut at the segment boundary: the first segment now looks final
        let raw = fs::read(file.path()).unwrap();
        fs::write(file.path(), &raw[..SEGMENT_SIZE]).unwrap();
        assert!(matches!(file.read_to_vec(), Err(VaultError::Cipher(_))));

        fs::write(file.path(), &raw[..HEADER_LEN + 4]).unwrap();
        assert!(matches!(file.read_to_vec(), Err(VaultError::Cipher(_))));

        fs::write(file.path(), &raw[..10]).unwrap();
        assert!(matches!(
            file.read_to_vec(),
            Err(VaultError::InvalidFileFormat(_))
        ));
    }

    #[test]
    fn test_renamed_file_rejected() {
        let dir = tempdir().unwrap();
        let sealer = sealer();
        let file = sealer.seal(dir.path().join("a.txt")).unwrap();
        write_bytes(&file, b"bound to its name");

        fs::rename(dir.path().join("a.txt"), dir.path().join("b.txt")).unwrap();
        let renamed = sealer.seal(dir.path().join("b.txt")).unwrap();
        assert!(matches!(renamed.read_to_vec(), Err(VaultError::Cipher(_))));
    }

    #[test]
    fn test_fresh_salt_per_file() {
        let dir = tempdir().unwrap();
        let sealer = sealer();

        let a = sealer.seal(dir.path().join("a.txt")).unwrap();
        let b = sealer.seal(dir.path().join("b.txt")).unwrap();
        write_bytes(&a, b"same");
        write_bytes(&b, b"same");

        let ha = fs::read(a.path()).unwrap();
        let hb = fs::read(b.path()).unwrap();
        assert_ne!(&ha[..HEADER_LEN], &hb[..HEADER_LEN]);
    }

    #[test]
    fn test_write_once() {
        let dir = tempdir().unwrap();
        let file = sealer().seal(dir.path().join("once.txt")).unwrap();
        write_bytes(&file, b"first");

        let again = file.write_with(|w| Ok(w.write_all(b"second")?));
        assert!(matches!(again, Err(VaultError::FileAlreadyExists(_))));
        assert_eq!(file.read_to_vec().unwrap(), b"first");
    }

    #[test]
    fn test_failed_write_removes_partial_file() {
        let dir = tempdir().unwrap();
        let file = sealer().seal(dir.path().join("partial.txt")).unwrap();

        let result: VaultResult<()> = file.write_with(|w| {
            w.write_all(&[0u8; 9000])?;
            Err(VaultError::Worker("interrupted".into()))
        });

        assert!(matches!(result, Err(VaultError::Worker(_))));
        assert!(!file.path().exists());
    }

    #[test]
    fn test_keyset_survives_restart() {
        let dir = tempdir().unwrap();
        let keystore: Arc<dyn KeyStore> =
            Arc::new(SoftwareKeyStore::open(dir.path().join("keystore.json")).unwrap());
        let settings: Arc<dyn SettingsStore> = Arc::new(MemorySettings::new());

        let path = dir.path().join("r.txt");
        let first = ReportSealer::new(keystore.clone(), settings.clone());
        write_bytes(&first.seal(&path).unwrap(), b"persisted");

        let second = ReportSealer::new(keystore, settings.clone());
        assert_eq!(second.seal(&path).unwrap().read_to_vec().unwrap(), b"persisted");
        assert!(settings.get(keys::FILE_KEYSET).unwrap().is_some());
    }

    #[test]
    fn test_missing_file() {
        let dir = tempdir().unwrap();
        let file = sealer().seal(dir.path().join("nope.txt")).unwrap();
        assert!(matches!(file.read_to_vec(), Err(VaultError::FileNotFound(_))));
    }
}
