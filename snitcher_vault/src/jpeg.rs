//! Snitcher Vault - JPEG Signature Check
//!
//! Accepts an attachment only if it starts with the SOI marker and ends with
//! the EOI marker. This is a signature check, not a decoder: a file can pass
//! and still carry other content between the markers.

use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::Path;

use tempfile::NamedTempFile;

use crate::error::VaultResult;

/// Start-of-image marker
pub const JPEG_SOI: [u8; 2] = [0xFF, 0xD8];

/// End-of-image marker
pub const JPEG_EOI: [u8; 2] = [0xFF, 0xD9];

/// Anything shorter cannot be a JPEG
pub const MIN_JPEG_LEN: u64 = 10;

/// First and last two bytes of a candidate file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageSignatureWindow {
    pub head: [u8; 2],
    pub tail: [u8; 2],
    pub len: u64,
}

impl ImageSignatureWindow {
    /// Window over an in-memory buffer; `None` below the minimum length
    pub fn from_bytes(data: &[u8]) -> Option<Self> {
        if (data.len() as u64) < MIN_JPEG_LEN {
            return None;
        }

        let n = data.len();
        Some(Self {
            head: [data[0], data[1]],
            tail: [data[n - 2], data[n - 1]],
            len: n as u64,
        })
    }

    /// Window over a seekable source; `None` below the minimum length
    pub fn from_reader<R: Read + Seek>(reader: &mut R) -> io::Result<Option<Self>> {
        let len = reader.seek(SeekFrom::End(0))?;
        if len < MIN_JPEG_LEN {
            return Ok(None);
        }

        let mut head = [0u8; 2];
        reader.seek(SeekFrom::Start(0))?;
        reader.read_exact(&mut head)?;

        let mut tail = [0u8; 2];
        reader.seek(SeekFrom::Start(len - 2))?;
        reader.read_exact(&mut tail)?;

        Ok(Some(Self { head, tail, len }))
    }

    pub fn matches_jpeg(&self) -> bool {
        self.len >= MIN_JPEG_LEN && self.head == JPEG_SOI && self.tail == JPEG_EOI
    }
}

/// In-memory signature check
pub fn has_jpeg_signature(data: &[u8]) -> bool {
    ImageSignatureWindow::from_bytes(data).map_or(false, |w| w.matches_jpeg())
}

/// Copy `source` to a scratch file in `scratch_dir` and check its markers.
/// The scratch file is removed on every path.
pub fn is_well_formed_jpeg<R: Read>(source: &mut R, scratch_dir: &Path) -> VaultResult<bool> {
    std::fs::create_dir_all(scratch_dir)?;

    let mut scratch = NamedTempFile::new_in(scratch_dir)?;
    let copied = io::copy(source, &mut scratch)?;
    scratch.flush()?;

    let window = ImageSignatureWindow::from_reader(scratch.as_file_mut())?;
    let valid = window.map_or(false, |w| w.matches_jpeg());

    log::debug!("Attachment of {} bytes: jpeg={}", copied, valid);
    Ok(valid)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;
    use tempfile::tempdir;

    fn minimal_jpeg() -> Vec<u8> {
        let mut data = JPEG_SOI.to_vec();
        data.extend_from_slice(&[0x00; 8]);
        data.extend_from_slice(&JPEG_EOI);
        data
    }

    #[test]
    fn test_in_memory_signature() {
        assert!(has_jpeg_signature(&minimal_jpeg()));

        let mut bad_head = minimal_jpeg();
        bad_head[1] = 0xD9;
        assert!(!has_jpeg_signature(&bad_head));

        let mut bad_tail = minimal_jpeg();
        bad_tail[11] = 0xD8;
        assert!(!has_jpeg_signature(&bad_tail));

        assert!(!has_jpeg_signature(&[0xFF, 0xD8, 0x00, 0xFF, 0xD9]));
        assert!(ImageSignatureWindow::from_bytes(&[0xFF; 9]).is_none());
    }

    #[test]
    fn test_exact_minimum_length() {
        let data = [0xFF, 0xD8, 0, 0, 0, 0, 0, 0, 0xFF, 0xD9];
        let window = ImageSignatureWindow::from_bytes(&data).unwrap();
        assert_eq!(window.len, 10);
        assert!(window.matches_jpeg());
    }

    #[test]
    fn test_file_check() {
        let dir = tempdir().unwrap();

        assert!(is_well_formed_jpeg(&mut Cursor::new(minimal_jpeg()), dir.path()).unwrap());

        let mut altered = minimal_jpeg();
        altered[0] = 0x00;
        assert!(!is_well_formed_jpeg(&mut Cursor::new(altered), dir.path()).unwrap());

        assert!(!is_well_formed_jpeg(&mut Cursor::new(vec![0xFF, 0xD8, 0xFF, 0xD9]), dir.path()).unwrap());
        assert!(!is_well_formed_jpeg(&mut Cursor::new(Vec::new()), dir.path()).unwrap());
    }

    #[test]
    fn test_scratch_file_removed() {
        let dir = tempdir().unwrap();
        let scratch = dir.path().join("cache");

        is_well_formed_jpeg(&mut Cursor::new(minimal_jpeg()), &scratch).unwrap();
        is_well_formed_jpeg(&mut Cursor::new(vec![1, 2, 3]), &scratch).unwrap();

        assert_eq!(std::fs::read_dir(&scratch).unwrap().count(), 0);
    }

    #[test]
    fn test_source_error_surfaces() {
        struct Broken;
        impl Read for Broken {
            fn read(&mut self, _buf: &mut [u8]) -> io::Result<usize> {
                Err(io::Error::new(io::ErrorKind::Other, "device gone"))
            }
        }

        let dir = tempdir().unwrap();
        assert!(is_well_formed_jpeg(&mut Broken, dir.path()).is_err());
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }
}
