//! Snitcher Vault - Segmented AEAD
//!
//! Sealed files are a header followed by AES-256-GCM segments:
//!
//! ```text
//! header   = header_len (1 byte = 40) || salt (32) || nonce_prefix (7)
//! segment  = ciphertext || tag (16), 4096 bytes except the last
//! nonce    = nonce_prefix (7) || segment_index (u32 BE) || last_flag (1)
//! ```
//!
//! The first segment carries 40 bytes less plaintext so that header plus
//! first segment fill one 4096-byte block. Exactly one segment, the final
//! one, is sealed with the last flag set, which makes truncation detectable.

use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm, Nonce,
};

use super::keys::{random_bytes, FileKey};
use crate::error::{VaultError, VaultResult};

/// Authentication tag length
pub const TAG_LEN: usize = 16;

/// AES-GCM nonce length
pub const NONCE_LEN: usize = 12;

/// HKDF salt length
pub const SALT_LEN: usize = 32;

/// Random per-file nonce prefix length
pub const NONCE_PREFIX_LEN: usize = 7;

/// Header length, stored as the header's first byte
pub const HEADER_LEN: usize = 1 + SALT_LEN + NONCE_PREFIX_LEN;

/// Ciphertext segment size, tag included
pub const SEGMENT_SIZE: usize = 4096;

/// Plaintext bytes per segment
pub const SEGMENT_PLAINTEXT_LEN: usize = SEGMENT_SIZE - TAG_LEN;

/// Plaintext bytes in the first segment
pub const FIRST_SEGMENT_PLAINTEXT_LEN: usize = SEGMENT_PLAINTEXT_LEN - HEADER_LEN;

/// Per-file header
#[derive(Clone, PartialEq, Eq)]
pub struct StreamHeader {
    pub salt: [u8; SALT_LEN],
    pub nonce_prefix: [u8; NONCE_PREFIX_LEN],
}

impl StreamHeader {
    /// Fresh salt and nonce prefix
    pub fn generate() -> Self {
        Self {
            salt: random_bytes(),
            nonce_prefix: random_bytes(),
        }
    }

    pub fn to_bytes(&self) -> [u8; HEADER_LEN] {
        let mut out = [0u8; HEADER_LEN];
        out[0] = HEADER_LEN as u8;
        out[1..1 + SALT_LEN].copy_from_slice(&self.salt);
        out[1 + SALT_LEN..].copy_from_slice(&self.nonce_prefix);
        out
    }

    /// Parse the header at the start of `data`
    pub fn parse(data: &[u8]) -> VaultResult<Self> {
        if data.len() < HEADER_LEN {
            return Err(VaultError::InvalidFileFormat("truncated header".into()));
        }
        if data[0] as usize != HEADER_LEN {
            return Err(VaultError::InvalidFileFormat(format!(
                "unexpected header length {}",
                data[0]
            )));
        }

        let mut salt = [0u8; SALT_LEN];
        salt.copy_from_slice(&data[1..1 + SALT_LEN]);
        let mut nonce_prefix = [0u8; NONCE_PREFIX_LEN];
        nonce_prefix.copy_from_slice(&data[1 + SALT_LEN..HEADER_LEN]);

        Ok(Self { salt, nonce_prefix })
    }
}

impl std::fmt::Debug for StreamHeader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamHeader").finish_non_exhaustive()
    }
}

/// Nonce for segment `index`
pub fn segment_nonce(prefix: &[u8; NONCE_PREFIX_LEN], index: u32, last: bool) -> [u8; NONCE_LEN] {
    let mut nonce = [0u8; NONCE_LEN];
    nonce[..NONCE_PREFIX_LEN].copy_from_slice(prefix);
    nonce[NONCE_PREFIX_LEN..NONCE_LEN - 1].copy_from_slice(&index.to_be_bytes());
    nonce[NONCE_LEN - 1] = last as u8;
    nonce
}

/// Seals or opens the segments of one file, in order
pub struct SegmentCipher {
    cipher: Aes256Gcm,
    nonce_prefix: [u8; NONCE_PREFIX_LEN],
    next_index: u32,
    finished: bool,
}

impl SegmentCipher {
    pub fn new(key: &FileKey, header: &StreamHeader) -> VaultResult<Self> {
        let cipher = Aes256Gcm::new_from_slice(key.expose())
            .map_err(|e| VaultError::Cipher(e.to_string()))?;

        Ok(Self {
            cipher,
            nonce_prefix: header.nonce_prefix,
            next_index: 0,
            finished: false,
        })
    }

    /// Index of the segment the next call handles
    pub fn next_index(&self) -> u32 {
        self.next_index
    }

    /// Plaintext capacity of the next segment
    pub fn next_capacity(&self) -> usize {
        if self.next_index == 0 {
            FIRST_SEGMENT_PLAINTEXT_LEN
        } else {
            SEGMENT_PLAINTEXT_LEN
        }
    }

    /// Encrypt the next segment
    pub fn seal(&mut self, plaintext: &[u8], last: bool) -> VaultResult<Vec<u8>> {
        if plaintext.len() > self.next_capacity() {
            return Err(VaultError::Cipher(format!(
                "segment {} holds at most {} bytes",
                self.next_index,
                self.next_capacity()
            )));
        }

        let nonce = self.advance(last)?;
        self.cipher
            .encrypt(Nonce::from_slice(&nonce), plaintext)
            .map_err(|e| VaultError::Cipher(e.to_string()))
    }

    /// Decrypt the next segment
    pub fn open(&mut self, ciphertext: &[u8], last: bool) -> VaultResult<Vec<u8>> {
        let index = self.next_index;
        let nonce = self.advance(last)?;

        self.cipher
            .decrypt(Nonce::from_slice(&nonce), ciphertext)
            .map_err(|_| VaultError::Cipher(format!("segment {} failed authentication", index)))
    }

    fn advance(&mut self, last: bool) -> VaultResult<[u8; NONCE_LEN]> {
        if self.finished {
            return Err(VaultError::Cipher("stream already finished".into()));
        }

        let nonce = segment_nonce(&self.nonce_prefix, self.next_index, last);

        if last {
            self.finished = true;
        } else {
            self.next_index = self
                .next_index
                .checked_add(1)
                .ok_or_else(|| VaultError::Cipher("too many segments".into()))?;
        }

        Ok(nonce)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layout_constants() {
        assert_eq!(HEADER_LEN, 40);
        assert_eq!(SEGMENT_PLAINTEXT_LEN, 4080);
        assert_eq!(FIRST_SEGMENT_PLAINTEXT_LEN, 4040);
    }

    #[test]
    fn test_header_bytes() {
        let header = StreamHeader::generate();
        let bytes = header.to_bytes();
        assert_eq!(bytes[0], 40);
        assert_eq!(StreamHeader::parse(&bytes).unwrap(), header);

        let mut bad = bytes;
        bad[0] = 41;
        assert!(matches!(
            StreamHeader::parse(&bad),
            Err(VaultError::InvalidFileFormat(_))
        ));
        assert!(StreamHeader::parse(&bytes[..20]).is_err());
    }

    #[test]
    fn test_nonce_layout() {
        let prefix = [0xAA; NONCE_PREFIX_LEN];
        let nonce = segment_nonce(&prefix, 0x01020304, true);
        assert_eq!(&nonce[..7], &prefix);
        assert_eq!(&nonce[7..11], &[1, 2, 3, 4]);
        assert_eq!(nonce[11], 1);
        assert_eq!(segment_nonce(&prefix, 5, false)[11], 0);
    }

    #[test]
    fn test_segments_roundtrip() {
        let key = FileKey::generate();
        let header = StreamHeader::generate();

        let mut sealer = SegmentCipher::new(&key, &header).unwrap();
        let first = sealer.seal(&[1u8; FIRST_SEGMENT_PLAINTEXT_LEN], false).unwrap();
        let last = sealer.seal(b"tail", true).unwrap();
        assert_eq!(first.len() + HEADER_LEN, SEGMENT_SIZE);
        assert!(sealer.seal(b"more", true).is_err());

        let mut opener = SegmentCipher::new(&key, &header).unwrap();
        assert_eq!(opener.open(&first, false).unwrap(), vec![1u8; FIRST_SEGMENT_PLAINTEXT_LEN]);
        assert_eq!(opener.open(&last, true).unwrap(), b"tail");
    }

    #[test]
    fn test_last_flag_is_authenticated() {
        let key = FileKey::generate();
        let header = StreamHeader::generate();

        let mut sealer = SegmentCipher::new(&key, &header).unwrap();
        let segment = sealer.seal(b"not the end", false).unwrap();

        // Presenting a non-final segment as final must fail
        let mut opener = SegmentCipher::new(&key, &header).unwrap();
        assert!(matches!(opener.open(&segment, true), Err(VaultError::Cipher(_))));
    }

    #[test]
    fn test_oversized_segment_rejected() {
        let key = FileKey::generate();
        let mut sealer = SegmentCipher::new(&key, &StreamHeader::generate()).unwrap();
        assert!(sealer
            .seal(&vec![0u8; FIRST_SEGMENT_PLAINTEXT_LEN + 1], false)
            .is_err());
    }
}
