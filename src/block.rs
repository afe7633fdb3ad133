//! Content-addressed test blocks.
//!
//! A block is a buffer of random bytes whose name is derived from its own
//! content, so a file written under that name can later prove (or disprove)
//! that the medium returned exactly what was stored.

use std::fs::OpenOptions;
use std::io::{self, Write};
use std::path::Path;

use md5::{Digest, Md5};
use rand::rngs::OsRng;
use rand::RngCore;

use crate::error::{Result, TestError};

/// Number of hex characters kept from the digest.
pub const ID_LEN: usize = 8;

/// Largest block, in megabytes: the FAT32 file size limit.
pub const MAX_BLOCK_MB: f64 = 4096.0;

const MIB_F: f64 = 1024.0 * 1024.0;

/// Byte length of a block of `size_mb` megabytes, or `None` when it would be
/// empty, negative, or larger than [`MAX_BLOCK_MB`].
pub fn block_len(size_mb: f64) -> Option<usize> {
    if size_mb > MAX_BLOCK_MB {
        return None;
    }
    let len = (size_mb * MIB_F) as i64;
    if len <= 0 {
        return None;
    }
    usize::try_from(len).ok()
}

/// First eight hex characters of the MD5 digest of `data`.
pub fn content_id(data: &[u8]) -> String {
    let digest = Md5::digest(data);
    let mut id = hex::encode(digest);
    id.truncate(ID_LEN);
    id
}

#[derive(Debug, Clone)]
pub struct Block {
    id: String,
    data: Vec<u8>,
}

impl Block {
    /// Fill a fresh buffer of `size_mb` megabytes from the OS random source.
    pub fn generate(size_mb: f64) -> Result<Self> {
        let len = block_len(size_mb).ok_or(TestError::InvalidBlockSize(size_mb))?;
        let mut data = vec![0u8; len];
        OsRng.try_fill_bytes(&mut data)?;
        Ok(Self::from_bytes(data))
    }

    pub fn from_bytes(data: Vec<u8>) -> Self {
        let id = content_id(&data);
        Self { id, data }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// Create/truncate `path`, write all of `data`, and force it to stable storage
/// before closing.
pub fn write_durable(path: &Path, data: &[u8]) -> io::Result<()> {
    let mut file = OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .open(path)?;
    file.write_all(data)?;
    file.sync_all()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn generated_block_id_matches_content() {
        let block = Block::generate(0.25).unwrap();
        assert_eq!(block.len(), 256 * 1024);
        assert_eq!(block.id().len(), ID_LEN);
        assert_eq!(content_id(block.data()), block.id());
    }

    #[test]
    fn equal_content_equal_id() {
        let a = Block::from_bytes(vec![7u8; 4096]);
        let b = Block::from_bytes(vec![7u8; 4096]);
        assert_eq!(a.id(), b.id());
        let c = Block::from_bytes(vec![8u8; 4096]);
        assert_ne!(a.id(), c.id());
    }

    #[test]
    fn known_digest_prefix() {
        // md5("") = d41d8cd98f00b204e9800998ecf8427e
        assert_eq!(content_id(b""), "d41d8cd9");
    }

    #[test]
    fn non_positive_size_rejected() {
        assert!(block_len(0.0).is_none());
        assert!(block_len(-1.0).is_none());
        assert!(block_len(f64::NAN).is_none());
        assert!(matches!(
            Block::generate(0.0),
            Err(TestError::InvalidBlockSize(_))
        ));
    }

    #[test]
    fn oversized_block_rejected() {
        assert!(block_len(MAX_BLOCK_MB).is_some());
        assert!(block_len(4096.5).is_none());
        assert!(block_len(1e12).is_none());
        assert!(block_len(f64::INFINITY).is_none());
        assert!(matches!(
            Block::generate(1e12),
            Err(TestError::InvalidBlockSize(_))
        ));
    }

    #[test]
    fn fractional_megabytes() {
        assert_eq!(block_len(0.004), Some(4194));
        assert_eq!(block_len(1.0), Some(1024 * 1024));
    }

    #[test]
    fn durable_write_replaces_content() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("blk");
        write_durable(&path, b"first attempt, longer").unwrap();
        write_durable(&path, b"second").unwrap();
        assert_eq!(std::fs::read(&path).unwrap(), b"second");
    }
}
