//! Chunked Blob Handler
//!
//! This module owns the mapping from a file name to the rows that hold its
//! content. Every file, whatever its size, is split into chunks of at most
//! `threshold` bytes and reconstructed by reading the chunks back in
//! sequence order. Writers, readers and locks reach the backing store only
//! through the `BlobHandler` trait, so the store can be swapped (SQLite,
//! in-memory) without affecting them.

pub mod mock_store;
pub mod sqlite_store;
pub mod stream;


use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::error::{DirectoryError, Result};

pub use stream::{ChunkSource, ChunkStream};

/// Metadata of one committed file
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct StoredFile {
    /// File name, unique within the namespace
    pub name: String,
    /// Total length in bytes (sum of all chunk lengths)
    pub length: u64,
    /// CRC32 of the whole content
    pub checksum: u32,
    /// Chunk size the file was written with
    pub chunk_size: u64,
    /// Number of chunk rows
    pub chunk_count: u64,
    /// Time of the commit that produced this version
    pub modified_at: DateTime<Utc>,
}

/// Trait defining the chunked blob storage interface
pub trait BlobHandler: Send + Sync {
    /// Name of the namespace (table) this handler owns
    fn namespace(&self) -> &str;

    /// Maximum number of bytes stored per chunk
    fn threshold(&self) -> usize;

    /// Check whether the backing table exists
    fn namespace_exists(&self) -> Result<bool>;

    /// Create the backing table if it is missing
    fn create_namespace(&self) -> Result<()>;

    /// Names of every committed file, in no particular order
    fn list_files(&self) -> Result<HashSet<String>>;

    /// Check if a file exists
    fn file_exists(&self, name: &str) -> Result<bool>;

    /// Length of a file in bytes
    fn file_length(&self, name: &str) -> Result<u64> {
        self.file_info(name).map(|info| info.length)
    }

    /// Full metadata of a file
    fn file_info(&self, name: &str) -> Result<StoredFile>;

    /// Remove a file and all its chunks. Deleting an absent file is a no-op.
    fn delete_file(&self, name: &str) -> Result<()>;

    /// Open a lazy, forward-only stream over the file content
    fn open_read_stream(&self, name: &str) -> Result<ChunkStream>;

    /// Store `content` under `name`, replacing any previous version atomically
    fn save_file(&self, name: &str, content: &[u8]) -> Result<()>;

    /// Create an empty file only if no file with that name exists.
    /// Returns `true` when this call created it.
    fn create_if_absent(&self, name: &str) -> Result<bool>;

    /// Flush client-side buffers. `save_file` is already a terminal commit,
    /// so implementations have nothing left to do here.
    fn sync_files(&self, _names: &[String]) -> Result<()> {
        Ok(())
    }
}

/// Number of chunks needed for `length` bytes at `chunk_size` bytes each.
pub fn chunk_count(length: u64, chunk_size: u64) -> u64 {
    if chunk_size == 0 {
        return 0;
    }
    length.div_ceil(chunk_size)
}

/// Split `content` into chunk slices of at most `threshold` bytes.
pub fn split_chunks(content: &[u8], threshold: usize) -> std::slice::Chunks<'_, u8> {
    content.chunks(threshold.max(1))
}

/// Validate that `name` can be used as an unquoted SQL table identifier.
pub fn validate_table_name(name: &str) -> Result<()> {
    let mut chars = name.chars();
    let valid = match chars.next() {
        Some(first) if first.is_ascii_alphabetic() || first == '_' => {
            chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        }
        _ => false,
    };
    if valid {
        Ok(())
    } else {
        Err(DirectoryError::InvalidTableName(name.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chunk_count_boundaries() {
        assert_eq!(chunk_count(0, 16), 0);
        assert_eq!(chunk_count(1, 16), 1);
        assert_eq!(chunk_count(16, 16), 1);
        assert_eq!(chunk_count(17, 16), 2);
        assert_eq!(chunk_count(48, 16), 3);
        assert_eq!(chunk_count(49, 16), 4);
    }

    #[test]
    fn test_split_chunks_matches_chunk_count() {
        let content = vec![7u8; 50];
        let chunks: Vec<&[u8]> = split_chunks(&content, 16).collect();
        assert_eq!(chunks.len() as u64, chunk_count(50, 16));
        assert_eq!(chunks.last().unwrap().len(), 2);
        assert!(split_chunks(&[], 16).next().is_none());
    }

    #[test]
    fn test_validate_table_name() {
        assert!(validate_table_name("search_index").is_ok());
        assert!(validate_table_name("_idx2").is_ok());
        assert!(validate_table_name("").is_err());
        assert!(validate_table_name("2fast").is_err());
        assert!(validate_table_name("idx; DROP TABLE x").is_err());
        assert!(validate_table_name("name-with-dash").is_err());
    }
}
