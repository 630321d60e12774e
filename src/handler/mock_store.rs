//! Mock blob handler implementation for testing

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::Utc;
use log::info;

use crate::error::{DirectoryError, Result};
use crate::handler::{
    chunk_count, split_chunks, BlobHandler, ChunkSource, ChunkStream, StoredFile,
};

#[derive(Clone)]
struct MockFile {
    info: StoredFile,
    chunks: Arc<Vec<Vec<u8>>>,
}

/// A mock blob handler that keeps chunks in memory.
/// Useful for testing without a database, and for injecting store failures.
pub struct MockBlobHandler {
    namespace: String,
    threshold: usize,
    namespace_created: AtomicBool,
    files: Arc<Mutex<HashMap<String, MockFile>>>,
    unavailable: AtomicBool,
    fail_writes: AtomicBool,
    streams_opened: AtomicUsize,
}

impl MockBlobHandler {
    pub fn new(namespace: &str, threshold: usize) -> Self {
        info!("Creating mock blob handler for namespace {}", namespace);
        Self {
            namespace: namespace.to_string(),
            threshold: threshold.max(1),
            namespace_created: AtomicBool::new(false),
            files: Arc::new(Mutex::new(HashMap::new())),
            unavailable: AtomicBool::new(false),
            fail_writes: AtomicBool::new(false),
            streams_opened: AtomicUsize::new(0),
        }
    }

    /// Make every operation fail with `StorageUnavailable`
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Make only `save_file` and `create_if_absent` fail
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Number of read streams opened so far
    pub fn streams_opened(&self) -> usize {
        self.streams_opened.load(Ordering::SeqCst)
    }

    /// Number of chunks stored for `name`, if it exists
    pub fn chunk_count(&self, name: &str) -> Option<usize> {
        self.files
            .lock()
            .ok()?
            .get(name)
            .map(|file| file.chunks.len())
    }

    /// Clear all stored files (useful for testing)
    pub fn clear(&self) {
        if let Ok(mut files) = self.files.lock() {
            files.clear();
        }
    }

    fn check_available(&self) -> Result<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(DirectoryError::StorageUnavailable(format!(
                "mock namespace {} is offline",
                self.namespace
            )));
        }
        Ok(())
    }

    fn check_writable(&self) -> Result<()> {
        self.check_available()?;
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(DirectoryError::StorageUnavailable(format!(
                "mock namespace {} rejects writes",
                self.namespace
            )));
        }
        Ok(())
    }

    fn files(&self) -> Result<MutexGuard<'_, HashMap<String, MockFile>>> {
        self.check_available()?;
        self.files
            .lock()
            .map_err(|_| DirectoryError::StorageUnavailable("mock store poisoned".to_string()))
    }

    fn build(&self, name: &str, content: &[u8]) -> MockFile {
        let length = content.len() as u64;
        MockFile {
            info: StoredFile {
                name: name.to_string(),
                length,
                checksum: crc32fast::hash(content),
                chunk_size: self.threshold as u64,
                chunk_count: chunk_count(length, self.threshold as u64),
                modified_at: Utc::now(),
            },
            chunks: Arc::new(
                split_chunks(content, self.threshold)
                    .map(|chunk| chunk.to_vec())
                    .collect(),
            ),
        }
    }
}

impl BlobHandler for MockBlobHandler {
    fn namespace(&self) -> &str {
        &self.namespace
    }

    fn threshold(&self) -> usize {
        self.threshold
    }

    fn namespace_exists(&self) -> Result<bool> {
        self.check_available()?;
        Ok(self.namespace_created.load(Ordering::SeqCst))
    }

    fn create_namespace(&self) -> Result<()> {
        self.check_available()?;
        self.namespace_created.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn list_files(&self) -> Result<HashSet<String>> {
        Ok(self.files()?.keys().cloned().collect())
    }

    fn file_exists(&self, name: &str) -> Result<bool> {
        Ok(self.files()?.contains_key(name))
    }

    fn file_info(&self, name: &str) -> Result<StoredFile> {
        self.files()?
            .get(name)
            .map(|file| file.info.clone())
            .ok_or_else(|| DirectoryError::FileNotFound(name.to_string()))
    }

    fn delete_file(&self, name: &str) -> Result<()> {
        self.files()?.remove(name);
        Ok(())
    }

    fn open_read_stream(&self, name: &str) -> Result<ChunkStream> {
        let file = self
            .files()?
            .get(name)
            .cloned()
            .ok_or_else(|| DirectoryError::FileNotFound(name.to_string()))?;
        self.streams_opened.fetch_add(1, Ordering::SeqCst);

        let source = MockChunkSource {
            name: name.to_string(),
            chunks: file.chunks,
        };
        Ok(ChunkStream::new(&file.info, Box::new(source)))
    }

    fn save_file(&self, name: &str, content: &[u8]) -> Result<()> {
        self.check_writable()?;
        let file = self.build(name, content);
        self.files()?.insert(name.to_string(), file);
        Ok(())
    }

    fn create_if_absent(&self, name: &str) -> Result<bool> {
        self.check_writable()?;
        let mut files = self.files()?;
        if files.contains_key(name) {
            return Ok(false);
        }
        files.insert(name.to_string(), self.build(name, &[]));
        Ok(true)
    }
}

/// Reads from the chunk snapshot taken when the stream was opened
struct MockChunkSource {
    name: String,
    chunks: Arc<Vec<Vec<u8>>>,
}

impl ChunkSource for MockChunkSource {
    fn fetch(&mut self, seq: u64) -> Result<Vec<u8>> {
        self.chunks
            .get(seq as usize)
            .cloned()
            .ok_or_else(|| DirectoryError::FileNotFound(self.name.clone()))
    }
}
