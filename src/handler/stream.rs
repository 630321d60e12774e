//! Lazy read stream over the chunks of one stored file

use std::fmt;
use std::io::{self, Read};

use log::trace;

use crate::error::{DirectoryError, Result};
use crate::handler::StoredFile;

/// Fetches single chunks of one pinned file version
pub trait ChunkSource: Send {
    /// Fetch chunk `seq` (zero-based)
    fn fetch(&mut self, seq: u64) -> Result<Vec<u8>>;
}

/// Forward-only, non-restartable byte stream reconstructed from chunks in
/// sequence order. Chunks are fetched one at a time as the stream advances.
pub struct ChunkStream {
    name: String,
    length: u64,
    chunk_size: u64,
    chunk_count: u64,
    next_seq: u64,
    current: Vec<u8>,
    offset_in_chunk: usize,
    position: u64,
    source: Box<dyn ChunkSource>,
}

impl ChunkStream {
    /// Create a stream over the file described by `info`
    pub fn new(info: &StoredFile, source: Box<dyn ChunkSource>) -> Self {
        Self {
            name: info.name.clone(),
            length: info.length,
            chunk_size: info.chunk_size,
            chunk_count: info.chunk_count,
            next_seq: 0,
            current: Vec::new(),
            offset_in_chunk: 0,
            position: 0,
            source,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Length of the file version this stream is pinned to
    pub fn length(&self) -> u64 {
        self.length
    }

    /// Number of bytes consumed so far
    pub fn position(&self) -> u64 {
        self.position
    }

    /// Advance by up to `n` bytes without copying them out.
    ///
    /// Whole chunks are jumped over by index; only the chunk containing the
    /// target offset is fetched. Returns the number of bytes skipped, which
    /// is short only at end of stream.
    pub fn skip(&mut self, n: u64) -> Result<u64> {
        let target = self.position.saturating_add(n).min(self.length);
        let skipped = target - self.position;
        let remaining = (self.current.len() - self.offset_in_chunk) as u64;

        if skipped <= remaining {
            self.offset_in_chunk += skipped as usize;
            self.position = target;
            return Ok(skipped);
        }

        let seq = target / self.chunk_size;
        if seq >= self.chunk_count {
            self.current.clear();
            self.offset_in_chunk = 0;
            self.next_seq = self.chunk_count;
        } else {
            self.load(seq)?;
            self.offset_in_chunk = (target - seq * self.chunk_size) as usize;
        }
        self.position = target;
        trace!("{}: skipped {} bytes to {}", self.name, skipped, target);
        Ok(skipped)
    }

    fn expected_len(&self, seq: u64) -> u64 {
        if seq + 1 < self.chunk_count {
            self.chunk_size
        } else {
            self.length - seq * self.chunk_size
        }
    }

    fn load(&mut self, seq: u64) -> Result<()> {
        let chunk = self.source.fetch(seq)?;
        let expected = self.expected_len(seq);
        if chunk.len() as u64 != expected {
            return Err(DirectoryError::Io(io::Error::new(
                io::ErrorKind::InvalidData,
                format!(
                    "chunk {} of '{}' holds {} bytes, expected {}",
                    seq,
                    self.name,
                    chunk.len(),
                    expected
                ),
            )));
        }
        self.current = chunk;
        self.offset_in_chunk = 0;
        self.next_seq = seq + 1;
        Ok(())
    }
}

impl Read for ChunkStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        while self.offset_in_chunk >= self.current.len() {
            if self.next_seq >= self.chunk_count {
                return Ok(0);
            }
            self.load(self.next_seq).map_err(DirectoryError::into_io)?;
        }

        let available = &self.current[self.offset_in_chunk..];
        let n = buf.len().min(available.len());
        buf[..n].copy_from_slice(&available[..n]);
        self.offset_in_chunk += n;
        self.position += n as u64;
        Ok(n)
    }
}

impl fmt::Debug for ChunkStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChunkStream")
            .field("name", &self.name)
            .field("length", &self.length)
            .field("chunk_count", &self.chunk_count)
            .field("position", &self.position)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct VecSource {
        chunks: Vec<Vec<u8>>,
        fetches: Arc<AtomicUsize>,
    }

    impl ChunkSource for VecSource {
        fn fetch(&mut self, seq: u64) -> Result<Vec<u8>> {
            self.fetches.fetch_add(1, Ordering::SeqCst);
            self.chunks
                .get(seq as usize)
                .cloned()
                .ok_or_else(|| DirectoryError::FileNotFound("test".to_string()))
        }
    }

    fn stream_over(content: &[u8], chunk_size: usize) -> (ChunkStream, Arc<AtomicUsize>) {
        let chunks: Vec<Vec<u8>> = content.chunks(chunk_size).map(|c| c.to_vec()).collect();
        let info = StoredFile {
            name: "test".to_string(),
            length: content.len() as u64,
            checksum: crc32fast::hash(content),
            chunk_size: chunk_size as u64,
            chunk_count: chunks.len() as u64,
            modified_at: Utc::now(),
        };
        let fetches = Arc::new(AtomicUsize::new(0));
        let source = VecSource {
            chunks,
            fetches: fetches.clone(),
        };
        (ChunkStream::new(&info, Box::new(source)), fetches)
    }

    fn sample(len: usize) -> Vec<u8> {
        (0..len).map(|i| (i % 251) as u8).collect()
    }

    #[test]
    fn test_read_concatenates_chunks_in_order() {
        let content = sample(100);
        let (mut stream, fetches) = stream_over(&content, 16);
        let mut out = Vec::new();
        stream.read_to_end(&mut out).unwrap();
        assert_eq!(out, content);
        assert_eq!(fetches.load(Ordering::SeqCst), 7);
        assert_eq!(stream.position(), 100);
    }

    #[test]
    fn test_empty_stream_reads_nothing() {
        let (mut stream, fetches) = stream_over(&[], 16);
        let mut out = Vec::new();
        assert_eq!(stream.read_to_end(&mut out).unwrap(), 0);
        assert_eq!(fetches.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_skip_fetches_only_target_chunk() {
        let content = sample(100);
        let (mut stream, fetches) = stream_over(&content, 16);

        assert_eq!(stream.skip(70).unwrap(), 70);
        assert_eq!(fetches.load(Ordering::SeqCst), 1);

        let mut buf = [0u8; 10];
        stream.read_exact(&mut buf).unwrap();
        assert_eq!(&buf[..], &content[70..80]);
    }

    #[test]
    fn test_skip_within_current_chunk() {
        let content = sample(40);
        let (mut stream, fetches) = stream_over(&content, 16);
        let mut buf = [0u8; 2];
        stream.read_exact(&mut buf).unwrap();
        stream.skip(5).unwrap();
        stream.read_exact(&mut buf).unwrap();
        assert_eq!(&buf[..], &content[7..9]);
        assert_eq!(fetches.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_skip_past_end_is_short() {
        let content = sample(20);
        let (mut stream, _) = stream_over(&content, 16);
        assert_eq!(stream.skip(50).unwrap(), 20);
        let mut buf = [0u8; 4];
        assert_eq!(stream.read(&mut buf).unwrap(), 0);
    }

    #[test]
    fn test_skip_to_exact_chunk_boundary() {
        let content = sample(48);
        let (mut stream, _) = stream_over(&content, 16);
        stream.skip(32).unwrap();
        let mut out = Vec::new();
        stream.read_to_end(&mut out).unwrap();
        assert_eq!(out, &content[32..]);
    }

    #[test]
    fn test_missing_chunk_surfaces_file_not_found() {
        let content = sample(48);
        let (mut stream, _) = stream_over(&content, 16);
        // pretend the file was replaced under the stream
        stream.chunk_count = 5;
        stream.length = 80;
        let mut out = Vec::new();
        let err: DirectoryError = stream.read_to_end(&mut out).unwrap_err().into();
        assert!(matches!(err, DirectoryError::FileNotFound(_)));
    }
}
