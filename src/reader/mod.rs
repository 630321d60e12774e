//! Streaming file readers
//!
//! Two strategies satisfy random-access reads on top of the forward-only
//! handler stream:
//!
//! - `cached`: keeps one stream open for the reader's lifetime and skips
//!   forward on it; a backward read reopens it from the start.
//! - `fetch`: opens a fresh stream for every read, skips to the offset and
//!   drops it again, so nothing is held between reads.

pub mod buffered;
pub mod cached;
pub mod fetch;

use std::io::Read;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::{DirectoryError, Result};
use crate::handler::{BlobHandler, ChunkStream};

pub use buffered::BufferedInput;
pub use cached::CachedStreamReader;
pub use fetch::FetchReader;

/// Trait defining the random-access file input interface
pub trait Reader: Send {
    /// File name
    fn name(&self) -> &str;

    /// Length fixed when the reader was opened
    fn length(&self) -> u64;

    /// Read exactly `count` bytes starting at `offset`
    fn read_at(&mut self, offset: u64, count: usize) -> Result<Vec<u8>>;

    /// Release held resources. Further reads fail with `InvalidState`.
    fn close(&mut self);
}

/// Available read strategies
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum ReaderStrategy {
    /// One cached stream per reader
    #[default]
    Cached,
    /// A new stream for every read
    Fetch,
}

impl std::str::FromStr for ReaderStrategy {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "cached" | "stream" => Ok(ReaderStrategy::Cached),
            "fetch" | "per_refill" => Ok(ReaderStrategy::Fetch),
            _ => Err(format!("Unknown reader strategy: {}", s)),
        }
    }
}

/// Open a reader for `name` with the given strategy
pub fn open_reader(
    handler: Arc<dyn BlobHandler>,
    name: &str,
    strategy: ReaderStrategy,
) -> Result<Box<dyn Reader>> {
    Ok(match strategy {
        ReaderStrategy::Cached => Box::new(CachedStreamReader::open(handler, name)?),
        ReaderStrategy::Fetch => Box::new(FetchReader::open(handler, name)?),
    })
}

pub(crate) fn check_range(name: &str, offset: u64, count: usize, length: u64) -> Result<()> {
    match offset.checked_add(count as u64) {
        Some(end) if end <= length => Ok(()),
        _ => Err(DirectoryError::OutOfRange {
            name: name.to_string(),
            offset,
            count: count as u64,
            length,
        }),
    }
}

pub(crate) fn ensure_open(name: &str, closed: bool) -> Result<()> {
    if closed {
        return Err(DirectoryError::InvalidState(format!("{}: read after close", name)));
    }
    Ok(())
}

/// Skip `n` bytes, failing if the stream ends first
pub(crate) fn skip_exact(stream: &mut ChunkStream, n: u64) -> Result<()> {
    let skipped = stream.skip(n)?;
    if skipped < n {
        return Err(DirectoryError::Io(std::io::Error::new(
            std::io::ErrorKind::UnexpectedEof,
            format!("{}: stream ended after skipping {} of {} bytes", stream.name(), skipped, n),
        )));
    }
    Ok(())
}

pub(crate) fn read_span(stream: &mut ChunkStream, count: usize) -> Result<Vec<u8>> {
    let mut buf = vec![0u8; count];
    stream.read_exact(&mut buf)?;
    Ok(buf)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::mock_store::MockBlobHandler;

    #[test]
    fn test_reader_strategy_from_str() {
        assert_eq!("cached".parse::<ReaderStrategy>().unwrap(), ReaderStrategy::Cached);
        assert_eq!("FETCH".parse::<ReaderStrategy>().unwrap(), ReaderStrategy::Fetch);
        assert_eq!("per_refill".parse::<ReaderStrategy>().unwrap(), ReaderStrategy::Fetch);
        assert!("random".parse::<ReaderStrategy>().is_err());
    }

    #[test]
    fn test_check_range() {
        assert!(check_range("f", 0, 10, 10).is_ok());
        assert!(check_range("f", 10, 0, 10).is_ok());
        assert!(check_range("f", 5, 6, 10).is_err());
        assert!(check_range("f", u64::MAX, 1, 10).is_err());
        assert!(matches!(check_range("f", 0, 1, 0), Err(DirectoryError::OutOfRange { .. })));
    }

    /// Backward-seek correctness: a cached reader jumping around returns the
    /// same bytes as a fresh per-read fetch
    #[test]
    fn test_strategies_agree_on_jumping_reads() {
        let handler = Arc::new(MockBlobHandler::new("readers", 16));
        let content: Vec<u8> = (0..200u32).map(|i| (i * 13 % 256) as u8).collect();
        handler.save_file("_0.frq", &content).unwrap();

        let mut cached = open_reader(handler.clone(), "_0.frq", ReaderStrategy::Cached).unwrap();
        for (offset, count) in [(0u64, 10usize), (50, 10), (5, 10), (190, 10), (0, 200)] {
            let mut fresh = open_reader(handler.clone(), "_0.frq", ReaderStrategy::Fetch).unwrap();
            let expected = &content[offset as usize..offset as usize + count];
            assert_eq!(cached.read_at(offset, count).unwrap(), expected);
            assert_eq!(fresh.read_at(offset, count).unwrap(), expected);
        }
    }

    #[test]
    fn test_zero_length_file() {
        let handler = Arc::new(MockBlobHandler::new("readers", 16));
        handler.save_file("empty", &[]).unwrap();

        for strategy in [ReaderStrategy::Cached, ReaderStrategy::Fetch] {
            let mut reader = open_reader(handler.clone(), "empty", strategy).unwrap();
            assert_eq!(reader.length(), 0);
            assert!(reader.read_at(0, 0).unwrap().is_empty());
            assert!(matches!(reader.read_at(0, 1), Err(DirectoryError::OutOfRange { .. })));
        }
    }

    #[test]
    fn test_missing_file_fails_at_open() {
        let handler = Arc::new(MockBlobHandler::new("readers", 16));
        for strategy in [ReaderStrategy::Cached, ReaderStrategy::Fetch] {
            assert!(matches!(
                open_reader(handler.clone(), "missing", strategy),
                Err(DirectoryError::FileNotFound(_))
            ));
        }
    }

    /// Deletes the file right after reporting its length, so the first
    /// stream open races a concurrent delete
    struct DeletedAfterLength {
        inner: MockBlobHandler,
    }

    impl BlobHandler for DeletedAfterLength {
        fn namespace(&self) -> &str {
            self.inner.namespace()
        }

        fn threshold(&self) -> usize {
            self.inner.threshold()
        }

        fn namespace_exists(&self) -> Result<bool> {
            self.inner.namespace_exists()
        }

        fn create_namespace(&self) -> Result<()> {
            self.inner.create_namespace()
        }

        fn list_files(&self) -> Result<std::collections::HashSet<String>> {
            self.inner.list_files()
        }

        fn file_exists(&self, name: &str) -> Result<bool> {
            self.inner.file_exists(name)
        }

        fn file_length(&self, name: &str) -> Result<u64> {
            let length = self.inner.file_length(name)?;
            self.inner.delete_file(name)?;
            Ok(length)
        }

        fn file_info(&self, name: &str) -> Result<crate::handler::StoredFile> {
            self.inner.file_info(name)
        }

        fn delete_file(&self, name: &str) -> Result<()> {
            self.inner.delete_file(name)
        }

        fn open_read_stream(&self, name: &str) -> Result<ChunkStream> {
            self.inner.open_read_stream(name)
        }

        fn save_file(&self, name: &str, content: &[u8]) -> Result<()> {
            self.inner.save_file(name, content)
        }

        fn create_if_absent(&self, name: &str) -> Result<bool> {
            self.inner.create_if_absent(name)
        }
    }

    #[test]
    fn test_file_deleted_between_length_and_open() {
        for strategy in [ReaderStrategy::Cached, ReaderStrategy::Fetch] {
            let handler = Arc::new(DeletedAfterLength {
                inner: MockBlobHandler::new("readers", 16),
            });
            handler.save_file("_0.fnm", b"field infos").unwrap();

            let result = open_reader(handler.clone(), "_0.fnm", strategy);
            assert!(
                matches!(result, Err(DirectoryError::FileNotFound(ref name)) if name == "_0.fnm"),
                "{:?} reader opened a vanished file",
                strategy
            );
            assert!(!handler.file_exists("_0.fnm").unwrap());
        }
    }

    #[test]
    fn test_read_after_close() {
        let handler = Arc::new(MockBlobHandler::new("readers", 16));
        handler.save_file("a", b"abc").unwrap();
        for strategy in [ReaderStrategy::Cached, ReaderStrategy::Fetch] {
            let mut reader = open_reader(handler.clone(), "a", strategy).unwrap();
            reader.close();
            reader.close();
            assert!(matches!(reader.read_at(0, 1), Err(DirectoryError::InvalidState(_))));
        }
    }
}
