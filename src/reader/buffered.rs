//! `std::io::Read + Seek` adapter with a refill buffer over a `Reader`

use std::io::{self, Read, Seek, SeekFrom};

use log::trace;

use crate::error::DirectoryError;
use crate::reader::Reader;

/// Buffered input over a `Reader`.
///
/// Every refill is exactly one `Reader::read_at` of at most `buffer_size`
/// bytes, so a `FetchReader` underneath opens one stream per refill.
pub struct BufferedInput {
    reader: Box<dyn Reader>,
    buffer_size: usize,
    buffer: Vec<u8>,
    buffer_start: u64,
    pos: u64,
}

impl BufferedInput {
    pub fn new(reader: Box<dyn Reader>, buffer_size: usize) -> Self {
        Self {
            reader,
            buffer_size: buffer_size.max(1),
            buffer: Vec::new(),
            buffer_start: 0,
            pos: 0,
        }
    }

    pub fn length(&self) -> u64 {
        self.reader.length()
    }

    pub fn file_pointer(&self) -> u64 {
        self.pos
    }

    /// Release the underlying reader
    pub fn close(&mut self) {
        self.buffer.clear();
        self.reader.close();
    }

    fn buffered(&self) -> Option<&[u8]> {
        let end = self.buffer_start + self.buffer.len() as u64;
        if self.pos >= self.buffer_start && self.pos < end {
            Some(&self.buffer[(self.pos - self.buffer_start) as usize..])
        } else {
            None
        }
    }

    fn refill(&mut self) -> io::Result<()> {
        let count = (self.length() - self.pos).min(self.buffer_size as u64) as usize;
        trace!("refill {} at {} ({} bytes)", self.reader.name(), self.pos, count);
        self.buffer = self
            .reader
            .read_at(self.pos, count)
            .map_err(DirectoryError::into_io)?;
        self.buffer_start = self.pos;
        Ok(())
    }
}

impl Read for BufferedInput {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() || self.pos >= self.length() {
            return Ok(0);
        }
        if self.buffered().is_none() {
            self.refill()?;
        }
        let available = self.buffered().unwrap_or_default();
        let n = buf.len().min(available.len());
        buf[..n].copy_from_slice(&available[..n]);
        self.pos += n as u64;
        Ok(n)
    }
}

impl Seek for BufferedInput {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        let target = match pos {
            SeekFrom::Start(offset) => Some(offset),
            SeekFrom::End(delta) => self.length().checked_add_signed(delta),
            SeekFrom::Current(delta) => self.pos.checked_add_signed(delta),
        };
        match target {
            Some(target) => {
                self.pos = target;
                Ok(target)
            }
            None => Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "invalid seek to a negative or overflowing position",
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::mock_store::MockBlobHandler;
    use crate::handler::BlobHandler;
    use crate::reader::{open_reader, ReaderStrategy};
    use std::sync::Arc;

    fn input(strategy: ReaderStrategy, buffer_size: usize) -> (Arc<MockBlobHandler>, BufferedInput, Vec<u8>) {
        let handler = Arc::new(MockBlobHandler::new("buffered", 16));
        let content: Vec<u8> = (0..100u8).collect();
        handler.save_file("_0.fdt", &content).unwrap();
        let reader = open_reader(handler.clone(), "_0.fdt", strategy).unwrap();
        (handler, BufferedInput::new(reader, buffer_size), content)
    }

    #[test]
    fn test_read_to_end() {
        for strategy in [ReaderStrategy::Cached, ReaderStrategy::Fetch] {
            let (_, mut input, content) = input(strategy, 7);
            let mut out = Vec::new();
            input.read_to_end(&mut out).unwrap();
            assert_eq!(out, content);
            assert_eq!(input.file_pointer(), 100);
        }
    }

    #[test]
    fn test_fetch_opens_one_stream_per_refill() {
        let (handler, mut input, _) = input(ReaderStrategy::Fetch, 25);
        let opened_at_start = handler.streams_opened();
        let mut out = Vec::new();
        input.read_to_end(&mut out).unwrap();
        assert_eq!(handler.streams_opened() - opened_at_start, 4);
    }

    #[test]
    fn test_seek_and_read() {
        let (_, mut input, content) = input(ReaderStrategy::Cached, 10);
        let mut buf = [0u8; 5];

        input.seek(SeekFrom::Start(60)).unwrap();
        input.read_exact(&mut buf).unwrap();
        assert_eq!(&buf[..], &content[60..65]);

        input.seek(SeekFrom::Current(-30)).unwrap();
        input.read_exact(&mut buf).unwrap();
        assert_eq!(&buf[..], &content[35..40]);

        input.seek(SeekFrom::End(-5)).unwrap();
        input.read_exact(&mut buf).unwrap();
        assert_eq!(&buf[..], &content[95..100]);
        assert_eq!(input.read(&mut buf).unwrap(), 0);
    }

    #[test]
    fn test_seek_within_buffer_does_not_refill() {
        let (handler, mut input, content) = input(ReaderStrategy::Fetch, 50);
        let mut buf = [0u8; 4];
        input.read_exact(&mut buf).unwrap();
        let opened = handler.streams_opened();

        input.seek(SeekFrom::Start(40)).unwrap();
        input.read_exact(&mut buf).unwrap();
        assert_eq!(&buf[..], &content[40..44]);
        assert_eq!(handler.streams_opened(), opened);
    }

    #[test]
    fn test_negative_seek_fails() {
        let (_, mut input, _) = input(ReaderStrategy::Cached, 10);
        let err = input.seek(SeekFrom::Current(-1)).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidInput);
    }

    #[test]
    fn test_read_after_close_fails() {
        let (_, mut input, _) = input(ReaderStrategy::Cached, 10);
        input.close();
        let mut buf = [0u8; 1];
        let err: DirectoryError = input.read(&mut buf).unwrap_err().into();
        assert!(matches!(err, DirectoryError::InvalidState(_)));
    }
}
