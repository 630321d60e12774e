//! Reader that caches one open stream and seeks within it

use std::fmt;
use std::sync::Arc;

use log::trace;

use crate::error::Result;
use crate::handler::{BlobHandler, ChunkStream};
use crate::reader::{check_range, ensure_open, read_span, skip_exact, Reader};

/// A `Reader` holding one handler stream for its whole lifetime.
///
/// Forward reads skip ahead on the open stream. A read behind the stream
/// position discards it and reopens from the start, so backward seeks cost
/// a rescan up to the target offset.
pub struct CachedStreamReader {
    handler: Arc<dyn BlobHandler>,
    name: String,
    length: u64,
    stream: Option<ChunkStream>,
    reopens: usize,
    closed: bool,
}

impl CachedStreamReader {
    pub fn open(handler: Arc<dyn BlobHandler>, name: &str) -> Result<Self> {
        let length = handler.file_length(name)?;
        let stream = handler.open_read_stream(name)?;
        Ok(Self {
            handler,
            name: name.to_string(),
            length,
            stream: Some(stream),
            reopens: 0,
            closed: false,
        })
    }

    /// How many times the stream had to be reopened for a backward read
    pub fn reopens(&self) -> usize {
        self.reopens
    }
}

impl Reader for CachedStreamReader {
    fn name(&self) -> &str {
        &self.name
    }

    fn length(&self) -> u64 {
        self.length
    }

    fn read_at(&mut self, offset: u64, count: usize) -> Result<Vec<u8>> {
        trace!("{}.read_at({}, {})", self, offset, count);
        ensure_open(&self.name, self.closed)?;
        check_range(&self.name, offset, count, self.length)?;
        if count == 0 {
            return Ok(Vec::new());
        }

        let mut stream = match self.stream.take() {
            Some(stream) if offset >= stream.position() => stream,
            _ => {
                trace!("{}: reopening stream for read at {}", self, offset);
                self.reopens += 1;
                self.handler.open_read_stream(&self.name)?
            }
        };

        // a stream that failed mid-read is dropped, its position is unknown
        let gap = offset - stream.position();
        if gap > 0 {
            skip_exact(&mut stream, gap)?;
        }
        let data = read_span(&mut stream, count)?;
        self.stream = Some(stream);
        Ok(data)
    }

    fn close(&mut self) {
        trace!("{}.close()", self);
        self.stream = None;
        self.closed = true;
    }
}

impl fmt::Display for CachedStreamReader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CachedStreamReader:{}/{}", self.handler.namespace(), self.name)
    }
}
