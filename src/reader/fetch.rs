//! A `Reader` implementation that, for every read, goes and fetches the data
//! from the handler, to reduce the amount of memory and connection time held
//! by open readers.

use std::fmt;
use std::sync::Arc;

use log::trace;

use crate::error::Result;
use crate::handler::BlobHandler;
use crate::reader::{check_range, ensure_open, read_span, skip_exact, Reader};

pub struct FetchReader {
    handler: Arc<dyn BlobHandler>,
    name: String,
    length: u64,
    closed: bool,
}

impl FetchReader {
    pub fn open(handler: Arc<dyn BlobHandler>, name: &str) -> Result<Self> {
        let length = handler.file_length(name)?;
        // fail now rather than on the first refill if the file vanished
        drop(handler.open_read_stream(name)?);
        Ok(Self {
            handler,
            name: name.to_string(),
            length,
            closed: false,
        })
    }
}

impl Reader for FetchReader {
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

        let mut stream = self.handler.open_read_stream(&self.name)?;
        skip_exact(&mut stream, offset)?;
        read_span(&mut stream, count)
    }

    fn close(&mut self) {
        trace!("{}.close()", self);
        self.closed = true;
    }
}

impl fmt::Display for FetchReader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FetchReader:{}/{}", self.handler.namespace(), self.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DirectoryError;
    use crate::handler::mock_store::MockBlobHandler;

    #[test]
    fn test_every_read_opens_a_stream() {
        let handler = Arc::new(MockBlobHandler::new("fetch", 8));
        let content: Vec<u8> = (0..48u8).collect();
        handler.save_file("_0.tvd", &content).unwrap();

        let mut reader = FetchReader::open(handler.clone(), "_0.tvd").unwrap();
        assert_eq!(handler.streams_opened(), 1);

        assert_eq!(reader.read_at(0, 8).unwrap(), &content[0..8]);
        assert_eq!(reader.read_at(30, 10).unwrap(), &content[30..40]);
        assert_eq!(reader.read_at(2, 2).unwrap(), &content[2..4]);
        assert_eq!(handler.streams_opened(), 4);
    }

    #[test]
    fn test_sees_deletion_on_next_read() {
        let handler = Arc::new(MockBlobHandler::new("fetch", 8));
        handler.save_file("_0.tvd", b"some bytes").unwrap();
        let mut reader = FetchReader::open(handler.clone(), "_0.tvd").unwrap();

        handler.delete_file("_0.tvd").unwrap();
        assert!(matches!(reader.read_at(0, 4), Err(DirectoryError::FileNotFound(_))));
    }

    #[test]
    fn test_storage_failure_surfaces() {
        let handler = Arc::new(MockBlobHandler::new("fetch", 8));
        handler.save_file("_0.tvd", b"some bytes").unwrap();
        let mut reader = FetchReader::open(handler.clone(), "_0.tvd").unwrap();

        handler.set_unavailable(true);
        assert!(reader.read_at(0, 4).unwrap_err().is_storage_unavailable());
    }
}
