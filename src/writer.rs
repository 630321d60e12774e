//! Buffered file writer
//!
//! Output is staged locally (in memory, spilling to an anonymous temporary
//! file past a configured size) and committed to the blob handler exactly
//! once, on `close`. Nothing is visible in the namespace before then.

use std::fmt;
use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::PathBuf;
use std::sync::Arc;

use log::{debug, trace, warn};

use crate::config::StagingConfig;
use crate::error::{DirectoryError, Result};
use crate::handler::BlobHandler;

/// Trait defining the file output interface
pub trait Writer: Send {
    /// Append or overwrite one byte at the current position
    fn write_byte(&mut self, b: u8) -> Result<()>;

    /// Append or overwrite a block at the current position
    fn write_bytes(&mut self, buf: &[u8]) -> Result<()>;

    /// Current logical offset within the staged payload
    fn file_pointer(&self) -> u64;

    /// Staged payload length
    fn length(&self) -> u64;

    /// Move the write position, at most to the current length
    fn seek(&mut self, pos: u64) -> Result<()>;

    /// CRC32 of the bytes written so far; the final value after `close`
    fn checksum(&self) -> u32;

    /// Commit the staged payload. Calling it again is a no-op.
    fn close(&mut self) -> Result<()>;
}

/// Writer lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriterState {
    Open,
    Writing,
    Closed,
}

enum Staging {
    Memory(Vec<u8>),
    Spilled(File),
}

/// Writer that stages the whole payload locally and saves it on `close`
pub struct BufferedFileWriter {
    handler: Arc<dyn BlobHandler>,
    name: String,
    memory_limit: usize,
    temp_path: Option<PathBuf>,
    staging: Option<Staging>,
    state: WriterState,
    pos: u64,
    len: u64,
    digest: crc32fast::Hasher,
    overwritten: bool,
    checksum: u32,
}

impl BufferedFileWriter {
    pub fn new(handler: Arc<dyn BlobHandler>, name: &str, staging: &StagingConfig) -> Self {
        Self {
            handler,
            name: name.to_string(),
            memory_limit: staging.memory_limit,
            temp_path: staging.temp_path.as_ref().map(PathBuf::from),
            staging: Some(Staging::Memory(Vec::new())),
            state: WriterState::Open,
            pos: 0,
            len: 0,
            digest: crc32fast::Hasher::new(),
            overwritten: false,
            checksum: 0,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> WriterState {
        self.state
    }

    /// Whether the payload currently lives in a spill file
    pub fn is_spilled(&self) -> bool {
        matches!(self.staging, Some(Staging::Spilled(_)))
    }

    fn ensure_writable(&mut self) -> Result<()> {
        match self.state {
            WriterState::Closed => Err(DirectoryError::InvalidState(format!(
                "{}: write after close",
                self
            ))),
            _ => {
                self.state = WriterState::Writing;
                Ok(())
            }
        }
    }

    fn spill(&mut self) -> Result<()> {
        let Some(Staging::Memory(buffer)) = &self.staging else {
            return Ok(());
        };
        let mut file = match &self.temp_path {
            Some(dir) => tempfile::tempfile_in(dir)?,
            None => tempfile::tempfile()?,
        };
        file.write_all(buffer)?;
        file.seek(SeekFrom::Start(self.pos))?;
        let staged = buffer.len();

        self.staging = Some(Staging::Spilled(file));
        debug!("{}: spilled {} staged bytes to a temporary file", self, staged);
        Ok(())
    }

    fn stage(&mut self, buf: &[u8]) -> Result<()> {
        let end = self.pos + buf.len() as u64;
        if end > self.memory_limit as u64 {
            self.spill()?;
        }

        match self.staging.as_mut() {
            Some(Staging::Memory(buffer)) => {
                let start = self.pos as usize;
                let overlap = buffer.len().saturating_sub(start).min(buf.len());
                buffer[start..start + overlap].copy_from_slice(&buf[..overlap]);
                buffer.extend_from_slice(&buf[overlap..]);
            }
            Some(Staging::Spilled(file)) => file.write_all(buf)?,
            None => {
                return Err(DirectoryError::InvalidState(format!(
                    "{}: staging already released",
                    self
                )))
            }
        }

        if self.pos < self.len {
            self.overwritten = true;
        }
        self.digest.update(buf);
        self.pos = end;
        self.len = self.len.max(end);
        Ok(())
    }

    fn read_back(staging: Staging) -> Result<Vec<u8>> {
        match staging {
            Staging::Memory(buffer) => Ok(buffer),
            Staging::Spilled(mut file) => {
                file.seek(SeekFrom::Start(0))?;
                let mut content = Vec::new();
                file.read_to_end(&mut content)?;
                Ok(content)
            }
        }
    }
}

impl Writer for BufferedFileWriter {
    fn write_byte(&mut self, b: u8) -> Result<()> {
        trace!("{}.write_byte({})", self, b);
        self.ensure_writable()?;
        self.stage(&[b])
    }

    fn write_bytes(&mut self, buf: &[u8]) -> Result<()> {
        trace!("{}.write_bytes({})", self, buf.len());
        self.ensure_writable()?;
        self.stage(buf)
    }

    fn file_pointer(&self) -> u64 {
        self.pos
    }

    fn length(&self) -> u64 {
        self.len
    }

    fn seek(&mut self, pos: u64) -> Result<()> {
        trace!("{}.seek({})", self, pos);
        if self.state == WriterState::Closed {
            return Err(DirectoryError::InvalidState(format!("{}: seek after close", self)));
        }
        if pos > self.len {
            return Err(DirectoryError::OutOfRange {
                name: self.name.clone(),
                offset: pos,
                count: 0,
                length: self.len,
            });
        }
        if let Some(Staging::Spilled(file)) = self.staging.as_mut() {
            file.seek(SeekFrom::Start(pos))?;
        }
        self.pos = pos;
        Ok(())
    }

    fn checksum(&self) -> u32 {
        if self.state == WriterState::Closed {
            self.checksum
        } else {
            self.digest.clone().finalize()
        }
    }

    fn close(&mut self) -> Result<()> {
        if self.state == WriterState::Closed {
            return Ok(());
        }
        trace!("{}.close()", self);
        self.state = WriterState::Closed;

        // dropping the staging value releases the spill file on every path
        let staging = self.staging.take().ok_or_else(|| {
            DirectoryError::InvalidState(format!("{}: staging already released", self))
        })?;
        let content = Self::read_back(staging)?;

        self.checksum = crc32fast::hash(&content);
        if !self.overwritten && self.checksum != self.digest.clone().finalize() {
            warn!("{}: running checksum differs from staged payload", self);
        }

        self.handler.save_file(&self.name, &content)?;
        debug!("{}: committed {} bytes (crc32 {:08x})", self, content.len(), self.checksum);
        Ok(())
    }
}

impl Write for BufferedFileWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.write_bytes(buf).map_err(DirectoryError::into_io)?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Drop for BufferedFileWriter {
    fn drop(&mut self) {
        if self.state != WriterState::Closed {
            warn!("{}: dropped without close, {} staged bytes discarded", self, self.len);
        }
    }
}

impl fmt::Display for BufferedFileWriter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BufferedFileWriter:{}/{}", self.handler.namespace(), self.name)
    }
}
