//! The file-store contract consumed by the indexing engine
//!
//! `DatabaseDirectory` hands out writers, readers and locks for one
//! namespace. It owns no state besides configuration, every operation goes
//! straight to the shared `BlobHandler` it was constructed with.

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use log::{debug, info};

use crate::config::{Dialect, DirectoryConfig};
use crate::error::Result;
use crate::handler::{BlobHandler, StoredFile};
use crate::lock::{Lock, TokenLock};
use crate::reader::{open_reader, BufferedInput, Reader};
use crate::writer::{BufferedFileWriter, Writer};

pub struct DatabaseDirectory {
    handler: Arc<dyn BlobHandler>,
    config: DirectoryConfig,
}

impl fmt::Debug for DatabaseDirectory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DatabaseDirectory")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl DatabaseDirectory {
    /// Create a directory over `handler`.
    ///
    /// When the dialect can tell whether the table exists, a missing
    /// namespace is created here. Otherwise the table is assumed to exist.
    pub fn new(
        handler: Arc<dyn BlobHandler>,
        config: DirectoryConfig,
        dialect: Dialect,
    ) -> Result<Self> {
        if dialect.supports_table_exists() && !handler.namespace_exists()? {
            info!(
                "Creating namespace {} ({})",
                handler.namespace(),
                dialect.template_name()
            );
            handler.create_namespace()?;
        }
        Ok(Self { handler, config })
    }

    pub fn handler(&self) -> &Arc<dyn BlobHandler> {
        &self.handler
    }

    pub fn config(&self) -> &DirectoryConfig {
        &self.config
    }

    pub fn list_files(&self) -> Result<HashSet<String>> {
        debug!("{}.list_files()", self);
        self.handler.list_files()
    }

    pub fn file_exists(&self, name: &str) -> Result<bool> {
        self.handler.file_exists(name)
    }

    pub fn file_length(&self, name: &str) -> Result<u64> {
        debug!("{}.file_length({})", self, name);
        self.handler.file_length(name)
    }

    pub fn file_info(&self, name: &str) -> Result<StoredFile> {
        self.handler.file_info(name)
    }

    pub fn delete_file(&self, name: &str) -> Result<()> {
        debug!("{}.delete_file({})", self, name);
        self.handler.delete_file(name)
    }

    /// Start a new version of `name`. Nothing is visible until the writer
    /// is closed.
    pub fn open_writer(&self, name: &str) -> Result<Box<dyn Writer>> {
        debug!("{}.open_writer({})", self, name);
        Ok(Box::new(BufferedFileWriter::new(
            self.handler.clone(),
            name,
            &self.config.staging,
        )))
    }

    /// Open a random-access reader using the configured strategy
    pub fn open_reader(&self, name: &str) -> Result<Box<dyn Reader>> {
        debug!("{}.open_reader({}) [{:?}]", self, name, self.config.reader);
        open_reader(self.handler.clone(), name, self.config.reader)
    }

    /// Open a reader wrapped in a `Read + Seek` refill buffer
    pub fn open_input(&self, name: &str) -> Result<BufferedInput> {
        let reader = self.open_reader(name)?;
        Ok(BufferedInput::new(reader, self.config.read_buffer_size))
    }

    pub fn sync_files(&self, names: &[String]) -> Result<()> {
        debug!("{}.sync_files({:?})", self, names);
        self.handler.sync_files(names)
    }

    pub fn make_lock(&self, name: &str) -> Box<dyn Lock> {
        debug!("{}.make_lock({}) [{:?}]", self, name, self.config.lock);
        Box::new(TokenLock::new(self.handler.clone(), name, self.config.lock))
    }

    /// Forcibly remove a lock token, whoever holds it
    pub fn clear_lock(&self, name: &str) -> Result<()> {
        debug!("{}.clear_lock({})", self, name);
        self.handler.delete_file(name)
    }
}

impl fmt::Display for DatabaseDirectory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DatabaseDirectory@{}", self.handler.namespace())
    }
}
