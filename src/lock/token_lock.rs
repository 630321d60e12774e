use std::fmt;
use std::sync::Arc;

use log::{debug, warn};

use crate::error::{DirectoryError, Result};
use crate::handler::BlobHandler;
use crate::lock::{Lock, LockStrategy};

/// A lock whose token is an empty file stored through the blob handler
pub struct TokenLock {
    handler: Arc<dyn BlobHandler>,
    name: String,
    strategy: LockStrategy,
    held: bool,
    closed: bool,
}

impl TokenLock {
    pub fn new(handler: Arc<dyn BlobHandler>, name: &str, strategy: LockStrategy) -> Self {
        Self {
            handler,
            name: name.to_string(),
            strategy,
            held: false,
            closed: false,
        }
    }

    pub fn strategy(&self) -> LockStrategy {
        self.strategy
    }

    fn create_token(&self) -> Result<bool> {
        match self.strategy {
            LockStrategy::Advisory => self.handler.save_file(&self.name, &[]).map(|_| true),
            LockStrategy::Atomic => self.handler.create_if_absent(&self.name),
        }
    }
}

impl Lock for TokenLock {
    fn name(&self) -> &str {
        &self.name
    }

    fn obtain(&mut self) -> Result<bool> {
        if self.closed {
            return Err(DirectoryError::LockAlreadyReleased(self.name.clone()));
        }
        if self.held {
            return Ok(false);
        }

        // an advisory check that fails is a storage failure, not contention
        if self.strategy == LockStrategy::Advisory && self.handler.file_exists(&self.name)? {
            debug!("{}.obtain() = false", self);
            return Ok(false);
        }

        let obtained = self.create_token().unwrap_or_else(|e| {
            warn!("{}: could not create lock token: {}", self, e);
            false
        });
        debug!("{}.obtain() = {}", self, obtained);
        self.held = obtained;
        Ok(obtained)
    }

    fn is_locked(&self) -> Result<bool> {
        self.handler.file_exists(&self.name)
    }

    fn release(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        if self.held {
            self.handler.delete_file(&self.name)?;
            self.held = false;
        }
        self.closed = true;
        debug!("{}.release()", self);
        Ok(())
    }

    fn ensure_valid(&self) -> Result<()> {
        if self.closed {
            return Err(DirectoryError::LockAlreadyReleased(self.name.clone()));
        }
        if !self.held {
            return Err(DirectoryError::InvalidState(format!(
                "{}: lock was never obtained",
                self.name
            )));
        }
        if !self.handler.file_exists(&self.name)? {
            return Err(DirectoryError::LockAlreadyReleased(self.name.clone()));
        }
        Ok(())
    }
}

impl fmt::Display for TokenLock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TokenLock:{}/{}", self.handler.namespace(), self.name)
    }
}
