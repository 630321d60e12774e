//! database.rs
//!
//! Shared SQLite connection. One `Database` is opened per backing database
//! file and handed to every handler that stores a namespace in it.

use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

use log::{debug, info};
use rusqlite::Connection;

use crate::error::{DirectoryError, Result};

/// SQLite connection shared by all handlers on the same database file
#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

impl Database {
    /// Open or create a database file.
    pub fn open<P: AsRef<Path>>(path: P, wal_mode: bool) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open(path).map_err(|e| DirectoryError::DatabaseOpen {
            path: path.to_owned(),
            source: e,
        })?;
        configure_pragmas(&conn, wal_mode)?;

        info!("Opened directory database at {} (wal_mode: {})", path.display(), wal_mode);
        Ok(Self::from_connection(conn))
    }

    /// Create an in-memory database (for testing).
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        configure_pragmas(&conn, false)?;
        debug!("Created in-memory directory database");
        Ok(Self::from_connection(conn))
    }

    /// Wrap an already configured connection.
    pub fn from_connection(conn: Connection) -> Self {
        Self {
            conn: Arc::new(Mutex::new(conn)),
        }
    }

    /// Lock the connection for the duration of one statement or transaction.
    pub(crate) fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| DirectoryError::StorageUnavailable("database connection poisoned".to_string()))
    }
}

fn configure_pragmas(conn: &Connection, wal_mode: bool) -> Result<()> {
    if wal_mode {
        // journal_mode returns the resulting mode as a row
        let _mode: String = conn.query_row("PRAGMA journal_mode = WAL", [], |row| row.get(0))?;
    }
    conn.execute_batch(
        r#"
        PRAGMA synchronous = NORMAL;
        PRAGMA foreign_keys = ON;
        "#,
    )?;
    Ok(())
}
