//! Application State Management
//!
//! Builds directories from configuration. One `Database` connection is
//! opened per application and shared by the handlers of every namespace,
//! which are injected into each `DatabaseDirectory` at construction.

use std::sync::Arc;

use log::info;

use crate::config::{AppConfig, DirectoryConfig, HandlerBackend};
use crate::database::Database;
use crate::directory::DatabaseDirectory;
use crate::error::Result;
use crate::handler::mock_store::MockBlobHandler;
use crate::handler::sqlite_store::SqliteBlobHandler;
use crate::handler::{validate_table_name, BlobHandler};

/// Application state holding the configuration and the shared connection
#[derive(Clone)]
pub struct AppState {
    pub config: AppConfig,
    database: Option<Database>,
}

impl AppState {
    /// Create a new application state from `config.yaml` or defaults
    pub fn new() -> Result<Self> {
        Self::from_config(AppConfig::load()?)
    }

    /// Create application state from configuration
    pub fn from_config(config: AppConfig) -> Result<Self> {
        info!("Initializing application state with configuration");

        let database = match config.database.backend {
            HandlerBackend::Sqlite => {
                info!(
                    "Using SQLite handler backend with db_path: {}, wal_mode: {}, dialect: {:?}",
                    config.database.db_path, config.database.wal_mode, config.database.dialect
                );
                Some(Database::open(&config.database.db_path, config.database.wal_mode)?)
            }
            HandlerBackend::Mock => {
                info!("Using mock handler backend");
                None
            }
        };

        info!("Application state initialized successfully");
        Ok(Self { config, database })
    }

    /// Create application state for testing with the mock backend
    pub fn new_for_testing() -> Self {
        let mut config = AppConfig::default();
        config.database.backend = HandlerBackend::Mock;
        Self {
            config,
            database: None,
        }
    }

    /// Directory over the configured table
    pub fn directory(&self) -> Result<DatabaseDirectory> {
        self.open_directory(&self.config.directory.table_name)
    }

    /// Directory over `table`, sharing this state's connection
    pub fn open_directory(&self, table: &str) -> Result<DatabaseDirectory> {
        validate_table_name(table)?;
        let directory_config = DirectoryConfig {
            table_name: table.to_string(),
            ..self.config.directory.clone()
        };

        let handler: Arc<dyn BlobHandler> = match &self.database {
            Some(db) => Arc::new(SqliteBlobHandler::new(
                db.clone(),
                table,
                directory_config.threshold,
            )?),
            None => Arc::new(MockBlobHandler::new(table, directory_config.threshold)),
        };

        DatabaseDirectory::new(handler, directory_config, self.config.database.dialect)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DirectoryError;

    #[test]
    fn test_new_for_testing_uses_mock() {
        let state = AppState::new_for_testing();
        let dir = state.directory().unwrap();
        assert_eq!(dir.handler().namespace(), "search_index");
        assert!(dir.list_files().unwrap().is_empty());
    }

    #[test]
    fn test_sqlite_namespaces_share_connection() {
        let tmp = tempfile::tempdir().unwrap();
        let mut config = AppConfig::default();
        config.database.db_path = tmp.path().join("dir.db").to_string_lossy().into_owned();
        config.directory.threshold = 8;
        let state = AppState::from_config(config).unwrap();

        let first = state.open_directory("index_a").unwrap();
        let second = state.open_directory("index_b").unwrap();
        first.handler().save_file("seg", b"first index").unwrap();

        assert!(first.file_exists("seg").unwrap());
        assert!(!second.file_exists("seg").unwrap());
        assert_eq!(first.file_info("seg").unwrap().chunk_count, 2);
    }

    #[test]
    fn test_invalid_table_rejected() {
        let state = AppState::new_for_testing();
        assert!(matches!(
            state.open_directory("bad name"),
            Err(DirectoryError::InvalidTableName(_))
        ));
    }
}
