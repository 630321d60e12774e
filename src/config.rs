//! Application Configuration
//!
//! This module provides configuration management for the directory store,
//! supporting YAML configuration files with sensible defaults and a small
//! set of environment overrides.

use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::Path;
use log::{info, warn};

use crate::error::{DirectoryError, Result};
use crate::handler::validate_table_name;
use crate::lock::LockStrategy;
use crate::reader::ReaderStrategy;

/// Blob handler backend types
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum HandlerBackend {
    #[default]
    Sqlite,
    Mock,
}

impl std::str::FromStr for HandlerBackend {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "sqlite" => Ok(HandlerBackend::Sqlite),
            "mock" => Ok(HandlerBackend::Mock),
            _ => Err(format!("Unknown handler backend: {}", s)),
        }
    }
}

/// SQL dialect (DDL template) of the backing database
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum Dialect {
    #[default]
    Sqlite,
}

impl Dialect {
    /// Whether the dialect can check for an existing table before creating it
    pub fn supports_table_exists(&self) -> bool {
        match self {
            Dialect::Sqlite => true,
        }
    }

    /// Name of the DDL template for this dialect
    pub fn template_name(&self) -> &'static str {
        match self {
            Dialect::Sqlite => "sqlite.sql",
        }
    }
}

impl std::str::FromStr for Dialect {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "sqlite" | "sqlite.sql" => Ok(Dialect::Sqlite),
            _ => Err(format!("Unsupported SQL dialect: {}", s)),
        }
    }
}

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct AppConfig {
    /// Backing database configuration
    pub database: DatabaseConfig,
    /// Directory (namespace) configuration
    pub directory: DirectoryConfig,
    /// Logging configuration
    pub logging: LoggingConfig,
}

/// Backing database configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DatabaseConfig {
    /// Handler backend type
    pub backend: HandlerBackend,
    /// Database file path
    pub db_path: String,
    /// Enable WAL mode
    pub wal_mode: bool,
    /// DDL/dialect template
    pub dialect: Dialect,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            backend: HandlerBackend::Sqlite,
            db_path: "./data/directory.db".to_string(),
            wal_mode: true,
            dialect: Dialect::Sqlite,
        }
    }
}

/// Directory configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DirectoryConfig {
    /// Table holding the directory files
    pub table_name: String,
    /// Maximum bytes per chunk row
    pub threshold: usize,
    /// Read strategy for opened inputs
    pub reader: ReaderStrategy,
    /// Lock strategy for `make_lock`
    pub lock: LockStrategy,
    /// Refill buffer size of buffered inputs
    pub read_buffer_size: usize,
    /// Writer staging configuration
    pub staging: StagingConfig,
}

impl Default for DirectoryConfig {
    fn default() -> Self {
        Self {
            table_name: "search_index".to_string(),
            threshold: 1024 * 1024, // 1MB
            reader: ReaderStrategy::Cached,
            lock: LockStrategy::Advisory,
            read_buffer_size: 1024,
            staging: StagingConfig::default(),
        }
    }
}

/// Writer staging configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct StagingConfig {
    /// Bytes kept in memory before spilling to a temporary file
    pub memory_limit: usize,
    /// Directory for spill files, system temp dir if unset
    pub temp_path: Option<String>,
}

impl Default for StagingConfig {
    fn default() -> Self {
        Self {
            memory_limit: 8 * 1024 * 1024, // 8MB
            temp_path: None,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LoggingConfig {
    /// Path to log4rs configuration file
    pub config_file: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            config_file: "log4rs.yaml".to_string(),
        }
    }
}

impl AppConfig {
    /// Load configuration from `config.yaml`, use defaults if not found
    pub fn load() -> Result<Self> {
        let config_path = "config.yaml";
        if Path::new(config_path).exists() {
            Self::load_from(config_path)
        } else {
            warn!("Config file not found, using defaults");
            let mut config = Self::default();
            config.apply_env_overrides();
            config.validate()?;
            Ok(config)
        }
    }

    /// Load configuration from an explicit YAML file
    pub fn load_from<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)?;
        let mut config = Self::from_yaml(&content)?;
        info!("Loaded configuration from {}", path.display());
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Parse configuration from YAML text
    pub fn from_yaml(content: &str) -> Result<Self> {
        serde_yaml::from_str(content).map_err(|e| DirectoryError::InvalidConfig(e.to_string()))
    }

    /// Override configured values from environment variables
    pub fn apply_env_overrides(&mut self) {
        if let Ok(backend) = env::var("DIRECTORY_BACKEND") {
            match backend.parse::<HandlerBackend>() {
                Ok(backend) => {
                    info!("Using handler backend from environment: {:?}", backend);
                    self.database.backend = backend;
                }
                Err(e) => warn!("Invalid handler backend in environment: {}. Keeping {:?}.", e, self.database.backend),
            }
        }

        if let Ok(path) = env::var("DIRECTORY_DB_FILE") {
            info!("Using database path from environment: {}", path);
            self.database.db_path = path;
        }

        if let Ok(reader) = env::var("DIRECTORY_READER") {
            match reader.parse::<ReaderStrategy>() {
                Ok(reader) => {
                    info!("Using reader strategy from environment: {:?}", reader);
                    self.directory.reader = reader;
                }
                Err(e) => warn!("Invalid reader strategy in environment: {}. Keeping {:?}.", e, self.directory.reader),
            }
        }

        if let Ok(threshold) = env::var("DIRECTORY_THRESHOLD") {
            match threshold.parse::<usize>() {
                Ok(threshold) if threshold > 0 => {
                    info!("Using chunk threshold from environment: {}", threshold);
                    self.directory.threshold = threshold;
                }
                _ => warn!("Invalid chunk threshold in environment: {}. Keeping {}.", threshold, self.directory.threshold),
            }
        }
    }

    /// Reject values no directory can work with
    pub fn validate(&self) -> Result<()> {
        if self.directory.threshold == 0 {
            return Err(DirectoryError::InvalidConfig("directory.threshold must be greater than zero".to_string()));
        }
        if self.directory.read_buffer_size == 0 {
            return Err(DirectoryError::InvalidConfig("directory.read_buffer_size must be greater than zero".to_string()));
        }
        validate_table_name(&self.directory.table_name)
            .map_err(|e| DirectoryError::InvalidConfig(e.to_string()))
    }
}
