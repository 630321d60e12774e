// src/lib.rs

pub mod app_state;
pub mod config;
pub mod database;
pub mod directory;
pub mod error;
pub mod handler;
pub mod lock;
pub mod reader;
pub mod writer;

pub use directory::DatabaseDirectory;
pub use error::{DirectoryError, Result};
