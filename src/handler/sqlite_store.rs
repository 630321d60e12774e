//! SQLite implementation of the BlobHandler trait
//!
//! A namespace is stored as two tables: one row per committed file and one
//! row per chunk. Every save inserts a fresh file row, so its
//! `AUTOINCREMENT` id acts as the version that chunk rows and open read
//! streams are pinned to.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use log::{debug, info};
use rusqlite::{params, Connection, OptionalExtension};

use crate::database::Database;
use crate::error::{DirectoryError, Result};
use crate::handler::{
    chunk_count, split_chunks, validate_table_name, BlobHandler, ChunkSource, ChunkStream,
    StoredFile,
};

const DDL_TEMPLATE: &str = r#"
CREATE TABLE IF NOT EXISTS "{table}" (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL UNIQUE,
    length INTEGER NOT NULL,
    checksum INTEGER NOT NULL,
    chunk_size INTEGER NOT NULL,
    chunk_count INTEGER NOT NULL,
    modified_at TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS "{table}_chunks" (
    file_id INTEGER NOT NULL,
    seq INTEGER NOT NULL,
    bytes BLOB NOT NULL,
    PRIMARY KEY (file_id, seq)
);
"#;

/// SQLite implementation of BlobHandler
pub struct SqliteBlobHandler {
    db: Database,
    table: String,
    chunks_table: String,
    threshold: usize,
}

impl SqliteBlobHandler {
    /// Create a handler for `table` on a shared database connection
    pub fn new(db: Database, table: &str, threshold: usize) -> Result<Self> {
        validate_table_name(table)?;
        if threshold == 0 {
            return Err(DirectoryError::InvalidConfig(
                "chunk threshold must be greater than zero".to_string(),
            ));
        }
        info!("Creating SQLite blob handler for table {} (threshold: {} bytes)", table, threshold);
        Ok(Self {
            db,
            table: table.to_string(),
            chunks_table: format!("{}_chunks", table),
            threshold,
        })
    }

    /// DDL creating the namespace tables
    pub fn ddl(&self) -> String {
        DDL_TEMPLATE.replace("{table}", &self.table)
    }

    fn lookup(&self, conn: &Connection, name: &str) -> Result<Option<(i64, StoredFile)>> {
        let sql = format!(
            "SELECT id, name, length, checksum, chunk_size, chunk_count, modified_at FROM \"{}\" WHERE name = ?1",
            self.table
        );
        let found = conn
            .query_row(&sql, params![name], |row| {
                let modified_at: DateTime<Utc> = row.get(6)?;
                Ok((
                    row.get::<_, i64>(0)?,
                    StoredFile {
                        name: row.get(1)?,
                        length: row.get::<_, i64>(2)? as u64,
                        checksum: row.get::<_, i64>(3)? as u32,
                        chunk_size: row.get::<_, i64>(4)? as u64,
                        chunk_count: row.get::<_, i64>(5)? as u64,
                        modified_at,
                    },
                ))
            })
            .optional()?;
        Ok(found)
    }

    /// Number of chunk rows currently stored for `name`
    pub fn stored_chunk_rows(&self, name: &str) -> Result<u64> {
        let conn = self.db.lock()?;
        let sql = format!(
            "SELECT COUNT(*) FROM \"{}\" c JOIN \"{}\" f ON c.file_id = f.id WHERE f.name = ?1",
            self.chunks_table, self.table
        );
        let count: i64 = conn.query_row(&sql, params![name], |row| row.get(0))?;
        Ok(count as u64)
    }

    /// Total number of chunk rows in the namespace, orphans included
    pub fn total_chunk_rows(&self) -> Result<u64> {
        let conn = self.db.lock()?;
        let sql = format!("SELECT COUNT(*) FROM \"{}\"", self.chunks_table);
        let count: i64 = conn.query_row(&sql, [], |row| row.get(0))?;
        Ok(count as u64)
    }
}

impl BlobHandler for SqliteBlobHandler {
    fn namespace(&self) -> &str {
        &self.table
    }

    fn threshold(&self) -> usize {
        self.threshold
    }

    fn namespace_exists(&self) -> Result<bool> {
        let conn = self.db.lock()?;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name IN (?1, ?2)",
            params![self.table, self.chunks_table],
            |row| row.get(0),
        )?;
        Ok(count == 2)
    }

    fn create_namespace(&self) -> Result<()> {
        let conn = self.db.lock()?;
        conn.execute_batch(&self.ddl())?;
        debug!("Created namespace tables for {}", self.table);
        Ok(())
    }

    fn list_files(&self) -> Result<HashSet<String>> {
        let conn = self.db.lock()?;
        let mut stmt = conn.prepare(&format!("SELECT name FROM \"{}\"", self.table))?;
        let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;

        let mut names = HashSet::new();
        for row in rows {
            names.insert(row?);
        }
        Ok(names)
    }

    fn file_exists(&self, name: &str) -> Result<bool> {
        let conn = self.db.lock()?;
        let sql = format!("SELECT COUNT(*) FROM \"{}\" WHERE name = ?1", self.table);
        let count: i64 = conn.query_row(&sql, params![name], |row| row.get(0))?;
        Ok(count > 0)
    }

    fn file_info(&self, name: &str) -> Result<StoredFile> {
        let conn = self.db.lock()?;
        self.lookup(&conn, name)?
            .map(|(_, info)| info)
            .ok_or_else(|| DirectoryError::FileNotFound(name.to_string()))
    }

    fn delete_file(&self, name: &str) -> Result<()> {
        let mut conn = self.db.lock()?;
        let tx = conn.transaction()?;
        let id: Option<i64> = tx
            .query_row(
                &format!("SELECT id FROM \"{}\" WHERE name = ?1", self.table),
                params![name],
                |row| row.get(0),
            )
            .optional()?;

        if let Some(id) = id {
            tx.execute(&format!("DELETE FROM \"{}\" WHERE id = ?1", self.table), params![id])?;
            tx.execute(
                &format!("DELETE FROM \"{}\" WHERE file_id = ?1", self.chunks_table),
                params![id],
            )?;
        }
        tx.commit()?;
        Ok(())
    }

    fn open_read_stream(&self, name: &str) -> Result<ChunkStream> {
        let (file_id, info) = {
            let conn = self.db.lock()?;
            self.lookup(&conn, name)?
                .ok_or_else(|| DirectoryError::FileNotFound(name.to_string()))?
        };
        let source = SqliteChunkSource {
            db: self.db.clone(),
            sql: format!(
                "SELECT bytes FROM \"{}\" WHERE file_id = ?1 AND seq = ?2",
                self.chunks_table
            ),
            file_id,
            name: name.to_string(),
        };
        Ok(ChunkStream::new(&info, Box::new(source)))
    }

    fn save_file(&self, name: &str, content: &[u8]) -> Result<()> {
        let length = content.len() as u64;
        let chunks = chunk_count(length, self.threshold as u64);
        let checksum = crc32fast::hash(content);

        let mut conn = self.db.lock()?;
        let tx = conn.transaction()?;
        let previous: Option<i64> = tx
            .query_row(
                &format!("SELECT id FROM \"{}\" WHERE name = ?1", self.table),
                params![name],
                |row| row.get(0),
            )
            .optional()?;

        if let Some(id) = previous {
            tx.execute(&format!("DELETE FROM \"{}\" WHERE id = ?1", self.table), params![id])?;
        }
        tx.execute(
            &format!(
                "INSERT INTO \"{}\" (name, length, checksum, chunk_size, chunk_count, modified_at) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                self.table
            ),
            params![
                name,
                length as i64,
                checksum as i64,
                self.threshold as i64,
                chunks as i64,
                Utc::now()
            ],
        )?;
        let file_id = tx.last_insert_rowid();

        {
            let mut stmt = tx.prepare(&format!(
                "INSERT INTO \"{}\" (file_id, seq, bytes) VALUES (?1, ?2, ?3)",
                self.chunks_table
            ))?;
            for (seq, chunk) in split_chunks(content, self.threshold).enumerate() {
                stmt.execute(params![file_id, seq as i64, chunk])?;
            }
        }

        if let Some(id) = previous {
            tx.execute(
                &format!("DELETE FROM \"{}\" WHERE file_id = ?1", self.chunks_table),
                params![id],
            )?;
        }
        tx.commit()?;

        debug!("Saved {} ({} bytes, {} chunks) in {}", name, length, chunks, self.table);
        Ok(())
    }

    fn create_if_absent(&self, name: &str) -> Result<bool> {
        let conn = self.db.lock()?;
        let inserted = conn.execute(
            &format!(
                "INSERT OR IGNORE INTO \"{}\" (name, length, checksum, chunk_size, chunk_count, modified_at) \
                 VALUES (?1, 0, 0, ?2, 0, ?3)",
                self.table
            ),
            params![name, self.threshold as i64, Utc::now()],
        )?;
        Ok(inserted == 1)
    }
}

/// Fetches chunk rows of one pinned file id
struct SqliteChunkSource {
    db: Database,
    sql: String,
    file_id: i64,
    name: String,
}

impl ChunkSource for SqliteChunkSource {
    fn fetch(&mut self, seq: u64) -> Result<Vec<u8>> {
        let conn = self.db.lock()?;
        conn.query_row(&self.sql, params![self.file_id, seq as i64], |row| row.get(0))
            .optional()?
            .ok_or_else(|| DirectoryError::FileNotFound(self.name.clone()))
    }
}
