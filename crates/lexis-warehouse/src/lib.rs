//! # Lexis Warehouse
//!
//! DuckDB-backed durable record store used as the cross-restart tier of the
//! lexis result cache.
//!
//! Records are opaque to this crate: a content-addressed key, a serialized
//! payload and the two RFC 3339 timestamps bounding its validity. Decoding
//! the payload (and deciding what a corrupt payload means) is the caller's job.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use lexis_warehouse::{CacheRecordRow, CacheWarehouse, WarehouseConfig};
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let warehouse = CacheWarehouse::open(WarehouseConfig::default())?;
//!
//!     warehouse.upsert(&CacheRecordRow {
//!         key: "sentiment:9f2c".to_string(),
//!         payload: "{}".to_string(),
//!         created_at: "2024-01-01T00:00:00Z".to_string(),
//!         expires_at: "2024-01-01T01:00:00Z".to_string(),
//!     })?;
//!
//!     let row = warehouse.load("sentiment:9f2c")?;
//!     assert!(row.is_some());
//!     Ok(())
//! }
//! ```
//!
//! ## Tables
//!
//! | Table | Description |
//! |-------|-------------|
//! | `cache_records` | One row per cache key |
//! | `schema_migrations` | Applied migration versions |

pub mod duckdb;
pub mod migrations;

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use ::duckdb::ToSql;
use thiserror::Error;

pub use duckdb::{AccessMode, DuckDbConnectionManager, PooledConnection};

/// Errors that can occur during warehouse operations.
#[derive(Debug, Error)]
pub enum WarehouseError {
    /// `DuckDB` database error.
    #[error(transparent)]
    DuckDb(#[from] ::duckdb::Error),

    /// I/O error (file system operations).
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Configuration for the warehouse database.
#[derive(Debug, Clone)]
pub struct WarehouseConfig {
    /// Path to the `DuckDB` database file.
    pub db_path: PathBuf,
    /// Maximum number of idle connections kept per access mode.
    pub max_pool_size: usize,
}

impl Default for WarehouseConfig {
    fn default() -> Self {
        Self::in_home(resolve_lexis_home())
    }
}

impl WarehouseConfig {
    /// Place the database under `<home>/cache/results.duckdb`.
    pub fn in_home(home: impl AsRef<Path>) -> Self {
        Self {
            db_path: home.as_ref().join("cache").join("results.duckdb"),
            max_pool_size: 4,
        }
    }
}

/// A single durable cache record as stored on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheRecordRow {
    pub key: String,
    pub payload: String,
    pub created_at: String,
    pub expires_at: String,
}

/// Durable key/record store backed by `DuckDB`.
#[derive(Clone)]
pub struct CacheWarehouse {
    manager: DuckDbConnectionManager,
}

impl CacheWarehouse {
    /// Open a warehouse with default configuration.
    pub fn open_default() -> Result<Self, WarehouseError> {
        Self::open(WarehouseConfig::default())
    }

    /// Open (and migrate) a warehouse with the specified configuration.
    pub fn open(config: WarehouseConfig) -> Result<Self, WarehouseError> {
        if let Some(parent) = config.db_path.parent() {
            fs::create_dir_all(parent)?;
        }

        let manager = DuckDbConnectionManager::new(config.db_path, config.max_pool_size);
        let warehouse = Self { manager };
        warehouse.initialize()?;
        Ok(warehouse)
    }

    fn initialize(&self) -> Result<(), WarehouseError> {
        let connection = self.manager.acquire(AccessMode::ReadWrite)?;
        migrations::apply_migrations(&connection)?;
        Ok(())
    }

    /// Get the path to the database file.
    pub fn db_path(&self) -> &Path {
        self.manager.db_path()
    }

    /// Load the record stored under `key`, if any.
    pub fn load(&self, key: &str) -> Result<Option<CacheRecordRow>, WarehouseError> {
        let connection = self.manager.acquire(AccessMode::ReadOnly)?;
        let mut statement = connection.prepare(
            "SELECT key, payload, created_at, expires_at FROM cache_records WHERE key = ?",
        )?;
        let params: [&dyn ToSql; 1] = [&key];
        let mut rows = statement.query(params.as_slice())?;

        let Some(row) = rows.next()? else {
            return Ok(None);
        };

        Ok(Some(CacheRecordRow {
            key: row.get(0)?,
            payload: row.get(1)?,
            created_at: row.get(2)?,
            expires_at: row.get(3)?,
        }))
    }

    /// Insert or replace the record stored under `record.key`.
    pub fn upsert(&self, record: &CacheRecordRow) -> Result<(), WarehouseError> {
        let connection = self.manager.acquire(AccessMode::ReadWrite)?;
        let params: [&dyn ToSql; 4] = [
            &record.key,
            &record.payload,
            &record.created_at,
            &record.expires_at,
        ];
        connection.execute(
            "INSERT OR REPLACE INTO cache_records (key, payload, created_at, expires_at) \
             VALUES (?, ?, ?, ?)",
            params.as_slice(),
        )?;
        Ok(())
    }

    /// Delete one record. Returns whether a row was removed.
    pub fn delete(&self, key: &str) -> Result<bool, WarehouseError> {
        let connection = self.manager.acquire(AccessMode::ReadWrite)?;
        let params: [&dyn ToSql; 1] = [&key];
        let removed = connection.execute("DELETE FROM cache_records WHERE key = ?", params.as_slice())?;
        Ok(removed > 0)
    }

    /// Delete every record whose key starts with `prefix`.
    pub fn delete_prefix(&self, prefix: &str) -> Result<usize, WarehouseError> {
        let connection = self.manager.acquire(AccessMode::ReadWrite)?;
        let params: [&dyn ToSql; 1] = [&prefix];
        let removed = connection.execute(
            "DELETE FROM cache_records WHERE starts_with(key, ?)",
            params.as_slice(),
        )?;
        Ok(removed)
    }

    /// Delete all records.
    pub fn clear(&self) -> Result<usize, WarehouseError> {
        let connection = self.manager.acquire(AccessMode::ReadWrite)?;
        let removed = connection.execute("DELETE FROM cache_records", [] as [&dyn ToSql; 0])?;
        Ok(removed)
    }

    /// Number of stored records, expired ones included.
    pub fn count(&self) -> Result<usize, WarehouseError> {
        let connection = self.manager.acquire(AccessMode::ReadOnly)?;
        let count: i64 =
            connection.query_row("SELECT COUNT(*) FROM cache_records", [], |row| row.get(0))?;
        Ok(usize::try_from(count).unwrap_or_default())
    }
}

/// Resolve the lexis home directory (`LEXIS_HOME`, then `$HOME/.lexis`).
pub fn resolve_lexis_home() -> PathBuf {
    if let Some(path) = env::var_os("LEXIS_HOME") {
        let path = PathBuf::from(path);
        if !path.as_os_str().is_empty() {
            return path;
        }
    }

    if let Some(home) = env::var_os("HOME") {
        return PathBuf::from(home).join(".lexis");
    }

    PathBuf::from(".lexis")
}
