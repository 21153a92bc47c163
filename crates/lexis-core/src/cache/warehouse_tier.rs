use std::fmt::{Debug, Formatter};
use std::path::Path;

use lexis_warehouse::{CacheRecordRow, CacheWarehouse, WarehouseConfig, WarehouseError};
use time::format_description::well_known::Rfc3339;

use super::durable::{DurableFuture, DurableTier};
use super::{CacheEntry, CacheKey};
use crate::CacheError;

/// Durable tier stored in the `cache_records` table of a DuckDB warehouse.
///
/// DuckDB calls block, so each one runs on the blocking thread pool.
#[derive(Clone)]
pub struct WarehouseTier {
    warehouse: CacheWarehouse,
}

impl WarehouseTier {
    pub fn new(warehouse: CacheWarehouse) -> Self {
        Self { warehouse }
    }

    pub fn open(config: WarehouseConfig) -> Result<Self, WarehouseError> {
        CacheWarehouse::open(config).map(Self::new)
    }

    pub fn in_home(home: impl AsRef<Path>) -> Result<Self, WarehouseError> {
        Self::open(WarehouseConfig::in_home(home))
    }

    async fn blocking<T, F>(&self, task: F) -> Result<T, CacheError>
    where
        T: Send + 'static,
        F: FnOnce(&CacheWarehouse) -> Result<T, WarehouseError> + Send + 'static,
    {
        let warehouse = self.warehouse.clone();
        tokio::task::spawn_blocking(move || task(&warehouse))
            .await
            .map_err(|error| CacheError::Backend(format!("warehouse task failed: {error}")))?
            .map_err(|error| CacheError::Backend(error.to_string()))
    }
}

impl Debug for WarehouseTier {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WarehouseTier")
            .field("db_path", &self.warehouse.db_path())
            .finish()
    }
}

impl DurableTier for WarehouseTier {
    fn name(&self) -> &'static str {
        "duckdb"
    }

    fn load<'a>(&'a self, key: &'a CacheKey) -> DurableFuture<'a, Option<CacheEntry>> {
        Box::pin(async move {
            let lookup = key.as_str().to_owned();
            let Some(row) = self.blocking(move |warehouse| warehouse.load(&lookup)).await? else {
                return Ok(None);
            };
            let entry: CacheEntry = serde_json::from_str(&row.payload)?;
            if entry.key != *key {
                return Err(CacheError::Corrupt(format!(
                    "row '{key}' holds a record for '{}'",
                    entry.key
                )));
            }
            Ok(Some(entry))
        })
    }

    fn store<'a>(&'a self, entry: &'a CacheEntry) -> DurableFuture<'a, ()> {
        Box::pin(async move {
            let row = CacheRecordRow {
                key: entry.key.as_str().to_owned(),
                payload: serde_json::to_string(entry)?,
                created_at: rfc3339(entry.created_at)?,
                expires_at: rfc3339(entry.expires_at)?,
            };
            self.blocking(move |warehouse| warehouse.upsert(&row)).await
        })
    }

    fn remove<'a>(&'a self, key: &'a CacheKey) -> DurableFuture<'a, bool> {
        Box::pin(async move {
            let key = key.as_str().to_owned();
            self.blocking(move |warehouse| warehouse.delete(&key)).await
        })
    }

    fn remove_prefix<'a>(&'a self, prefix: &'a str) -> DurableFuture<'a, usize> {
        Box::pin(async move {
            let prefix = prefix.to_owned();
            self.blocking(move |warehouse| warehouse.delete_prefix(&prefix))
                .await
        })
    }

    fn clear(&self) -> DurableFuture<'_, usize> {
        Box::pin(self.blocking(CacheWarehouse::clear))
    }
}

fn rfc3339(value: time::OffsetDateTime) -> Result<String, CacheError> {
    value
        .format(&Rfc3339)
        .map_err(|error| CacheError::Backend(format!("timestamp formatting failed: {error}")))
}
