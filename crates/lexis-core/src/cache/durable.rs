use std::fmt::Debug;
use std::future::Future;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::pin::Pin;

use tokio::fs;

use super::{CacheEntry, CacheKey};
use crate::CacheError;

/// Boxed future returned by [`DurableTier`] methods.
pub type DurableFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, CacheError>> + Send + 'a>>;

/// Cross-restart storage behind the memory tier.
///
/// Implementations do no expiry handling of their own; the cache decides what
/// an expired record means.
pub trait DurableTier: Send + Sync + Debug {
    /// Short backend name for logs.
    fn name(&self) -> &'static str;

    /// `Ok(None)` when absent. A record that cannot be decoded is an error.
    fn load<'a>(&'a self, key: &'a CacheKey) -> DurableFuture<'a, Option<CacheEntry>>;

    fn store<'a>(&'a self, entry: &'a CacheEntry) -> DurableFuture<'a, ()>;

    /// Whether a record existed.
    fn remove<'a>(&'a self, key: &'a CacheKey) -> DurableFuture<'a, bool>;

    /// Remove every record whose key starts with `prefix`.
    fn remove_prefix<'a>(&'a self, prefix: &'a str) -> DurableFuture<'a, usize>;

    fn clear(&self) -> DurableFuture<'_, usize>;
}

/// One JSON document per key under a directory.
#[derive(Debug, Clone)]
pub struct FileTier {
    dir: PathBuf,
}

impl FileTier {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// `<home>/cache/results`.
    pub fn in_home(home: impl AsRef<Path>) -> Self {
        Self::new(home.as_ref().join("cache").join("results"))
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &CacheKey) -> PathBuf {
        self.dir.join(format!("{}.json", file_stem(key.as_str())))
    }

    async fn remove_matching(&self, prefix: Option<&str>) -> Result<usize, CacheError> {
        let mut entries = match fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(error) if error.kind() == ErrorKind::NotFound => return Ok(0),
            Err(error) => return Err(error.into()),
        };

        let stem_prefix = prefix.map(file_stem);
        let mut removed = 0;
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name();
            let Some(name) = name.to_str() else {
                continue;
            };
            if !name.ends_with(".json") {
                continue;
            }
            if stem_prefix
                .as_deref()
                .is_some_and(|prefix| !name.starts_with(prefix))
            {
                continue;
            }
            match fs::remove_file(entry.path()).await {
                Ok(()) => removed += 1,
                Err(error) if error.kind() == ErrorKind::NotFound => {}
                Err(error) => return Err(error.into()),
            }
        }
        Ok(removed)
    }
}

/// Keys carry a `:` separator, which is not portable in file names.
fn file_stem(key: &str) -> String {
    key.replace(':', "-")
}

impl DurableTier for FileTier {
    fn name(&self) -> &'static str {
        "file"
    }

    fn load<'a>(&'a self, key: &'a CacheKey) -> DurableFuture<'a, Option<CacheEntry>> {
        Box::pin(async move {
            let bytes = match fs::read(self.path_for(key)).await {
                Ok(bytes) => bytes,
                Err(error) if error.kind() == ErrorKind::NotFound => return Ok(None),
                Err(error) => return Err(error.into()),
            };
            let entry: CacheEntry = serde_json::from_slice(&bytes)?;
            if entry.key != *key {
                return Err(CacheError::Corrupt(format!(
                    "record under '{key}' claims key '{}'",
                    entry.key
                )));
            }
            Ok(Some(entry))
        })
    }

    fn store<'a>(&'a self, entry: &'a CacheEntry) -> DurableFuture<'a, ()> {
        Box::pin(async move {
            fs::create_dir_all(&self.dir).await?;
            let payload = serde_json::to_vec(entry)?;
            let target = self.path_for(&entry.key);
            let staging = self
                .dir
                .join(format!(".{}.{}.tmp", file_stem(entry.key.as_str()), uuid::Uuid::new_v4()));

            fs::write(&staging, payload).await?;
            if let Err(error) = fs::rename(&staging, &target).await {
                let _ = fs::remove_file(&staging).await;
                return Err(error.into());
            }
            Ok(())
        })
    }

    fn remove<'a>(&'a self, key: &'a CacheKey) -> DurableFuture<'a, bool> {
        Box::pin(async move {
            match fs::remove_file(self.path_for(key)).await {
                Ok(()) => Ok(true),
                Err(error) if error.kind() == ErrorKind::NotFound => Ok(false),
                Err(error) => Err(error.into()),
            }
        })
    }

    fn remove_prefix<'a>(&'a self, prefix: &'a str) -> DurableFuture<'a, usize> {
        Box::pin(self.remove_matching(Some(prefix)))
    }

    fn clear(&self) -> DurableFuture<'_, usize> {
        Box::pin(self.remove_matching(None))
    }
}
