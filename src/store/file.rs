//! Filesystem backing store.
//!
//! Persists each key as `<root>/<sha256(key)>.json`. The file holds a small
//! envelope with the full key and a last-modified timestamp, so a hash
//! collision reads as a miss instead of a wrong value.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::de::{DeserializeOwned, IgnoredAny};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tokio::fs;
use tracing::debug;

use crate::config::CacheConfig;
use crate::error::Result;
use crate::store::BackingStore;

/// Suffix counter so concurrent writers never share a temp file.
static TEMP_SEQ: AtomicU64 = AtomicU64::new(0);

#[derive(Serialize)]
struct RecordRef<'a, V> {
    key: &'a str,
    last_modified: DateTime<Utc>,
    value: &'a V,
}

#[derive(Deserialize)]
struct Record<V> {
    key: String,
    last_modified: DateTime<Utc>,
    value: V,
}

// == File Store ==
/// Directory of JSON files, one per key.
#[derive(Debug, Clone)]
pub struct FileStore {
    root: PathBuf,
}

impl FileStore {
    // == Open ==
    /// Opens a store rooted at `root`, creating the directory if needed.
    pub async fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root).await?;
        Ok(Self { root })
    }

    /// Opens the store at [`CacheConfig::store_dir`].
    pub async fn from_config(config: &CacheConfig) -> Result<Self> {
        Self::open(config.store_dir.clone()).await
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path of the file holding `key`.
    pub fn path_for(&self, key: &str) -> PathBuf {
        let digest = Sha256::digest(key.as_bytes());
        self.root.join(format!("{}.json", hex::encode(digest)))
    }

    // == Last Modified ==
    /// Timestamp of the last write of `key`, without decoding its value.
    pub async fn last_modified(&self, key: &str) -> Result<Option<DateTime<Utc>>> {
        Ok(self
            .load::<IgnoredAny>(key)
            .await?
            .map(|record| record.last_modified))
    }

    // == Remove ==
    /// Deletes the file for `key`. Returns whether one existed.
    pub async fn remove(&self, key: &str) -> Result<bool> {
        match fs::remove_file(self.path_for(key)).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    async fn load<V: DeserializeOwned>(&self, key: &str) -> Result<Option<Record<V>>> {
        let path = self.path_for(key);
        let bytes = match fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let record: Record<V> = serde_json::from_slice(&bytes)?;
        if record.key != key {
            debug!(key, stored = %record.key, "file store digest collision");
            return Ok(None);
        }
        Ok(Some(record))
    }
}

#[async_trait]
impl<V> BackingStore<V> for FileStore
where
    V: Serialize + DeserializeOwned + Send + Sync + 'static,
{
    type Error = crate::error::StoreError;

    async fn read(&self, key: &str) -> Result<Option<V>> {
        Ok(self.load::<V>(key).await?.map(|record| record.value))
    }

    async fn write(&self, key: &str, value: &V) -> Result<()> {
        let bytes = serde_json::to_vec(&RecordRef {
            key,
            last_modified: Utc::now(),
            value,
        })?;

        let path = self.path_for(key);
        let seq = TEMP_SEQ.fetch_add(1, Ordering::Relaxed);
        let tmp = path.with_extension(format!("tmp-{}-{seq}", std::process::id()));

        let written = match fs::write(&tmp, &bytes).await {
            Ok(()) => fs::rename(&tmp, &path).await,
            Err(e) => Err(e),
        };
        if let Err(e) = written {
            // A failed write can leave a partial temp file behind
            let _ = fs::remove_file(&tmp).await;
            return Err(e.into());
        }
        debug!(key, bytes = bytes.len(), "file store write");
        Ok(())
    }
}
