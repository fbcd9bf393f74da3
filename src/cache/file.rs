//! Sharded, compressed snapshot files on disk.
//!
//! A fingerprint `abcd…` is stored at `<root>/ab/cd/abcd….gz` (or
//! `abcd…-<timestamp>.gz` for timed snapshots). Writes are staged in a
//! sibling temporary file and published with an atomic rename, so readers
//! never observe a partial record.

use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use async_trait::async_trait;

use super::error::CacheError;
use super::fingerprint::Fingerprint;
use super::record;
use super::response::CachedResponse;
use super::store::Storage;

/// File-backed storage rooted at a cache folder.
#[derive(Debug, Clone)]
pub struct FileStorage {
    root: PathBuf,
}

impl FileStorage {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Absolute path for a storage key.
    pub fn path_for(&self, key: &str) -> PathBuf {
        key.split('/').fold(self.root.clone(), |path, part| path.join(part))
    }
}

#[async_trait]
impl Storage for FileStorage {
    fn key(&self, fingerprint: &Fingerprint, timestamp: Option<i64>) -> String {
        let (first, second) = fingerprint.shard();
        match timestamp {
            Some(ts) => format!("{}/{}/{}-{}.gz", first, second, fingerprint, ts),
            None => format!("{}/{}/{}.gz", first, second, fingerprint),
        }
    }

    async fn contains(&self, key: &str) -> Result<bool, CacheError> {
        Ok(tokio::fs::try_exists(self.path_for(key)).await?)
    }

    async fn load(&self, key: &str) -> Result<Option<CachedResponse>, CacheError> {
        let path = self.path_for(key);
        tokio::task::spawn_blocking(move || match fs::read(&path) {
            Ok(bytes) => record::decode(&bytes).map(Some),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(CacheError::Io(e)),
        })
        .await?
    }

    async fn store(&self, key: &str, response: &CachedResponse) -> Result<(), CacheError> {
        let path = self.path_for(key);
        let response = response.clone();
        tokio::task::spawn_blocking(move || {
            let bytes = record::encode(&response)?;
            write_atomic(&path, &bytes)
        })
        .await?
    }
}

/// Write `bytes` to a temporary sibling of `path`, then rename into place.
fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), CacheError> {
    let dir = path
        .parent()
        .ok_or_else(|| CacheError::Record(format!("no parent directory for {}", path.display())))?;
    fs::create_dir_all(dir)?;

    let file_name = path.file_name().and_then(|n| n.to_str()).unwrap_or("record");
    let staged = dir.join(format!(".{}.{}.tmp", file_name, uuid::Uuid::new_v4()));

    let result = (|| -> std::io::Result<()> {
        let mut file = fs::File::create(&staged)?;
        file.write_all(bytes)?;
        file.sync_all()?;
        fs::rename(&staged, path)
    })();

    if let Err(e) = result {
        tracing::error!(path = %path.display(), error = %e, "Exception while trying to write cache file");
        let _ = fs::remove_file(&staged);
        return Err(CacheError::Io(e));
    }
    Ok(())
}
