//! Response caching subsystem.
//!
//! # Data Flow
//! ```text
//! RequestDispatcher
//!     → store.rs (CacheStore: resolve → lookup | store)
//!     → resolver.rs (FingerprintResolver | WaybackResolver + index.rs)
//!     → memory.rs | file.rs (+ record.rs codec)
//! ```
//!
//! # Design Decisions
//! - Resolution and storage vary independently; a backend is a pairing of both
//! - Resolution state lives in an explicit `LookupContext`, never on the request
//! - Snapshot files are published atomically; index rows are append-only
//! - No eviction or TTL; size management is left to the operator

pub mod error;
pub mod file;
pub mod fingerprint;
pub mod index;
pub mod memory;
pub mod record;
pub mod resolver;
pub mod response;
pub mod store;

use std::path::Path;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

pub use error::{CacheError, VersionNotFound};
pub use file::FileStorage;
pub use fingerprint::Fingerprint;
pub use index::{IndexQuery, TimeIndex};
pub use memory::MemoryStorage;
pub use resolver::{FingerprintResolver, WaybackResolver};
pub use response::{CachedResponse, CACHE_KEY_HEADER, SNAPSHOT_TIMESTAMP_HEADER};
pub use store::{CacheRequest, CacheStore, LookupContext, ProxyCache, WaybackDirectives};

use crate::config::{CacheConfig, CacheKind};

/// Mapping-backed cache for the lifetime of the process.
pub type InMemoryCache = ProxyCache<FingerprintResolver, MemoryStorage>;

/// One compressed snapshot per fingerprint on disk.
pub type SnapshotFileCache = ProxyCache<FingerprintResolver, FileStorage>;

/// Timestamped snapshots on disk plus a time index.
pub type WaybackCache = ProxyCache<WaybackResolver, FileStorage>;

impl InMemoryCache {
    pub fn in_memory() -> Self {
        ProxyCache::from_parts(FingerprintResolver, MemoryStorage::new())
    }
}

impl SnapshotFileCache {
    pub fn snapshot_files(root: impl AsRef<Path>) -> Self {
        ProxyCache::from_parts(FingerprintResolver, FileStorage::new(root.as_ref()))
    }
}

impl WaybackCache {
    /// Open a wayback cache rooted at `root`, with the index at `root/index_file`.
    pub async fn open(root: impl AsRef<Path>, index_file: &str, default_within: i64) -> Result<Self, CacheError> {
        let root = root.as_ref();
        tokio::fs::create_dir_all(root).await?;
        let index = TimeIndex::open(root.join(index_file)).await?;
        Ok(ProxyCache::from_parts(
            WaybackResolver::new(index, default_within),
            FileStorage::new(root),
        ))
    }
}

/// Build the configured cache, if any.
pub async fn build(config: &CacheConfig) -> Result<Option<Arc<dyn CacheStore>>, CacheError> {
    let cache = match config.kind {
        CacheKind::None => return Ok(None),
        CacheKind::Simple => InMemoryCache::in_memory().into_shared(),
        CacheKind::File => SnapshotFileCache::snapshot_files(&config.root).into_shared(),
        CacheKind::Wayback => {
            WaybackCache::open(&config.root, &config.index_file, config.default_within_secs)
                .await?
                .into_shared()
        }
    };
    tracing::info!(kind = ?config.kind, root = %config.root, "Cache initialized");
    Ok(Some(cache))
}

/// Current time in whole seconds since the epoch.
pub(crate) fn unix_now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs() as i64
}
