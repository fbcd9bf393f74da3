//! The cache contract and its composition from a key resolver and a storage
//! backend.
//!
//! # Data Flow
//! ```text
//! CacheRequest
//!     → KeyResolver::resolve   (fingerprint, snapshot time, insert flag)
//!     → Storage::key           (storage key for that fingerprint/time)
//!     → LookupContext          (immutable, threaded into lookup/store)
//!     → Storage::load | Storage::store + KeyResolver::commit
//! ```

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;

use super::error::{CacheError, VersionNotFound};
use super::fingerprint::Fingerprint;
use super::response::CachedResponse;

/// Request-scoped version directives for time-aware caches.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WaybackDirectives {
    /// Requested capture time (seconds since epoch).
    pub timestamp: Option<i64>,
    /// How far before the target (or now) a match may be, in seconds.
    pub within: Option<i64>,
}

/// The identity of a request as far as caching is concerned.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheRequest {
    pub method: String,
    pub url: String,
    pub body: Option<Bytes>,
    pub directives: WaybackDirectives,
}

impl CacheRequest {
    pub fn new(method: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            url: url.into(),
            body: None,
            directives: WaybackDirectives::default(),
        }
    }

    pub fn with_body(mut self, body: Option<Bytes>) -> Self {
        self.body = body;
        self
    }

    pub fn with_directives(mut self, directives: WaybackDirectives) -> Self {
        self.directives = directives;
        self
    }

    pub fn fingerprint(&self) -> Fingerprint {
        Fingerprint::compute(&self.method, &self.url, self.body.as_deref())
    }
}

/// Outcome of key resolution, before a storage key is attached.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    /// Snapshot time, for time-aware resolvers.
    pub timestamp: Option<i64>,
    /// The caller must fetch live and then insert a new snapshot.
    pub insert: bool,
    /// Raised by lookup if the resolved snapshot turns out to be missing.
    pub on_missing: Option<VersionNotFound>,
}

impl Resolution {
    pub fn existing(timestamp: Option<i64>) -> Self {
        Self {
            timestamp,
            insert: false,
            on_missing: None,
        }
    }

    pub fn new_snapshot(timestamp: Option<i64>) -> Self {
        Self {
            timestamp,
            insert: true,
            on_missing: None,
        }
    }
}

/// Per-request resolution state, threaded from resolve into lookup/store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LookupContext {
    pub fingerprint: Fingerprint,
    /// Storage key; also exposed as the cache-key provenance header.
    pub key: String,
    pub timestamp: Option<i64>,
    pub insert: bool,
    pub on_missing: Option<VersionNotFound>,
}

/// Maps a request to a fingerprint and snapshot time.
#[async_trait]
pub trait KeyResolver: Send + Sync + 'static {
    async fn resolve(&self, request: &CacheRequest, fingerprint: &Fingerprint) -> Result<Resolution, CacheError>;

    /// Resolution for an unconditional insert, bypassing lookup.
    fn forced(&self, timestamp: Option<i64>) -> Resolution;

    /// Make a newly stored snapshot discoverable.
    async fn commit(&self, _fingerprint: &Fingerprint, _timestamp: Option<i64>) -> Result<(), CacheError> {
        Ok(())
    }

    /// Known snapshot times for a fingerprint, oldest first.
    async fn versions(&self, _fingerprint: &Fingerprint) -> Result<Vec<i64>, CacheError> {
        Ok(Vec::new())
    }
}

/// Where responses live.
#[async_trait]
pub trait Storage: Send + Sync + 'static {
    fn key(&self, fingerprint: &Fingerprint, timestamp: Option<i64>) -> String;

    async fn contains(&self, key: &str) -> Result<bool, CacheError>;

    /// `Ok(None)` is an ordinary miss.
    async fn load(&self, key: &str) -> Result<Option<CachedResponse>, CacheError>;

    async fn store(&self, key: &str, response: &CachedResponse) -> Result<(), CacheError>;
}

/// The contract every cache backend offers to the proxy.
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Resolve a request into a lookup context.
    async fn resolve(&self, request: &CacheRequest) -> Result<LookupContext, CacheError>;

    /// Context for inserting a new snapshot at `timestamp` (or now).
    fn resolve_for_insert(&self, request: &CacheRequest, timestamp: Option<i64>) -> LookupContext;

    /// Read the entry a context points at.
    async fn lookup(&self, context: &LookupContext) -> Result<Option<CachedResponse>, CacheError>;

    /// Persist a response under a context.
    async fn store(&self, context: &LookupContext, response: CachedResponse) -> Result<(), CacheError>;

    /// Snapshot times known for a request (empty for untimed caches).
    async fn versions(&self, request: &CacheRequest) -> Result<Vec<i64>, CacheError>;

    /// Whether a request would be served from the cache, without reading
    /// the entry.
    async fn contains(&self, request: &CacheRequest) -> Result<bool, CacheError>;

    async fn get(&self, request: &CacheRequest) -> Result<Option<CachedResponse>, CacheError> {
        let context = self.resolve(request).await?;
        self.lookup(&context).await
    }

    async fn put(&self, request: &CacheRequest, response: CachedResponse) -> Result<(), CacheError> {
        let context = self.resolve(request).await?;
        self.store(&context, response).await
    }
}

/// A cache assembled from a resolution strategy and a storage backend.
pub struct ProxyCache<R, S> {
    resolver: R,
    storage: S,
}

impl<R: KeyResolver, S: Storage> ProxyCache<R, S> {
    pub fn from_parts(resolver: R, storage: S) -> Self {
        Self { resolver, storage }
    }

    pub fn into_shared(self) -> Arc<dyn CacheStore> {
        Arc::new(self)
    }

    pub fn storage(&self) -> &S {
        &self.storage
    }

    fn context(&self, fingerprint: Fingerprint, resolution: Resolution) -> LookupContext {
        LookupContext {
            key: self.storage.key(&fingerprint, resolution.timestamp),
            fingerprint,
            timestamp: resolution.timestamp,
            insert: resolution.insert,
            on_missing: resolution.on_missing,
        }
    }
}

#[async_trait]
impl<R: KeyResolver, S: Storage> CacheStore for ProxyCache<R, S> {
    async fn resolve(&self, request: &CacheRequest) -> Result<LookupContext, CacheError> {
        let fingerprint = request.fingerprint();
        let resolution = self.resolver.resolve(request, &fingerprint).await?;
        Ok(self.context(fingerprint, resolution))
    }

    fn resolve_for_insert(&self, request: &CacheRequest, timestamp: Option<i64>) -> LookupContext {
        self.context(request.fingerprint(), self.resolver.forced(timestamp))
    }

    async fn lookup(&self, context: &LookupContext) -> Result<Option<CachedResponse>, CacheError> {
        if context.insert {
            return Ok(None);
        }
        match self.storage.load(&context.key).await? {
            Some(mut response) => {
                tracing::info!(key = %context.key, "Returning request from cache");
                response.set_provenance(&context.key, context.timestamp);
                Ok(Some(response))
            }
            None => match &context.on_missing {
                Some(not_found) => Err(CacheError::VersionNotFound(not_found.clone())),
                None => Ok(None),
            },
        }
    }

    async fn store(&self, context: &LookupContext, mut response: CachedResponse) -> Result<(), CacheError> {
        tracing::info!(key = %context.key, insert = context.insert, "Putting request into cache");
        response.strip_provenance();
        self.storage.store(&context.key, &response).await?;
        if context.insert {
            self.resolver.commit(&context.fingerprint, context.timestamp).await?;
        }
        Ok(())
    }

    async fn versions(&self, request: &CacheRequest) -> Result<Vec<i64>, CacheError> {
        self.resolver.versions(&request.fingerprint()).await
    }

    async fn contains(&self, request: &CacheRequest) -> Result<bool, CacheError> {
        let context = match self.resolve(request).await {
            Ok(context) => context,
            Err(CacheError::VersionNotFound(_)) => return Ok(false),
            Err(e) => return Err(e),
        };
        if context.insert {
            return Ok(false);
        }
        self.storage.contains(&context.key).await
    }
}
