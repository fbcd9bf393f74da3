//! Key resolution strategies.
//!
//! [`FingerprintResolver`] maps a request straight to its fingerprint.
//! [`WaybackResolver`] consults the time index to pick a snapshot:
//!
//! | target | within  | selects                          | on miss            |
//! |--------|---------|----------------------------------|--------------------|
//! | T      | 0       | timestamp == T                   | version not found  |
//! | T      | W > 0   | latest in (T - W, T]             | version not found  |
//! | T      | absent  | latest <= T                      | version not found  |
//! | absent | 0       | timestamp == now                 | new snapshot (now) |
//! | absent | W / D   | latest in (now - W, now]         | new snapshot (now) |

use async_trait::async_trait;

use super::error::{CacheError, VersionNotFound};
use super::fingerprint::Fingerprint;
use super::index::{IndexQuery, TimeIndex};
use super::store::{CacheRequest, KeyResolver, Resolution};
use super::unix_now;

/// Plain content addressing: one entry per fingerprint.
#[derive(Debug, Clone, Copy, Default)]
pub struct FingerprintResolver;

#[async_trait]
impl KeyResolver for FingerprintResolver {
    async fn resolve(&self, _request: &CacheRequest, _fingerprint: &Fingerprint) -> Result<Resolution, CacheError> {
        Ok(Resolution::existing(None))
    }

    fn forced(&self, _timestamp: Option<i64>) -> Resolution {
        Resolution::new_snapshot(None)
    }
}

/// Time-aware resolution backed by a [`TimeIndex`].
#[derive(Debug, Clone)]
pub struct WaybackResolver {
    index: TimeIndex,
    default_within: i64,
}

impl WaybackResolver {
    pub fn new(index: TimeIndex, default_within: i64) -> Self {
        Self { index, default_within }
    }

    /// Resolve against an explicit clock reading.
    pub async fn resolve_at(
        &self,
        request: &CacheRequest,
        fingerprint: &Fingerprint,
        now: i64,
    ) -> Result<Resolution, CacheError> {
        let directives = request.directives;
        let query = match (directives.timestamp, directives.within) {
            (Some(target), Some(0)) => IndexQuery::Exact(target),
            (Some(target), Some(within)) => IndexQuery::Window {
                after: target.saturating_sub(within),
                until: target,
            },
            (Some(target), None) => IndexQuery::AtOrBefore(target),
            (None, Some(0)) => IndexQuery::Exact(now),
            (None, within) => IndexQuery::Window {
                after: now.saturating_sub(within.unwrap_or(self.default_within)),
                until: now,
            },
        };

        let pinned = directives.timestamp.map(|target| VersionNotFound {
            url: request.url.clone(),
            timestamp: target,
            within: directives.within,
        });

        match self.index.latest(fingerprint, query).await? {
            Some(timestamp) => {
                tracing::debug!(fingerprint = %fingerprint, timestamp, ?query, "Wayback snapshot found");
                Ok(Resolution {
                    timestamp: Some(timestamp),
                    insert: false,
                    on_missing: pinned,
                })
            }
            None => match pinned {
                Some(not_found) => {
                    tracing::info!(url = %not_found.url, timestamp = not_found.timestamp, within = ?not_found.within, "Wayback version not found");
                    Err(CacheError::VersionNotFound(not_found))
                }
                None => Ok(Resolution::new_snapshot(Some(now))),
            },
        }
    }
}

#[async_trait]
impl KeyResolver for WaybackResolver {
    async fn resolve(&self, request: &CacheRequest, fingerprint: &Fingerprint) -> Result<Resolution, CacheError> {
        self.resolve_at(request, fingerprint, unix_now()).await
    }

    fn forced(&self, timestamp: Option<i64>) -> Resolution {
        Resolution::new_snapshot(Some(timestamp.unwrap_or_else(unix_now)))
    }

    async fn commit(&self, fingerprint: &Fingerprint, timestamp: Option<i64>) -> Result<(), CacheError> {
        let timestamp = timestamp.unwrap_or_else(unix_now);
        if self.index.record(fingerprint, timestamp).await? {
            tracing::info!(fingerprint = %fingerprint, timestamp, "Inserted snapshot into index");
        }
        Ok(())
    }

    async fn versions(&self, fingerprint: &Fingerprint) -> Result<Vec<i64>, CacheError> {
        self.index.timestamps(fingerprint).await
    }
}
