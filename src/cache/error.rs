//! Cache error types.

use std::fmt;

/// A wayback query with explicit version constraints matched no snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionNotFound {
    pub url: String,
    pub timestamp: i64,
    pub within: Option<i64>,
}

impl fmt::Display for VersionNotFound {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Could not find \"{}\" in cache before {}", self.url, self.timestamp)?;
        match self.within {
            Some(within) => write!(f, " within {}", within),
            None => write!(f, " within any window"),
        }
    }
}

/// Errors raised by cache resolution and storage.
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    /// Explicit version request with no matching snapshot.
    #[error("{0}")]
    VersionNotFound(VersionNotFound),

    /// Filesystem failure reading or writing a snapshot record.
    #[error("cache I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A stored record could not be decoded.
    #[error("malformed snapshot record: {0}")]
    Record(String),

    /// Time index query or write failed.
    #[error("time index error: {0}")]
    Index(tokio_rusqlite::Error),

    /// A blocking storage task panicked or was cancelled.
    #[error("cache task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

impl From<tokio_rusqlite::Error> for CacheError {
    fn from(err: tokio_rusqlite::Error) -> Self {
        CacheError::Index(err)
    }
}

impl From<tokio_rusqlite::rusqlite::Error> for CacheError {
    fn from(err: tokio_rusqlite::rusqlite::Error) -> Self {
        CacheError::Index(tokio_rusqlite::Error::Error(err))
    }
}
