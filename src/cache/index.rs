//! Persistent time index: fingerprint → capture timestamps.
//!
//! Backed by SQLite through tokio-rusqlite. Every call runs on the
//! connection's single background thread, so index mutations are serialized
//! per cache instance and never block the scheduler.

use std::path::Path;

use tokio_rusqlite::rusqlite::OptionalExtension;
use tokio_rusqlite::{params, Connection};

use super::error::CacheError;
use super::fingerprint::Fingerprint;

const SCHEMA: &str = "CREATE TABLE IF NOT EXISTS idx (key TEXT NOT NULL, timestamp INTEGER NOT NULL);
     CREATE UNIQUE INDEX IF NOT EXISTS key_timestamp ON idx (key, timestamp);";

/// Which stored timestamp a lookup should select.
///
/// Ranges are `(after, until]`: the upper bound is inclusive and the window
/// start is exclusive. The most recent matching timestamp wins.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexQuery {
    /// Timestamp equal to the given value.
    Exact(i64),
    /// Latest timestamp `<=` the given value.
    AtOrBefore(i64),
    /// Latest timestamp in `(after, until]`.
    Window { after: i64, until: i64 },
}

/// Handle to the time index database.
#[derive(Clone, Debug)]
pub struct TimeIndex {
    conn: Connection,
}

impl TimeIndex {
    /// Open (creating if needed) the index file.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, CacheError> {
        let conn = Connection::open(path.as_ref().to_path_buf())
            .await
            .map_err(|e| CacheError::Index(e.into()))?;
        Self::init(conn).await
    }

    /// Open a throwaway in-memory index.
    pub async fn open_in_memory() -> Result<Self, CacheError> {
        let conn = Connection::open_in_memory()
            .await
            .map_err(|e| CacheError::Index(e.into()))?;
        Self::init(conn).await
    }

    async fn init(conn: Connection) -> Result<Self, CacheError> {
        conn.call(|conn| {
            conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")?;
            conn.execute_batch(SCHEMA)
        })
        .await?;
        Ok(Self { conn })
    }

    /// Most recent timestamp for `fingerprint` satisfying `query`.
    pub async fn latest(&self, fingerprint: &Fingerprint, query: IndexQuery) -> Result<Option<i64>, CacheError> {
        let key = fingerprint.as_str().to_string();
        let found = self
            .conn
            .call(move |conn| {
                let (sql, a, b) = match query {
                    IndexQuery::Exact(ts) => ("timestamp = ?2", ts, None),
                    IndexQuery::AtOrBefore(ts) => ("timestamp <= ?2", ts, None),
                    IndexQuery::Window { after, until } => {
                        ("timestamp > ?2 AND timestamp <= ?3", after, Some(until))
                    }
                };
                let sql = format!(
                    "SELECT timestamp FROM idx WHERE key = ?1 AND {} ORDER BY timestamp DESC LIMIT 1",
                    sql
                );
                let mut stmt = conn.prepare(&sql)?;
                match b {
                    Some(b) => stmt.query_row(params![key, a, b], |row| row.get::<_, i64>(0)).optional(),
                    None => stmt.query_row(params![key, a], |row| row.get::<_, i64>(0)).optional(),
                }
            })
            .await?;
        Ok(found)
    }

    /// Append an entry. Returns false when the entry was already present.
    pub async fn record(&self, fingerprint: &Fingerprint, timestamp: i64) -> Result<bool, CacheError> {
        let key = fingerprint.as_str().to_string();
        let changed = self
            .conn
            .call(move |conn| {
                conn.execute(
                    "INSERT OR IGNORE INTO idx (key, timestamp) VALUES (?1, ?2)",
                    params![key, timestamp],
                )
            })
            .await?;
        Ok(changed > 0)
    }

    /// All timestamps recorded for a fingerprint, oldest first.
    pub async fn timestamps(&self, fingerprint: &Fingerprint) -> Result<Vec<i64>, CacheError> {
        let key = fingerprint.as_str().to_string();
        let rows = self
            .conn
            .call(move |conn| {
                let mut stmt = conn.prepare("SELECT timestamp FROM idx WHERE key = ?1 ORDER BY timestamp ASC")?;
                let rows = stmt.query_map(params![key], |row| row.get::<_, i64>(0))?;
                rows.collect::<Result<Vec<_>, _>>()
            })
            .await?;
        Ok(rows)
    }
}
