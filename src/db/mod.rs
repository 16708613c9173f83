/// Database layer for the moderation ledger
///
/// Manages connection pools, embedded migrations and the timestamp encoding
/// shared by every table.

use crate::error::{LedgerError, LedgerResult};
use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use sqlx::{Sqlite, Transaction};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

/// Database connection options
#[derive(Debug, Clone)]
pub struct DatabaseOptions {
    pub max_connections: u32,
    pub enable_wal: bool,
    pub busy_timeout: Duration,
}

impl Default for DatabaseOptions {
    fn default() -> Self {
        Self {
            max_connections: 10,
            enable_wal: true,
            busy_timeout: Duration::from_secs(5),
        }
    }
}

/// Create a file-backed SQLite connection pool
pub async fn create_pool(path: &Path, options: DatabaseOptions) -> LedgerResult<SqlitePool> {
    // Ensure parent directory exists
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            tokio::fs::create_dir_all(parent).await?;
        }
    }

    let connect_options = SqliteConnectOptions::new()
        .filename(path)
        .create_if_missing(true)
        .journal_mode(if options.enable_wal {
            SqliteJournalMode::Wal
        } else {
            SqliteJournalMode::Delete
        })
        .foreign_keys(true)
        .busy_timeout(options.busy_timeout);

    let pool = SqlitePoolOptions::new()
        .max_connections(options.max_connections)
        .connect_with(connect_options)
        .await?;

    tracing::info!("Opened ledger database at {}", path.display());

    Ok(pool)
}

/// Create a private in-memory database on a single pinned connection.
///
/// Every SQLite `:memory:` connection is its own database, so the pool never
/// grows past one connection and never recycles it.
pub async fn create_memory_pool() -> LedgerResult<SqlitePool> {
    let connect_options = SqliteConnectOptions::from_str("sqlite::memory:")?.foreign_keys(true);

    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .min_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect_with(connect_options)
        .await?;

    Ok(pool)
}

/// Run migrations for a database
/// Migrations are embedded at compile time from ./migrations directory
pub async fn run_migrations(pool: &SqlitePool) -> LedgerResult<()> {
    sqlx::migrate!("./migrations")
        .run(pool)
        .await
        .map_err(|e| LedgerError::Internal(format!("Migration failed: {}", e)))?;

    Ok(())
}

/// Test database connection
pub async fn test_connection(pool: &SqlitePool) -> LedgerResult<()> {
    sqlx::query("SELECT 1").execute(pool).await?;

    Ok(())
}

/// Begin a transaction that takes the write lock up front.
///
/// A deferred transaction that reads first cannot upgrade to a writer once
/// another connection has committed, and SQLite reports that as busy without
/// waiting. `BEGIN IMMEDIATE` queues on `busy_timeout` instead.
pub async fn begin_write(pool: &SqlitePool) -> LedgerResult<Transaction<'static, Sqlite>> {
    Ok(pool.begin_with("BEGIN IMMEDIATE").await?)
}

/// Encode a timestamp as fixed-width RFC 3339 (nanoseconds, `Z` suffix) so
/// that text comparison in SQL orders chronologically.
pub(crate) fn encode_ts(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

pub(crate) fn decode_ts(s: &str) -> LedgerResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| LedgerError::Internal(format!("Invalid timestamp '{}': {}", s, e)))
}

pub(crate) fn decode_opt_ts(s: Option<String>) -> LedgerResult<Option<DateTime<Utc>>> {
    s.as_deref().map(decode_ts).transpose()
}

#[cfg(test)]
pub(crate) async fn test_pool() -> SqlitePool {
    let pool = create_memory_pool().await.unwrap();
    run_migrations(&pool).await.unwrap();
    pool
}
