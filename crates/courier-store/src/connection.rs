//! Connection pooling.

use std::path::Path;
use std::time::Duration;

use r2d2_sqlite::SqliteConnectionManager;

use crate::errors::Result;

/// Pool of `SQLite` connections.
pub type ConnectionPool = r2d2::Pool<SqliteConnectionManager>;

/// One pooled connection, checked out for the duration of an operation.
pub type PooledConnection = r2d2::PooledConnection<SqliteConnectionManager>;

/// Pragmas applied to every pooled connection.
///
/// WAL keeps readers and the single writer from blocking each other;
/// `busy_timeout` bounds lock waits before the caller's retry loop kicks in.
const CONNECTION_PRAGMAS: &str = "
    PRAGMA journal_mode = WAL;
    PRAGMA synchronous = NORMAL;
    PRAGMA foreign_keys = ON;
    PRAGMA busy_timeout = 5000;
";

/// Open a pool against a database file, creating it if absent.
pub fn open_pool(path: &Path) -> Result<ConnectionPool> {
    let manager = SqliteConnectionManager::file(path)
        .with_init(|conn| conn.execute_batch(CONNECTION_PRAGMAS));
    let pool = r2d2::Pool::builder()
        .max_size(8)
        .connection_timeout(Duration::from_secs(10))
        .build(manager)?;
    Ok(pool)
}

/// Open a single-connection in-memory pool (tests).
///
/// One connection only: each in-memory database is private to its
/// connection, so a larger pool would see different databases.
pub fn open_in_memory_pool() -> Result<ConnectionPool> {
    let manager = SqliteConnectionManager::memory()
        .with_init(|conn| conn.execute_batch("PRAGMA foreign_keys = ON;"));
    let pool = r2d2::Pool::builder().max_size(1).build(manager)?;
    Ok(pool)
}
