//! `SQLite` database connection and schema bootstrap.

use std::fs;
use std::str::FromStr;

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::SqlitePool;

use crate::{AppError, Result};

/// Alias for the shared `SQLite` connection pool.
pub type Database = SqlitePool;

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS bindings (
    user_id        INTEGER NOT NULL,
    thread_id      INTEGER NOT NULL,
    session_id     TEXT,
    workspace_path TEXT,
    model          TEXT NOT NULL DEFAULT 'auto',
    updated_at     TEXT NOT NULL,
    PRIMARY KEY (user_id, thread_id)
);
";

/// Connect to a file-backed `SQLite` database and apply the schema.
///
/// Creates parent directories if needed. WAL journal mode with a single
/// writer connection keeps concurrent turn tasks safe.
///
/// # Errors
///
/// Returns `AppError::Db` if the connection or schema application fails.
pub async fn connect(path: &str) -> Result<Database> {
    let db_path = std::path::Path::new(path);
    if let Some(parent) = db_path.parent() {
        fs::create_dir_all(parent)
            .map_err(|err| AppError::Db(format!("failed to create db dir: {err}")))?;
    }

    let opts = SqliteConnectOptions::from_str(path)
        .map_err(|err| AppError::Db(format!("invalid db path: {err}")))?
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal);

    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect_with(opts)
        .await?;

    sqlx::query(SCHEMA).execute(&pool).await?;
    Ok(pool)
}

/// Connect to an in-memory `SQLite` database and apply the schema.
///
/// `min_connections(1)` keeps the database alive for the lifetime of the
/// pool.
///
/// # Errors
///
/// Returns `AppError::Db` if the connection or schema application fails.
pub async fn connect_memory() -> Result<Database> {
    let opts = SqliteConnectOptions::from_str("sqlite::memory:")
        .map_err(|err| AppError::Db(format!("invalid memory uri: {err}")))?;

    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .min_connections(1)
        .connect_with(opts)
        .await?;

    sqlx::query(SCHEMA).execute(&pool).await?;
    Ok(pool)
}
