//! Database initialization
//!
//! Opens (creating if needed) the SQLite database, creates the five catalog
//! relations and runs pending migrations.

use crate::Result;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use tracing::info;

/// Readers run concurrently; writes are serialized by the Store
const MAX_CONNECTIONS: u32 = 8;

/// Initialize database connection and create tables if needed
pub async fn init_database(db_path: &Path, busy_timeout: Duration) -> Result<SqlitePool> {
    let newly_created = !db_path.exists();

    // Create parent directory if it doesn't exist
    if let Some(parent) = db_path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    // WAL allows concurrent readers with one writer
    let options = SqliteConnectOptions::new()
        .filename(db_path)
        .create_if_missing(true)
        .foreign_keys(true)
        .journal_mode(SqliteJournalMode::Wal)
        .busy_timeout(busy_timeout);

    let pool = SqlitePoolOptions::new()
        .max_connections(MAX_CONNECTIONS)
        .acquire_timeout(busy_timeout)
        .connect_with(options)
        .await?;

    if newly_created {
        info!("Initialized new database: {}", db_path.display());
    } else {
        info!("Opened existing database: {}", db_path.display());
    }

    create_schema(&pool).await?;
    crate::db::migrations::run_migrations(&pool).await?;

    info!("Database busy timeout set to {} ms", busy_timeout.as_millis());
    Ok(pool)
}

/// In-memory database on a single long-lived connection
///
/// Every pool connection to `sqlite::memory:` is a separate database, so the
/// pool is pinned to exactly one connection that never expires.
pub async fn init_in_memory() -> Result<SqlitePool> {
    let options = SqliteConnectOptions::from_str("sqlite::memory:")?.foreign_keys(true);

    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .min_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect_with(options)
        .await?;

    create_schema(&pool).await?;
    crate::db::migrations::run_migrations(&pool).await?;
    Ok(pool)
}

/// Create all tables (idempotent)
pub async fn create_schema(pool: &SqlitePool) -> Result<()> {
    create_schema_version_table(pool).await?;
    create_track_table(pool).await?;
    create_predicate_table(pool).await?;
    create_tag_table(pool).await?;
    create_collection_table(pool).await?;
    create_collection_track_table(pool).await?;
    Ok(())
}

async fn create_schema_version_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY,
            applied_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

/// Track table
///
/// Empty fingerprints and urls are stored as NULL so the UNIQUE constraints
/// only bind non-empty values. AUTOINCREMENT keeps ids from being reused.
async fn create_track_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS track (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            fingerprint TEXT UNIQUE,
            url TEXT UNIQUE,
            duration INTEGER NOT NULL DEFAULT 0 CHECK (duration >= 0),
            weighting REAL NOT NULL DEFAULT 0 CHECK (weighting >= 0),
            cum_weighting REAL NOT NULL DEFAULT 0 CHECK (cum_weighting >= 0)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_track_cum_weighting ON track(cum_weighting)")
        .execute(pool)
        .await?;

    Ok(())
}

async fn create_predicate_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS predicate (
            id TEXT PRIMARY KEY
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_tag_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS tag (
            trackid INTEGER NOT NULL REFERENCES track(id),
            predicateid TEXT NOT NULL REFERENCES predicate(id),
            value TEXT NOT NULL,
            UNIQUE (trackid, predicateid)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_tag_predicate_value ON tag(predicateid, value)")
        .execute(pool)
        .await?;

    Ok(())
}

/// Collection table
///
/// Databases created before collections had icons keep their two-column table
/// here; migration v1 upgrades it.
async fn create_collection_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS collection (
            slug TEXT PRIMARY KEY,
            name TEXT NOT NULL UNIQUE,
            icon TEXT NOT NULL DEFAULT ''
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_collection_track_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS collection_track (
            collectionslug TEXT NOT NULL REFERENCES collection(slug),
            trackid INTEGER NOT NULL REFERENCES track(id),
            cum_weighting REAL NOT NULL DEFAULT 0 CHECK (cum_weighting >= 0),
            UNIQUE (collectionslug, trackid)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_collection_track_cum ON collection_track(collectionslug, cum_weighting)",
    )
    .execute(pool)
    .await?;

    Ok(())
}
