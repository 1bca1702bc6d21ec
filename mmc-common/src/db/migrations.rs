//! Database schema migrations
//!
//! Versioned, idempotent migrations tracked in the `schema_version` table.
//!
//! # Migration Guidelines
//!
//! 1. **Never modify existing migrations** - databases upgrading from older versions depend on them
//! 2. **Always add new migrations** - one function per schema change
//! 3. **Detect before changing** - each migration checks whether its change is already present
//! 4. **Use ALTER TABLE** - prefer ALTER TABLE over DROP/CREATE to preserve data

use crate::Result;
use sqlx::SqlitePool;
use tracing::{info, warn};

/// Current schema version
///
/// **IMPORTANT:** Increment this when adding new migrations
const CURRENT_SCHEMA_VERSION: i32 = 1;

/// Get current schema version from database
///
/// Returns 0 if schema_version table doesn't exist or has no rows
async fn get_schema_version(pool: &SqlitePool) -> Result<i32> {
    let table_exists: bool = sqlx::query_scalar(
        r#"
        SELECT EXISTS(
            SELECT 1 FROM sqlite_master
            WHERE type='table' AND name='schema_version'
        )
        "#,
    )
    .fetch_one(pool)
    .await?;

    if !table_exists {
        return Ok(0);
    }

    let version: Option<i32> =
        sqlx::query_scalar("SELECT version FROM schema_version ORDER BY version DESC LIMIT 1")
            .fetch_optional(pool)
            .await?;

    Ok(version.unwrap_or(0))
}

async fn set_schema_version(pool: &SqlitePool, version: i32) -> Result<()> {
    sqlx::query("INSERT INTO schema_version (version) VALUES (?)")
        .bind(version)
        .execute(pool)
        .await?;

    Ok(())
}

/// Run all pending migrations
pub async fn run_migrations(pool: &SqlitePool) -> Result<()> {
    let current_version = get_schema_version(pool).await?;

    if current_version == CURRENT_SCHEMA_VERSION {
        info!("Database schema is up to date (v{})", current_version);
        return Ok(());
    }

    if current_version > CURRENT_SCHEMA_VERSION {
        warn!(
            "Database schema version ({}) is newer than code version ({})",
            current_version, CURRENT_SCHEMA_VERSION
        );
        warn!("This may indicate a downgrade. Proceeding with caution.");
        return Ok(());
    }

    info!(
        "Running database migrations: v{} -> v{}",
        current_version, CURRENT_SCHEMA_VERSION
    );

    if current_version < 1 {
        migrate_v1(pool).await?;
        set_schema_version(pool, 1).await?;
        info!("✓ Migration v1 completed");
    }

    Ok(())
}

/// Migration v1: give collections an icon column
///
/// **Background:** collections used to carry their icon inside the name, e.g.
/// `"🎷 Jazz"`. This migration adds the `icon` column and moves the leading
/// symbol sequence (everything before the first space) out of each name.
/// Names without such a prefix keep their name and get an empty icon.
async fn migrate_v1(pool: &SqlitePool) -> Result<()> {
    info!("Running migration v1: Split collection icons out of names");

    let has_column: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM pragma_table_info('collection') WHERE name = 'icon'",
    )
    .fetch_one(pool)
    .await?;

    if has_column > 0 {
        info!("  icon column already exists - skipping");
        return Ok(());
    }

    let mut tx = pool.begin().await?;

    sqlx::query("ALTER TABLE collection ADD COLUMN icon TEXT NOT NULL DEFAULT ''")
        .execute(&mut *tx)
        .await?;

    let rows: Vec<(String, String)> = sqlx::query_as("SELECT slug, name FROM collection")
        .fetch_all(&mut *tx)
        .await?;

    let mut converted = 0;
    for (slug, raw_name) in rows {
        let (icon, name) = split_legacy_name(&raw_name);
        if icon.is_empty() {
            continue;
        }

        let clash: Option<String> =
            sqlx::query_scalar("SELECT slug FROM collection WHERE name = ? AND slug != ?")
                .bind(&name)
                .bind(&slug)
                .fetch_optional(&mut *tx)
                .await?;
        if let Some(other) = clash {
            warn!(
                "  Collection {} keeps name {:?}: {:?} is already used by {}",
                slug, raw_name, name, other
            );
            continue;
        }

        sqlx::query("UPDATE collection SET icon = ?, name = ? WHERE slug = ?")
            .bind(&icon)
            .bind(&name)
            .bind(&slug)
            .execute(&mut *tx)
            .await?;
        converted += 1;
    }

    tx.commit().await?;

    info!("  ✓ Added icon column, split {} collection names", converted);
    Ok(())
}

/// Split a legacy collection name into (icon, name)
///
/// The icon is the leading run of non-alphanumeric graphemes up to the first
/// space. Anything that doesn't fit that shape stays in the name.
pub fn split_legacy_name(raw: &str) -> (String, String) {
    match raw.split_once(' ') {
        Some((lead, rest))
            if !lead.is_empty()
                && !lead.chars().any(char::is_alphanumeric)
                && !rest.trim().is_empty() =>
        {
            (lead.to_string(), rest.trim_start().to_string())
        }
        _ => (String::new(), raw.to_string()),
    }
}
