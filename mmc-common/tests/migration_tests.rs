//! Upgrade of databases created before collections had an icon column

use mmc_common::events::EventBus;
use mmc_common::pagination::PageRequest;
use mmc_common::Store;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use std::time::Duration;
use tempfile::TempDir;

/// Build a database with the pre-icon collection table
async fn create_legacy_db(dir: &TempDir) -> std::path::PathBuf {
    let path = dir.path().join("legacy.sqlite");
    let options = SqliteConnectOptions::new()
        .filename(&path)
        .create_if_missing(true);
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect_with(options)
        .await
        .unwrap();

    for statement in [
        r#"CREATE TABLE track (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            fingerprint TEXT UNIQUE,
            url TEXT UNIQUE,
            duration INTEGER NOT NULL DEFAULT 0,
            weighting REAL NOT NULL DEFAULT 0,
            cum_weighting REAL NOT NULL DEFAULT 0
        )"#,
        "CREATE TABLE predicate (id TEXT PRIMARY KEY)",
        r#"CREATE TABLE tag (
            trackid INTEGER NOT NULL REFERENCES track(id),
            predicateid TEXT NOT NULL REFERENCES predicate(id),
            value TEXT NOT NULL,
            UNIQUE (trackid, predicateid)
        )"#,
        "CREATE TABLE collection (slug TEXT PRIMARY KEY, name TEXT NOT NULL UNIQUE)",
        r#"CREATE TABLE collection_track (
            collectionslug TEXT NOT NULL REFERENCES collection(slug),
            trackid INTEGER NOT NULL REFERENCES track(id),
            cum_weighting REAL NOT NULL DEFAULT 0,
            UNIQUE (collectionslug, trackid)
        )"#,
        "INSERT INTO track (fingerprint, url, duration, weighting, cum_weighting) VALUES ('f1', 'http://example.org/t1', 7, 2, 2)",
        "INSERT INTO collection (slug, name) VALUES ('jazz', '🎷 Jazz')",
        "INSERT INTO collection (slug, name) VALUES ('plain', 'Road Trip')",
        "INSERT INTO collection_track (collectionslug, trackid, cum_weighting) VALUES ('jazz', 1, 2)",
    ] {
        sqlx::query(statement).execute(&pool).await.unwrap();
    }
    pool.close().await;
    path
}

#[tokio::test]
async fn test_legacy_collections_gain_icons() {
    let dir = TempDir::new().unwrap();
    let path = create_legacy_db(&dir).await;

    let store = Store::open(&path, Duration::from_secs(5), EventBus::new(4))
        .await
        .unwrap();

    let collections = store.list_collections().await.unwrap();
    let jazz = collections.iter().find(|c| c.slug == "jazz").unwrap();
    assert_eq!(jazz.icon, "🎷");
    assert_eq!(jazz.name, "Jazz");
    assert_eq!(jazz.tracks.len(), 1);

    let plain = collections.iter().find(|c| c.slug == "plain").unwrap();
    assert_eq!(plain.icon, "");
    assert_eq!(plain.name, "Road Trip");

    let version: i32 = sqlx::query_scalar("SELECT MAX(version) FROM schema_version")
        .fetch_one(store.pool())
        .await
        .unwrap();
    assert_eq!(version, 1);
    assert!(store.check_index_consistency().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_reopening_is_idempotent() {
    let dir = TempDir::new().unwrap();
    let path = create_legacy_db(&dir).await;

    let store = Store::open(&path, Duration::from_secs(5), EventBus::new(4))
        .await
        .unwrap();
    store.pool().close().await;

    let store = Store::open(&path, Duration::from_secs(5), EventBus::new(4))
        .await
        .unwrap();
    let jazz = store
        .get_collection("jazz", PageRequest::All)
        .await
        .unwrap();
    assert_eq!(jazz.name, "Jazz");

    let rows: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM schema_version")
        .fetch_one(store.pool())
        .await
        .unwrap();
    assert_eq!(rows, 1);
}
