//! mmc-export - batch RDF exporter
//!
//! Copies the live catalog with `VACUUM INTO`, renders every track from the
//! copy and atomically replaces the output file. Turtle unless the output
//! path ends in `.jsonld` / `.json`.

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use anyhow::{bail, Context, Result};
use clap::Parser;
use mmc_common::config::{Config, ConfigLayer};
use mmc_common::events::EventBus;
use mmc_common::rdf::{graph_from_rows, RdfContext, RdfFormat};
use mmc_common::Store;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use tracing::{info, warn, Level};
use tracing_subscriber::EnvFilter;

/// Command-line arguments for mmc-export
#[derive(Parser, Debug)]
#[command(name = "mmc-export")]
#[command(about = "Write the media catalog as an RDF file")]
#[command(version)]
struct Args {
    /// SQLite database file to export
    #[arg(long, env = "MMC_DB_PATH")]
    db_path: Option<PathBuf>,

    /// Output file (`.ttl`, `.jsonld`)
    #[arg(short, long, env = "MMC_EXPORT_PATH")]
    output: Option<PathBuf>,

    /// Canonical origin of the media manager (RDF URIs)
    #[arg(long, env = "MEDIA_MANAGER")]
    media_manager: Option<String>,

    /// How long to wait for a busy database
    #[arg(long, env = "MMC_BUSY_TIMEOUT_MS")]
    busy_timeout_ms: Option<u64>,

    /// TOML config file
    #[arg(short, long, env = "MMC_CONFIG")]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(Level::INFO.into()))
        .init();

    let args = Args::parse();
    let layer = ConfigLayer {
        db_path: args.db_path,
        export_path: args.output,
        media_manager: args.media_manager,
        busy_timeout_ms: args.busy_timeout_ms,
        ..Default::default()
    };
    let config = Config::resolve(layer, args.config.as_deref())
        .context("Failed to load configuration")?;

    let started = Instant::now();
    let tracks = export(
        &config.db_path,
        &config.export_path,
        &config.media_manager,
        config.busy_timeout,
    )
    .await?;
    info!(
        "Exported {} tracks to {} in {:.2?}",
        tracks,
        config.export_path.display(),
        started.elapsed()
    );
    Ok(())
}

/// Snapshot, render and publish; returns the number of tracks written
async fn export(
    db_path: &Path,
    output: &Path,
    media_manager: &str,
    busy_timeout: Duration,
) -> Result<usize> {
    if !db_path.exists() {
        bail!("Database not found: {}", db_path.display());
    }
    let rdf = RdfContext::new(media_manager)?;
    let format = RdfFormat::from_extension(output);

    if let Some(parent) = output.parent() {
        if !parent.as_os_str().is_empty() {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
    }

    let snapshot = sibling(output, "snapshot.sqlite");
    snapshot_database(db_path, &snapshot, busy_timeout).await?;
    let rendered = render_snapshot(&snapshot, &rdf, format, busy_timeout).await;
    remove_snapshot(&snapshot).await;
    let (body, tracks) = rendered?;

    let staging = sibling(output, "tmp");
    tokio::fs::write(&staging, body)
        .await
        .with_context(|| format!("Failed to write {}", staging.display()))?;
    tokio::fs::rename(&staging, output)
        .await
        .with_context(|| format!("Failed to replace {}", output.display()))?;

    Ok(tracks)
}

/// `<output>.<suffix>` in the output directory
fn sibling(output: &Path, suffix: &str) -> PathBuf {
    let mut name = output.file_name().unwrap_or_default().to_os_string();
    name.push(format!(".{}", suffix));
    output.with_file_name(name)
}

/// Consistent copy of the live database, taken without blocking its writer
async fn snapshot_database(db_path: &Path, snapshot: &Path, busy_timeout: Duration) -> Result<()> {
    // VACUUM INTO refuses to overwrite
    remove_snapshot(snapshot).await;

    let options = SqliteConnectOptions::new()
        .filename(db_path)
        .busy_timeout(busy_timeout);
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect_with(options)
        .await
        .with_context(|| format!("Failed to open {}", db_path.display()))?;

    sqlx::query("VACUUM INTO ?")
        .bind(snapshot.to_string_lossy().as_ref())
        .execute(&pool)
        .await
        .with_context(|| format!("Failed to snapshot {}", db_path.display()))?;
    pool.close().await;

    info!("Snapshot written to {}", snapshot.display());
    Ok(())
}

async fn render_snapshot(
    snapshot: &Path,
    rdf: &RdfContext,
    format: RdfFormat,
    busy_timeout: Duration,
) -> Result<(String, usize)> {
    // Migrations bring older snapshots up to the current schema
    let store = Store::open(snapshot, busy_timeout, EventBus::new(1)).await?;
    let rows = store.tag_rows(None).await?;
    store.pool().close().await;

    let mut tracks = 0;
    let mut previous = None;
    for row in &rows {
        if previous != Some(row.track_id) {
            tracks += 1;
            previous = Some(row.track_id);
        }
    }

    let graph = graph_from_rows(&rows, rdf);
    Ok((format.render(&graph, rdf), tracks))
}

/// Remove the snapshot and any `-wal` / `-shm` side files SQLite left next to it
async fn remove_snapshot(snapshot: &Path) {
    let side_file = |suffix: &str| {
        let mut name = snapshot.as_os_str().to_os_string();
        name.push(suffix);
        PathBuf::from(name)
    };

    for path in [snapshot.to_path_buf(), side_file("-wal"), side_file("-shm")] {
        match tokio::fs::remove_file(&path).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!("Failed to remove {}: {}", path.display(), e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mmc_common::db::{TrackDelta, TrackField};
    use mmc_common::store::WriteMode;

    async fn seed(db_path: &Path) {
        let store = Store::open(db_path, Duration::from_secs(5), EventBus::new(8))
            .await
            .unwrap();
        for (n, title) in [(1, "Help!"), (2, "Yellow Submarine")] {
            let delta: TrackDelta = serde_json::from_value(serde_json::json!({
                "fingerprint": format!("f{}", n),
                "duration": 120,
                "tags": { "title": title, "artist": "The Beatles" },
            }))
            .unwrap();
            store
                .upsert_track_by_field(
                    TrackField::Url,
                    &format!("http://example.org/t{}", n),
                    delta,
                    false,
                    WriteMode::Put,
                )
                .await
                .unwrap();
        }
        store.pool().close().await;
    }

    #[tokio::test]
    async fn test_export_turtle() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("media.sqlite");
        seed(&db_path).await;

        let output = dir.path().join("export").join("metadata.ttl");
        let tracks = export(&db_path, &output, "http://mm.example", Duration::from_secs(5))
            .await
            .unwrap();
        assert_eq!(tracks, 2);

        let ttl = std::fs::read_to_string(&output).unwrap();
        assert!(ttl.starts_with("@prefix : <http://mm.example/ontology#> ."));
        assert!(ttl.contains("<http://mm.example/tracks/1> a mo:Track"));
        assert!(ttl.contains("skos:prefLabel \"Yellow Submarine\""));
        assert!(ttl.contains("mo:duration \"120000\"^^xsd:integer"));

        // Only the export itself remains
        let leftovers: Vec<_> = std::fs::read_dir(dir.path().join("export"))
            .unwrap()
            .map(|e| e.unwrap().file_name())
            .collect();
        assert_eq!(leftovers, vec![std::ffi::OsString::from("metadata.ttl")]);
    }

    #[tokio::test]
    async fn test_export_jsonld_by_extension() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("media.sqlite");
        seed(&db_path).await;

        let output = dir.path().join("metadata.jsonld");
        export(&db_path, &output, "http://mm.example", Duration::from_secs(5))
            .await
            .unwrap();

        let doc: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&output).unwrap()).unwrap();
        // ontology header node plus two tracks
        assert_eq!(doc["@graph"].as_array().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_export_replaces_previous_file() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("media.sqlite");
        seed(&db_path).await;

        let output = dir.path().join("metadata.ttl");
        std::fs::write(&output, "stale").unwrap();
        export(&db_path, &output, "http://mm.example", Duration::from_secs(5))
            .await
            .unwrap();
        assert_ne!(std::fs::read_to_string(&output).unwrap(), "stale");
    }

    #[tokio::test]
    async fn test_missing_database_fails() {
        let dir = tempfile::tempdir().unwrap();
        let result = export(
            &dir.path().join("absent.sqlite"),
            &dir.path().join("metadata.ttl"),
            "http://mm.example",
            Duration::from_secs(5),
        )
        .await;
        assert!(result.is_err());
        assert!(!dir.path().join("metadata.ttl").exists());
    }

    #[test]
    fn test_sibling_paths() {
        assert_eq!(
            sibling(Path::new("/srv/export/metadata.ttl"), "tmp"),
            PathBuf::from("/srv/export/metadata.ttl.tmp")
        );
    }
}
