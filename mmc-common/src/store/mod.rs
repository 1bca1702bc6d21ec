//! The catalog Store
//!
//! Sole owner of persistent state. Every public mutating operation runs inside
//! one transaction while holding the in-process writer slot, so each operation
//! commits completely or not at all and writers never interleave. Readers use
//! the pool directly and proceed alongside the writer (WAL).
//!
//! Submodules:
//! - [`tracks`]: single-track upsert, delete, bulk update, duplicate checks
//! - [`tags`]: predicates and tag rows
//! - [`weighting`]: the cumulative-weighting index and weighted sampling
//! - [`collections`]: collection CRUD and membership
//! - [`search`]: substring and predicate search
//! - [`info`]: consistency probes and metrics

pub mod collections;
pub mod info;
pub mod search;
pub mod tags;
pub mod tracks;
pub mod weighting;

pub use collections::{validate_slug, MembershipRemoval, RESERVED_SLUGS};
pub use info::{Check, InfoReport, Metric};
pub use search::{TrackFilter, TrackPage};
pub use tracks::{BulkOutcome, UpsertOutcome, WriteMode};

use crate::events::{CatalogEvent, EventBus};
use crate::{Error, Result};
use sqlx::pool::PoolConnection;
use sqlx::{Sqlite, SqliteConnection, SqlitePool, Transaction};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::debug;

/// Handle to the catalog database
///
/// Cheap to clone; clones share the pool, the writer slot and the event bus.
#[derive(Clone)]
pub struct Store {
    pool: SqlitePool,
    writer: Arc<Mutex<()>>,
    busy_timeout: Duration,
    events: EventBus,
}

/// An open write transaction holding the writer slot
///
/// Dropping without [`Writer::commit`] rolls the transaction back.
pub(crate) struct Writer {
    // Declared before the guard so the rollback is queued before the slot frees
    tx: Transaction<'static, Sqlite>,
    _guard: OwnedMutexGuard<()>,
}

impl Writer {
    pub(crate) fn conn(&mut self) -> &mut SqliteConnection {
        &mut self.tx
    }

    pub(crate) async fn commit(self) -> Result<()> {
        self.tx.commit().await?;
        Ok(())
    }
}

impl Store {
    /// Open (or create) the database file and run migrations
    pub async fn open(db_path: &Path, busy_timeout: Duration, events: EventBus) -> Result<Store> {
        let pool = crate::db::init_database(db_path, busy_timeout).await?;
        Ok(Store::from_pool(pool, busy_timeout, events))
    }

    /// Fresh in-memory catalog
    pub async fn open_in_memory(events: EventBus) -> Result<Store> {
        let pool = crate::db::init_in_memory().await?;
        Ok(Store::from_pool(
            pool,
            Duration::from_millis(crate::config::DEFAULT_BUSY_TIMEOUT_MS),
            events,
        ))
    }

    /// Wrap an already-initialized pool
    pub fn from_pool(pool: SqlitePool, busy_timeout: Duration, events: EventBus) -> Store {
        Store {
            pool,
            writer: Arc::new(Mutex::new(())),
            busy_timeout,
            events,
        }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    /// Acquire the writer slot (bounded by the busy timeout) and begin a transaction
    pub(crate) async fn begin_write(&self) -> Result<Writer> {
        let guard = tokio::time::timeout(self.busy_timeout, self.writer.clone().lock_owned())
            .await
            .map_err(|_| {
                Error::Contention(format!(
                    "writer busy for longer than {} ms",
                    self.busy_timeout.as_millis()
                ))
            })?;
        let tx = self.pool.begin().await?;
        Ok(Writer { tx, _guard: guard })
    }

    pub(crate) async fn read_conn(&self) -> Result<PoolConnection<Sqlite>> {
        Ok(self.pool.acquire().await?)
    }

    pub(crate) fn publish(&self, event: CatalogEvent) {
        debug!("Publishing {} event", event.action);
        self.events.emit_lossy(event);
    }
}

/// Bind helper: empty strings are stored as NULL
pub(crate) fn non_empty(value: &str) -> Option<&str> {
    if value.is_empty() {
        None
    } else {
        Some(value)
    }
}

/// Weightings must be finite and non-negative
pub(crate) fn validate_weighting(weighting: f64) -> Result<()> {
    if !weighting.is_finite() || weighting < 0.0 {
        return Err(Error::InvalidInput(format!(
            "weighting must be a non-negative number, got {}",
            weighting
        )));
    }
    Ok(())
}

/// Tolerance for comparing accumulated float sums
pub(crate) fn approx_eq(a: f64, b: f64) -> bool {
    (a - b).abs() <= 1e-6 * a.abs().max(b.abs()).max(1.0)
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use crate::db::models::{Track, TrackDelta, TrackField};

    pub async fn store() -> Store {
        Store::open_in_memory(EventBus::new(64)).await.unwrap()
    }

    /// Create a track keyed by url with the given weighting
    pub async fn add_track(store: &Store, n: i64, weighting: f64) -> Track {
        let delta = TrackDelta {
            fingerprint: Some(format!("fp{}", n)),
            duration: Some(100 + n),
            weighting: Some(weighting),
            ..Default::default()
        };
        store
            .upsert_track_by_field(
                TrackField::Url,
                &format!("http://example.org/t{}", n),
                delta,
                false,
                WriteMode::Put,
            )
            .await
            .unwrap()
            .track
    }

    pub async fn cum_weighting(store: &Store, id: i64) -> f64 {
        sqlx::query_scalar("SELECT cum_weighting FROM track WHERE id = ?")
            .bind(id)
            .fetch_one(store.pool())
            .await
            .unwrap()
    }
}
