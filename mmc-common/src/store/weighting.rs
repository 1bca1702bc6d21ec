//! Cumulative-weighting index and weighted sampling
//!
//! Each weighted set (all tracks, and each collection) keeps a prefix-sum column
//! `cum_weighting`. Ordered by `cum_weighting`, the non-zero values are strictly
//! increasing and consecutive differences equal the tracks' weightings, so
//! `MAX(cum_weighting) == SUM(weighting)` and a weighted draw is one range
//! lookup: pick `r` in `[0, MAX)` and take the smallest `cum_weighting > r`.
//!
//! Changing a weighting compacts the gap the track leaves (everything above it
//! shifts down by the old weighting) and re-appends the track at the top. Zero
//! weighting means `cum_weighting = 0`, which excludes the track from draws.

use super::{validate_weighting, Store};
use crate::db::models::Track;
use crate::events::{Action, CatalogEvent};
use crate::{Error, Result};
use rand::Rng;
use sqlx::SqliteConnection;

/// Set a track's weighting, maintaining the global and per-collection indexes
///
/// Returns `false` when the weighting was already `new_weighting`.
pub(crate) async fn set_weighting_in(
    conn: &mut SqliteConnection,
    track_id: i64,
    new_weighting: f64,
) -> Result<bool> {
    let row: Option<(f64, f64)> =
        sqlx::query_as("SELECT weighting, cum_weighting FROM track WHERE id = ?")
            .bind(track_id)
            .fetch_optional(&mut *conn)
            .await?;
    let (old_weighting, old_cum) =
        row.ok_or_else(|| Error::NotFound(format!("track {}", track_id)))?;

    if new_weighting == old_weighting {
        return Ok(false);
    }

    // Compact: close the gap above this track
    if old_cum > 0.0 {
        sqlx::query("UPDATE track SET cum_weighting = cum_weighting - ? WHERE cum_weighting > ?")
            .bind(old_weighting)
            .bind(old_cum)
            .execute(&mut *conn)
            .await?;
    }

    // Re-slot at the top of the compacted sequence
    let new_cum = if new_weighting > 0.0 {
        let max: f64 = sqlx::query_scalar(
            "SELECT COALESCE(MAX(cum_weighting), 0.0) FROM track WHERE id != ?",
        )
        .bind(track_id)
        .fetch_one(&mut *conn)
        .await?;
        max + new_weighting
    } else {
        0.0
    };

    sqlx::query("UPDATE track SET weighting = ?, cum_weighting = ? WHERE id = ?")
        .bind(new_weighting)
        .bind(new_cum)
        .bind(track_id)
        .execute(&mut *conn)
        .await?;

    // Same compact-then-append within every collection the track belongs to
    let memberships: Vec<(String, f64)> = sqlx::query_as(
        "SELECT collectionslug, cum_weighting FROM collection_track WHERE trackid = ?",
    )
    .bind(track_id)
    .fetch_all(&mut *conn)
    .await?;

    for (slug, old_collection_cum) in memberships {
        reslot_in_collection(
            conn,
            &slug,
            track_id,
            old_weighting,
            old_collection_cum,
            new_weighting,
        )
        .await?;
    }

    Ok(true)
}

async fn reslot_in_collection(
    conn: &mut SqliteConnection,
    slug: &str,
    track_id: i64,
    old_weighting: f64,
    old_cum: f64,
    new_weighting: f64,
) -> Result<()> {
    if old_cum > 0.0 {
        compact_collection(conn, slug, old_weighting, old_cum).await?;
    }

    let new_cum = if new_weighting > 0.0 {
        max_in_collection(conn, slug, Some(track_id)).await? + new_weighting
    } else {
        0.0
    };

    sqlx::query(
        "UPDATE collection_track SET cum_weighting = ? WHERE collectionslug = ? AND trackid = ?",
    )
    .bind(new_cum)
    .bind(slug)
    .bind(track_id)
    .execute(&mut *conn)
    .await?;

    Ok(())
}

async fn compact_collection(
    conn: &mut SqliteConnection,
    slug: &str,
    weighting: f64,
    above: f64,
) -> Result<()> {
    sqlx::query(
        r#"
        UPDATE collection_track SET cum_weighting = cum_weighting - ?
        WHERE collectionslug = ? AND cum_weighting > ?
        "#,
    )
    .bind(weighting)
    .bind(slug)
    .bind(above)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

async fn max_in_collection(
    conn: &mut SqliteConnection,
    slug: &str,
    excluding: Option<i64>,
) -> Result<f64> {
    let max: f64 = sqlx::query_scalar(
        r#"
        SELECT COALESCE(MAX(cum_weighting), 0.0) FROM collection_track
        WHERE collectionslug = ? AND trackid != ?
        "#,
    )
    .bind(slug)
    .bind(excluding.unwrap_or(-1))
    .fetch_one(&mut *conn)
    .await?;
    Ok(max)
}

/// Append a track to the end of a collection's prefix sum
///
/// Returns `false` if it was already a member.
pub(crate) async fn append_to_collection(
    conn: &mut SqliteConnection,
    slug: &str,
    track_id: i64,
) -> Result<bool> {
    let collection: Option<String> = sqlx::query_scalar("SELECT slug FROM collection WHERE slug = ?")
        .bind(slug)
        .fetch_optional(&mut *conn)
        .await?;
    if collection.is_none() {
        return Err(Error::NotFound(format!("collection {}", slug)));
    }

    let weighting: f64 = sqlx::query_scalar("SELECT weighting FROM track WHERE id = ?")
        .bind(track_id)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or_else(|| Error::NotFound(format!("track {}", track_id)))?;

    let existing: Option<f64> = sqlx::query_scalar(
        "SELECT cum_weighting FROM collection_track WHERE collectionslug = ? AND trackid = ?",
    )
    .bind(slug)
    .bind(track_id)
    .fetch_optional(&mut *conn)
    .await?;
    if existing.is_some() {
        return Ok(false);
    }

    let cum = if weighting > 0.0 {
        max_in_collection(conn, slug, None).await? + weighting
    } else {
        0.0
    };

    sqlx::query("INSERT INTO collection_track (collectionslug, trackid, cum_weighting) VALUES (?, ?, ?)")
        .bind(slug)
        .bind(track_id)
        .bind(cum)
        .execute(&mut *conn)
        .await?;

    Ok(true)
}

/// Remove a track from a collection, compacting the collection's prefix sum
///
/// Returns `false` if it was not a member.
pub(crate) async fn remove_from_collection(
    conn: &mut SqliteConnection,
    slug: &str,
    track_id: i64,
) -> Result<bool> {
    let existing: Option<f64> = sqlx::query_scalar(
        "SELECT cum_weighting FROM collection_track WHERE collectionslug = ? AND trackid = ?",
    )
    .bind(slug)
    .bind(track_id)
    .fetch_optional(&mut *conn)
    .await?;

    let Some(cum) = existing else {
        return Ok(false);
    };

    if cum > 0.0 {
        let weighting: f64 = sqlx::query_scalar("SELECT weighting FROM track WHERE id = ?")
            .bind(track_id)
            .fetch_one(&mut *conn)
            .await?;
        compact_collection(conn, slug, weighting, cum).await?;
    }

    sqlx::query("DELETE FROM collection_track WHERE collectionslug = ? AND trackid = ?")
        .bind(slug)
        .bind(track_id)
        .execute(&mut *conn)
        .await?;

    Ok(true)
}

/// Draw `count` uniform points in `[0, max)`
///
/// The thread RNG is not `Send`, so draws happen before any await.
fn draw_points(max: f64, count: usize) -> Vec<f64> {
    let mut rng = rand::thread_rng();
    (0..count).map(|_| rng.gen_range(0.0..max)).collect()
}

impl Store {
    pub async fn get_weighting(&self, track_id: i64) -> Result<f64> {
        let mut conn = self.read_conn().await?;
        sqlx::query_scalar("SELECT weighting FROM track WHERE id = ?")
            .bind(track_id)
            .fetch_optional(&mut *conn)
            .await?
            .ok_or_else(|| Error::NotFound(format!("track {}", track_id)))
    }

    /// Set one track's weighting
    ///
    /// Emits `trackWeightingUpdated` when the value changed.
    pub async fn set_weighting(&self, track_id: i64, weighting: f64) -> Result<Action> {
        validate_weighting(weighting)?;

        let mut writer = self.begin_write().await?;
        let changed = set_weighting_in(writer.conn(), track_id, weighting).await?;
        writer.commit().await?;

        if !changed {
            return Ok(Action::NoChange);
        }

        let track = self.get_track(track_id).await?;
        self.publish(CatalogEvent::for_track(Action::TrackWeightingUpdated, track));
        Ok(Action::TrackWeightingUpdated)
    }

    /// Up to `count` independent weighted draws over all tracks
    ///
    /// Empty when every weighting is zero.
    pub async fn sample_tracks(&self, count: usize) -> Result<Vec<Track>> {
        let ids = {
            let mut conn = self.read_conn().await?;
            let max: f64 = sqlx::query_scalar("SELECT COALESCE(MAX(cum_weighting), 0.0) FROM track")
                .fetch_one(&mut *conn)
                .await?;
            if max <= 0.0 {
                return Ok(Vec::new());
            }

            let mut ids = Vec::with_capacity(count);
            for r in draw_points(max, count) {
                let id: Option<i64> = sqlx::query_scalar(
                    "SELECT id FROM track WHERE cum_weighting > ? ORDER BY cum_weighting ASC LIMIT 1",
                )
                .bind(r)
                .fetch_optional(&mut *conn)
                .await?;
                // None only if a concurrent write shrank the index mid-draw
                ids.extend(id);
            }
            ids
        };

        self.load_tracks(&ids).await
    }

    /// Up to `count` independent weighted draws within one collection
    pub async fn sample_collection(&self, slug: &str, count: usize) -> Result<Vec<Track>> {
        let ids = {
            let mut conn = self.read_conn().await?;
            let exists: Option<String> = sqlx::query_scalar("SELECT slug FROM collection WHERE slug = ?")
                .bind(slug)
                .fetch_optional(&mut *conn)
                .await?;
            if exists.is_none() {
                return Err(Error::NotFound(format!("collection {}", slug)));
            }

            let max = max_in_collection(&mut *conn, slug, None).await?;
            if max <= 0.0 {
                return Ok(Vec::new());
            }

            let mut ids = Vec::with_capacity(count);
            for r in draw_points(max, count) {
                let id: Option<i64> = sqlx::query_scalar(
                    r#"
                    SELECT trackid FROM collection_track
                    WHERE collectionslug = ? AND cum_weighting > ?
                    ORDER BY cum_weighting ASC LIMIT 1
                    "#,
                )
                .bind(slug)
                .bind(r)
                .fetch_optional(&mut *conn)
                .await?;
                ids.extend(id);
            }
            ids
        };

        self.load_tracks(&ids).await
    }
}
