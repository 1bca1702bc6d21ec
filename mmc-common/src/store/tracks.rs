//! Single-track writes, deletes and bulk updates
//!
//! All writes funnel through [`apply_track_delta`], which runs inside the
//! caller's transaction. Bulk updates call it once per matched track with a
//! fresh transaction each time, so no cross-track snapshot is held.

use super::search::TrackFilter;
use super::tags::{delete_all_tags, delete_tag, load_tags, upsert_tag};
use super::weighting::{append_to_collection, remove_from_collection, set_weighting_in};
use super::{non_empty, validate_weighting, Store};
use crate::db::models::{CollectionSummary, Track, TrackDelta, TrackField};
use crate::events::{Action, CatalogEvent};
use crate::pagination::{PageRequest, Pagination};
use crate::{Error, Result};
use chrono::{SecondsFormat, Utc};
use sqlx::{Row, SqliteConnection};
use std::collections::{BTreeSet, HashMap};
use tracing::{debug, info};

/// How a single-track write treats a missing target
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteMode {
    /// Create the track when nothing matches
    Put,
    /// Fail with NotFound when nothing matches
    Patch,
}

/// Result of a single-track write
#[derive(Debug, Clone)]
pub struct UpsertOutcome {
    pub track: Track,
    pub action: Action,
}

/// Result of a bulk update
#[derive(Debug, Clone)]
pub struct BulkOutcome {
    /// Matched tracks as they are after the update
    pub tracks: Vec<Track>,
    /// Total matches across all pages
    pub total: i64,
    pub pagination: Pagination,
    /// How many tracks actually changed
    pub changed: usize,
}

impl BulkOutcome {
    pub fn action(&self) -> Action {
        if self.changed > 0 {
            Action::TracksUpdated
        } else {
            Action::NoChange
        }
    }
}

/// Read one track with its tags and memberships
pub(crate) async fn load_track(conn: &mut SqliteConnection, id: i64) -> Result<Option<Track>> {
    let row = sqlx::query(
        "SELECT id, fingerprint, url, duration, weighting FROM track WHERE id = ?",
    )
    .bind(id)
    .fetch_optional(&mut *conn)
    .await?;

    let Some(row) = row else {
        return Ok(None);
    };

    let tags = load_tags(conn, id).await?;
    let collections: Vec<(String, String, String)> = sqlx::query_as(
        r#"
        SELECT c.slug, c.name, c.icon FROM collection_track ct
        JOIN collection c ON c.slug = ct.collectionslug
        WHERE ct.trackid = ?
        ORDER BY c.slug
        "#,
    )
    .bind(id)
    .fetch_all(&mut *conn)
    .await?;

    Ok(Some(Track {
        fingerprint: row.get::<Option<String>, _>("fingerprint").unwrap_or_default(),
        duration: row.get("duration"),
        url: row.get::<Option<String>, _>("url").unwrap_or_default(),
        id: row.get("id"),
        tags,
        weighting: row.get("weighting"),
        collections: collections
            .into_iter()
            .map(|(slug, name, icon)| CollectionSummary { slug, name, icon })
            .collect(),
    }))
}

/// Id of the track whose `field` equals `value`
async fn find_by_field(
    conn: &mut SqliteConnection,
    field: TrackField,
    value: &str,
) -> Result<Option<i64>> {
    let id = match field {
        TrackField::Id => {
            let id = parse_track_id(value)?;
            sqlx::query_scalar("SELECT id FROM track WHERE id = ?")
                .bind(id)
                .fetch_optional(&mut *conn)
                .await?
        }
        TrackField::Url | TrackField::Fingerprint => {
            let sql = format!("SELECT id FROM track WHERE {} = ?", field.column());
            sqlx::query_scalar(&sql)
                .bind(value)
                .fetch_optional(&mut *conn)
                .await?
        }
    };
    Ok(id)
}

fn parse_track_id(value: &str) -> Result<i64> {
    match value.trim().parse::<i64>() {
        Ok(id) if id > 0 => Ok(id),
        _ => Err(Error::InvalidInput(format!("invalid track id {:?}", value))),
    }
}

/// Fail if a track other than `self_id` already holds `value` in `field`
async fn ensure_unique(
    conn: &mut SqliteConnection,
    field: TrackField,
    value: &str,
    self_id: Option<i64>,
) -> Result<()> {
    let sql = format!("SELECT id FROM track WHERE {} = ? AND id != ?", field.column());
    let other: Option<i64> = sqlx::query_scalar(&sql)
        .bind(value)
        .bind(self_id.unwrap_or(-1))
        .fetch_optional(&mut *conn)
        .await?;

    match other {
        Some(other_track) => Err(Error::DuplicateTrack {
            other_track,
            attribute: field.column().to_string(),
        }),
        None => Ok(()),
    }
}

/// Apply a delta to the track matched by `field = value`
///
/// Returns the affected track id and the resulting action.
pub(crate) async fn apply_track_delta(
    conn: &mut SqliteConnection,
    field: TrackField,
    value: &str,
    delta: TrackDelta,
    only_missing: bool,
    mode: WriteMode,
) -> Result<(i64, Action)> {
    if let Some(weighting) = delta.weighting {
        validate_weighting(weighting)?;
    }
    if let Some(duration) = delta.duration {
        if duration < 0 {
            return Err(Error::InvalidInput("duration must not be negative".to_string()));
        }
    }

    match find_by_field(conn, field, value).await? {
        Some(id) => update_track(conn, id, delta, only_missing).await,
        None if mode == WriteMode::Patch => {
            Err(Error::NotFound(format!("track with {} {}", field, value)))
        }
        None => insert_track(conn, field, value, delta).await,
    }
}

async fn insert_track(
    conn: &mut SqliteConnection,
    field: TrackField,
    value: &str,
    mut delta: TrackDelta,
) -> Result<(i64, Action)> {
    let explicit_id = match field {
        TrackField::Id => Some(parse_track_id(value)?),
        TrackField::Url => {
            delta.url = Some(value.to_string());
            None
        }
        TrackField::Fingerprint => {
            delta.fingerprint = Some(value.to_string());
            None
        }
    };
    if let (Some(id), Some(requested)) = (explicit_id, delta.id) {
        if id != requested {
            return Err(Error::InvalidInput("trackid does not match path".to_string()));
        }
    }
    if let Some(id) = explicit_id {
        // Ids of deleted tracks stay retired
        let highest: Option<i64> =
            sqlx::query_scalar("SELECT seq FROM sqlite_sequence WHERE name = 'track'")
                .fetch_optional(&mut *conn)
                .await?;
        if highest.is_some_and(|seq| id <= seq) {
            return Err(Error::InvalidInput(format!(
                "track id {} was already used and cannot be reassigned",
                id
            )));
        }
    }

    let fingerprint = delta.fingerprint.as_deref().and_then(non_empty);
    let url = delta.url.as_deref().and_then(non_empty);
    if fingerprint.is_none() && url.is_none() {
        return Err(Error::InvalidInput(
            "a new track needs a fingerprint or a url".to_string(),
        ));
    }
    let duration = match delta.duration {
        Some(d) if d > 0 => d,
        _ => {
            return Err(Error::InvalidInput(
                "a new track needs a positive duration".to_string(),
            ))
        }
    };

    if let Some(fingerprint) = fingerprint {
        ensure_unique(conn, TrackField::Fingerprint, fingerprint, None).await?;
    }
    if let Some(url) = url {
        ensure_unique(conn, TrackField::Url, url, None).await?;
    }

    let id: i64 = sqlx::query_scalar(
        r#"
        INSERT INTO track (id, fingerprint, url, duration, weighting, cum_weighting)
        VALUES (?, ?, ?, ?, 0, 0)
        RETURNING id
        "#,
    )
    .bind(explicit_id)
    .bind(fingerprint)
    .bind(url)
    .bind(duration)
    .fetch_one(&mut *conn)
    .await?;

    if let Some(weighting) = delta.weighting {
        set_weighting_in(conn, id, weighting).await?;
    }

    let mut has_added = false;
    for (predicate, tag_value) in delta.tags.iter().flatten() {
        if let Some(tag_value) = tag_value.as_deref().and_then(non_empty) {
            upsert_tag(conn, id, predicate, tag_value).await?;
            has_added |= predicate == "added";
        }
    }
    if !has_added {
        let now = Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true);
        upsert_tag(conn, id, "added", &now).await?;
    }

    for collection in delta.collections.iter().flatten() {
        append_to_collection(conn, &collection.slug, id).await?;
    }

    info!("Added track {}", id);
    Ok((id, Action::TrackAdded))
}

async fn update_track(
    conn: &mut SqliteConnection,
    id: i64,
    delta: TrackDelta,
    only_missing: bool,
) -> Result<(i64, Action)> {
    let current = load_track(conn, id)
        .await?
        .ok_or_else(|| Error::Internal(format!("track {} vanished mid-transaction", id)))?;
    let mut changed = false;

    if let Some(requested) = delta.id {
        if requested != id {
            return Err(Error::InvalidInput("trackid cannot be changed".to_string()));
        }
    }

    for (field, new_value, old_value) in [
        (TrackField::Fingerprint, &delta.fingerprint, &current.fingerprint),
        (TrackField::Url, &delta.url, &current.url),
    ] {
        let Some(new_value) = new_value.as_deref().and_then(non_empty) else {
            continue;
        };
        if new_value == old_value.as_str() {
            continue;
        }
        ensure_unique(conn, field, new_value, Some(id)).await?;
        let sql = format!("UPDATE track SET {} = ? WHERE id = ?", field.column());
        sqlx::query(&sql)
            .bind(new_value)
            .bind(id)
            .execute(&mut *conn)
            .await?;
        changed = true;
    }

    if let Some(duration) = delta.duration.filter(|d| *d > 0) {
        if duration != current.duration {
            sqlx::query("UPDATE track SET duration = ? WHERE id = ?")
                .bind(duration)
                .bind(id)
                .execute(&mut *conn)
                .await?;
            changed = true;
        }
    }

    if let Some(weighting) = delta.weighting {
        changed |= set_weighting_in(conn, id, weighting).await?;
    }

    for (predicate, new_value) in delta.tags.iter().flatten() {
        let existing = current.tags.get(predicate);
        if only_missing && existing.is_some() {
            continue;
        }
        match new_value.as_deref().and_then(non_empty) {
            Some(new_value) => {
                if existing.map(String::as_str) != Some(new_value) {
                    upsert_tag(conn, id, predicate, new_value).await?;
                    changed = true;
                }
            }
            None => {
                if existing.is_some() {
                    changed |= delete_tag(conn, id, predicate).await?;
                }
            }
        }
    }

    if let Some(desired) = &delta.collections {
        let desired: BTreeSet<&str> = desired.iter().map(|c| c.slug.as_str()).collect();
        let current_slugs: BTreeSet<&str> =
            current.collections.iter().map(|c| c.slug.as_str()).collect();

        for slug in desired.difference(&current_slugs) {
            changed |= append_to_collection(conn, slug, id).await?;
        }
        for slug in current_slugs.difference(&desired) {
            changed |= remove_from_collection(conn, slug, id).await?;
        }
    }

    if changed {
        debug!("Updated track {}", id);
        Ok((id, Action::TrackUpdated))
    } else {
        Ok((id, Action::NoChange))
    }
}

impl Store {
    pub async fn get_track(&self, id: i64) -> Result<Track> {
        let mut conn = self.read_conn().await?;
        load_track(&mut conn, id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("track {}", id)))
    }

    /// Look a track up by id, url or fingerprint
    pub async fn get_track_by_field(&self, field: TrackField, value: &str) -> Result<Track> {
        let mut conn = self.read_conn().await?;
        let id = find_by_field(&mut conn, field, value)
            .await?
            .ok_or_else(|| Error::NotFound(format!("track with {} {}", field, value)))?;
        load_track(&mut conn, id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("track {}", id)))
    }

    /// Load tracks in the given order, skipping ids that no longer exist
    ///
    /// Repeated ids yield repeated tracks.
    pub(crate) async fn load_tracks(&self, ids: &[i64]) -> Result<Vec<Track>> {
        let mut conn = self.read_conn().await?;
        let mut cache: HashMap<i64, Track> = HashMap::new();
        let mut tracks = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(track) = cache.get(id) {
                tracks.push(track.clone());
                continue;
            }
            if let Some(track) = load_track(&mut conn, *id).await? {
                cache.insert(*id, track.clone());
                tracks.push(track);
            }
        }
        Ok(tracks)
    }

    /// Create or update the track identified by `field = value`
    ///
    /// With `only_missing`, tags the track already has are left alone.
    /// `noChange` publishes no event.
    pub async fn upsert_track_by_field(
        &self,
        field: TrackField,
        value: &str,
        delta: TrackDelta,
        only_missing: bool,
        mode: WriteMode,
    ) -> Result<UpsertOutcome> {
        let mut writer = self.begin_write().await?;
        let (id, action) =
            apply_track_delta(writer.conn(), field, value, delta, only_missing, mode).await?;
        let track = load_track(writer.conn(), id)
            .await?
            .ok_or_else(|| Error::Internal(format!("track {} missing after write", id)))?;
        writer.commit().await?;

        if action != Action::NoChange {
            self.publish(CatalogEvent::for_track(action, track.clone()));
        }
        Ok(UpsertOutcome { track, action })
    }

    /// Delete a track, keeping every weighting index compact
    ///
    /// The weighting is zeroed first, then tags and memberships are removed,
    /// then the row itself.
    pub async fn delete_track(&self, id: i64) -> Result<Track> {
        let mut writer = self.begin_write().await?;
        let conn = writer.conn();

        let snapshot = load_track(conn, id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("track {}", id)))?;

        set_weighting_in(conn, id, 0.0).await?;
        delete_all_tags(conn, id).await?;
        for collection in &snapshot.collections {
            remove_from_collection(conn, &collection.slug, id).await?;
        }
        sqlx::query("DELETE FROM track WHERE id = ?")
            .bind(id)
            .execute(&mut *conn)
            .await?;

        writer.commit().await?;
        info!("Deleted track {}", id);

        self.publish(CatalogEvent::for_track(Action::TrackDeleted, snapshot.clone()));
        Ok(snapshot)
    }

    /// Apply a tag/weighting/membership delta to every track matching `filter`
    ///
    /// Each matched track is updated in its own transaction. The delta may not
    /// touch id, url, fingerprint or duration.
    pub async fn bulk_update(
        &self,
        filter: &TrackFilter,
        page: PageRequest,
        delta: TrackDelta,
        only_missing: bool,
    ) -> Result<BulkOutcome> {
        if delta.touches_identity() {
            return Err(Error::InvalidInput(
                "bulk updates cannot change trackid, url, fingerprint or duration".to_string(),
            ));
        }

        let (ids, total, pagination) = self.matching_ids(filter, page).await?;

        let mut changed = 0;
        if !delta.is_empty() {
            for id in &ids {
                let mut writer = self.begin_write().await?;
                let result = apply_track_delta(
                    writer.conn(),
                    TrackField::Id,
                    &id.to_string(),
                    delta.clone(),
                    only_missing,
                    WriteMode::Patch,
                )
                .await;
                match result {
                    Ok((_, Action::NoChange)) => {}
                    Ok(_) => {
                        writer.commit().await?;
                        changed += 1;
                    }
                    // Deleted since the match; nothing to update
                    Err(Error::NotFound(_)) => {}
                    Err(e) => return Err(e),
                }
            }
        }

        if changed > 0 {
            info!("Bulk update changed {} of {} tracks", changed, ids.len());
            self.publish(CatalogEvent::tracks_updated(changed));
        }

        let tracks = self.load_tracks(&ids).await?;
        Ok(BulkOutcome {
            tracks,
            total,
            pagination,
            changed,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::models::CollectionRef;
    use crate::store::test_support::{add_track, cum_weighting, store};

    fn delta_json(json: &str) -> TrackDelta {
        serde_json::from_str(json).unwrap()
    }

    #[tokio::test]
    async fn test_put_twice_is_added_then_no_change() {
        let store = store().await;
        let delta = delta_json(r#"{"fingerprint":"f1","url":"http://example.org/t1","duration":7}"#);

        let first = store
            .upsert_track_by_field(TrackField::Id, "1", delta.clone(), false, WriteMode::Put)
            .await
            .unwrap();
        assert_eq!(first.action, Action::TrackAdded);
        assert_eq!(first.track.id, 1);
        assert!(first.track.tags.contains_key("added"));

        let second = store
            .upsert_track_by_field(TrackField::Id, "1", delta, false, WriteMode::Put)
            .await
            .unwrap();
        assert_eq!(second.action, Action::NoChange);
        assert_eq!(second.track, first.track);
    }

    #[tokio::test]
    async fn test_insert_by_url_uses_identifier() {
        let store = store().await;
        let outcome = store
            .upsert_track_by_field(
                TrackField::Url,
                "http://example.org/t1",
                delta_json(r#"{"fingerprint":"f1","duration":7}"#),
                false,
                WriteMode::Put,
            )
            .await
            .unwrap();

        assert_eq!(outcome.track.url, "http://example.org/t1");
        assert_eq!(outcome.track.fingerprint, "f1");
        assert_eq!(outcome.track.weighting, 0.0);

        let found = store
            .get_track_by_field(TrackField::Fingerprint, "f1")
            .await
            .unwrap();
        assert_eq!(found.id, outcome.track.id);
    }

    #[tokio::test]
    async fn test_supplied_added_tag_is_kept() {
        let store = store().await;
        let outcome = store
            .upsert_track_by_field(
                TrackField::Url,
                "http://example.org/t1",
                delta_json(r#"{"duration":7,"tags":{"added":"2020-01-01T00:00:00Z"}}"#),
                false,
                WriteMode::Put,
            )
            .await
            .unwrap();
        assert_eq!(outcome.track.tags["added"], "2020-01-01T00:00:00Z");
    }

    #[tokio::test]
    async fn test_insert_requires_duration() {
        let store = store().await;
        let result = store
            .upsert_track_by_field(
                TrackField::Url,
                "http://example.org/t1",
                delta_json(r#"{"fingerprint":"f1"}"#),
                false,
                WriteMode::Put,
            )
            .await;
        assert!(matches!(result, Err(Error::InvalidInput(_))));
    }

    #[tokio::test]
    async fn test_patch_missing_track_is_not_found() {
        let store = store().await;
        let result = store
            .upsert_track_by_field(
                TrackField::Id,
                "42",
                delta_json(r#"{"tags":{"title":"x"}}"#),
                false,
                WriteMode::Patch,
            )
            .await;
        assert!(matches!(result, Err(Error::NotFound(_))));
    }

    #[tokio::test]
    async fn test_duplicate_url_rejected_without_change() {
        let store = store().await;
        let t1 = add_track(&store, 1, 1.0).await;
        let t2 = add_track(&store, 2, 1.0).await;

        let result = store
            .upsert_track_by_field(
                TrackField::Id,
                &t2.id.to_string(),
                TrackDelta {
                    url: Some(t1.url.clone()),
                    tags: Some([("title".to_string(), Some("x".to_string()))].into()),
                    ..Default::default()
                },
                false,
                WriteMode::Patch,
            )
            .await;

        match result {
            Err(e @ Error::DuplicateTrack { .. }) => {
                assert_eq!(e.to_string(), format!("Duplicate: track {} has same url", t1.id));
            }
            other => panic!("expected duplicate error, got {:?}", other),
        }

        // The whole write rolled back
        let reread = store.get_track(t2.id).await.unwrap();
        assert_eq!(reread, t2);
    }

    #[tokio::test]
    async fn test_only_missing_keeps_existing_tags() {
        let store = store().await;
        let track = add_track(&store, 1, 0.0).await;
        let id = track.id.to_string();

        store
            .upsert_track_by_field(
                TrackField::Id,
                &id,
                TrackDelta::with_tags([("title", Some("Help"))]),
                false,
                WriteMode::Patch,
            )
            .await
            .unwrap();

        let outcome = store
            .upsert_track_by_field(
                TrackField::Id,
                &id,
                TrackDelta::with_tags([("title", Some("Yesterday")), ("artist", Some("Beatles"))]),
                true,
                WriteMode::Patch,
            )
            .await
            .unwrap();

        assert_eq!(outcome.action, Action::TrackUpdated);
        assert_eq!(outcome.track.tags["title"], "Help");
        assert_eq!(outcome.track.tags["artist"], "Beatles");
    }

    #[tokio::test]
    async fn test_empty_tag_value_deletes() {
        let store = store().await;
        let track = add_track(&store, 1, 0.0).await;
        let id = track.id.to_string();

        store
            .upsert_track_by_field(
                TrackField::Id,
                &id,
                TrackDelta::with_tags([("genre", Some("Rock"))]),
                false,
                WriteMode::Patch,
            )
            .await
            .unwrap();
        let outcome = store
            .upsert_track_by_field(
                TrackField::Id,
                &id,
                TrackDelta::with_tags([("genre", Some(""))]),
                false,
                WriteMode::Patch,
            )
            .await
            .unwrap();

        assert_eq!(outcome.action, Action::TrackUpdated);
        assert!(!outcome.track.tags.contains_key("genre"));
    }

    #[tokio::test]
    async fn test_empty_patch_emits_nothing() {
        let store = store().await;
        let track = add_track(&store, 1, 2.0).await;
        let mut rx = store.events().subscribe();

        let outcome = store
            .upsert_track_by_field(
                TrackField::Id,
                &track.id.to_string(),
                TrackDelta::default(),
                false,
                WriteMode::Patch,
            )
            .await
            .unwrap();

        assert_eq!(outcome.action, Action::NoChange);
        assert_eq!(outcome.track, track);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_trackid_cannot_change() {
        let store = store().await;
        let track = add_track(&store, 1, 0.0).await;
        let result = store
            .upsert_track_by_field(
                TrackField::Id,
                &track.id.to_string(),
                TrackDelta {
                    id: Some(track.id + 1),
                    ..Default::default()
                },
                false,
                WriteMode::Patch,
            )
            .await;
        assert!(matches!(result, Err(Error::InvalidInput(_))));
    }

    #[tokio::test]
    async fn test_collections_list_is_desired_set() {
        let store = store().await;
        let track = add_track(&store, 1, 2.0).await;
        store.create_or_rename_collection("a", "A", None).await.unwrap();
        store.create_or_rename_collection("b", "B", None).await.unwrap();
        let id = track.id.to_string();

        let set = |slugs: &[&str]| TrackDelta {
            collections: Some(
                slugs
                    .iter()
                    .map(|s| CollectionRef { slug: s.to_string() })
                    .collect(),
            ),
            ..Default::default()
        };

        let outcome = store
            .upsert_track_by_field(TrackField::Id, &id, set(&["a", "b"]), false, WriteMode::Patch)
            .await
            .unwrap();
        let slugs: Vec<_> = outcome.track.collections.iter().map(|c| c.slug.as_str()).collect();
        assert_eq!(slugs, vec!["a", "b"]);

        let outcome = store
            .upsert_track_by_field(TrackField::Id, &id, set(&["b"]), false, WriteMode::Patch)
            .await
            .unwrap();
        let slugs: Vec<_> = outcome.track.collections.iter().map(|c| c.slug.as_str()).collect();
        assert_eq!(slugs, vec!["b"]);

        let unknown = store
            .upsert_track_by_field(TrackField::Id, &id, set(&["nope"]), false, WriteMode::Patch)
            .await;
        assert!(matches!(unknown, Err(Error::NotFound(_))));
    }

    #[tokio::test]
    async fn test_delete_compacts_global_index() {
        let store = store().await;
        let t1 = add_track(&store, 1, 5.0).await;
        let t2 = add_track(&store, 2, 5.0).await;
        let t3 = add_track(&store, 3, 5.0).await;

        let deleted = store.delete_track(t2.id).await.unwrap();
        assert_eq!(deleted.id, t2.id);

        assert_eq!(cum_weighting(&store, t1.id).await, 5.0);
        assert_eq!(cum_weighting(&store, t3.id).await, 10.0);
        assert!(matches!(store.get_track(t2.id).await, Err(Error::NotFound(_))));
        assert!(matches!(store.delete_track(t2.id).await, Err(Error::NotFound(_))));
    }

    #[tokio::test]
    async fn test_ids_never_reused() {
        let store = store().await;
        let t1 = add_track(&store, 1, 0.0).await;
        let t2 = add_track(&store, 2, 0.0).await;
        store.delete_track(t2.id).await.unwrap();

        let t3 = add_track(&store, 3, 0.0).await;
        assert!(t3.id > t2.id);
        assert_eq!(store.get_track(t1.id).await.unwrap().id, t1.id);
    }

    #[tokio::test]
    async fn test_put_by_deleted_id_is_rejected() {
        let store = store().await;
        add_track(&store, 1, 0.0).await;
        let t2 = add_track(&store, 2, 0.0).await;
        store.delete_track(t2.id).await.unwrap();

        let delta = delta_json(r#"{"fingerprint":"f9","url":"http://example.org/t9","duration":7}"#);
        let result = store
            .upsert_track_by_field(
                TrackField::Id,
                &t2.id.to_string(),
                delta.clone(),
                false,
                WriteMode::Put,
            )
            .await;
        assert!(matches!(result, Err(Error::InvalidInput(_))));
        assert!(matches!(store.get_track(t2.id).await, Err(Error::NotFound(_))));

        let fresh = store
            .upsert_track_by_field(
                TrackField::Id,
                &(t2.id + 1).to_string(),
                delta,
                false,
                WriteMode::Put,
            )
            .await
            .unwrap();
        assert_eq!(fresh.action, Action::TrackAdded);
        assert_eq!(fresh.track.id, t2.id + 1);
    }

    #[tokio::test]
    async fn test_bulk_update_rejects_identity_fields() {
        let store = store().await;
        let result = store
            .bulk_update(
                &TrackFilter::Query(String::new()),
                PageRequest::All,
                delta_json(r#"{"url":"http://x"}"#),
                false,
            )
            .await;
        assert!(matches!(result, Err(Error::InvalidInput(_))));
    }

    #[tokio::test]
    async fn test_bulk_update_touches_only_matches() {
        let store = store().await;
        let mut ids = Vec::new();
        for n in 1..=5 {
            let track = add_track(&store, n, 1.0).await;
            let title = if n == 1 || n == 5 { "Yellow Submarine" } else { "Help" };
            store
                .upsert_track_by_field(
                    TrackField::Id,
                    &track.id.to_string(),
                    TrackDelta::with_tags([("title", Some(title))]),
                    false,
                    WriteMode::Patch,
                )
                .await
                .unwrap();
            ids.push(track.id);
        }
        let mut rx = store.events().subscribe();

        let filter =
            TrackFilter::Predicates(vec![("title".to_string(), "Yellow Submarine".to_string())]);
        let outcome = store
            .bulk_update(
                &filter,
                PageRequest::Number(1),
                TrackDelta::with_tags([("genre", Some("Maritime"))]),
                false,
            )
            .await
            .unwrap();

        assert_eq!(outcome.changed, 2);
        assert_eq!(outcome.action(), Action::TracksUpdated);
        let matched: Vec<i64> = outcome.tracks.iter().map(|t| t.id).collect();
        assert_eq!(matched, vec![ids[0], ids[4]]);
        assert!(outcome.tracks.iter().all(|t| t.tags["genre"] == "Maritime"));

        let untouched = store.get_track(ids[1]).await.unwrap();
        assert!(!untouched.tags.contains_key("genre"));

        let event = rx.try_recv().unwrap();
        assert_eq!(event.action, Action::TracksUpdated);
        assert!(rx.try_recv().is_err(), "bulk update emits a single event");
    }
}
