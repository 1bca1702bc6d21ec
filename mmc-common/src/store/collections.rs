//! Collections and membership
//!
//! Each collection is its own weighted set: membership rows carry a
//! per-collection `cum_weighting` maintained by the weighting module.

use super::weighting::{append_to_collection, remove_from_collection};
use super::Store;
use crate::db::models::{Collection, CollectionSummary, Track};
use crate::events::{Action, CatalogEvent};
use crate::pagination::{calculate_pagination, PageRequest};
use crate::{Error, Result};
use sqlx::SqliteConnection;
use tracing::info;

/// Slugs that name API routes rather than collections
pub const RESERVED_SLUGS: &[&str] = &["all", "new", "collection"];

/// Reject empty, reserved or path-breaking slugs
pub fn validate_slug(slug: &str) -> Result<()> {
    if slug.is_empty() {
        return Err(Error::InvalidInput("collection slug is empty".to_string()));
    }
    if RESERVED_SLUGS.contains(&slug) {
        return Err(Error::InvalidInput(format!("slug {:?} is reserved", slug)));
    }
    if slug.chars().any(|c| c.is_whitespace() || c == '/') {
        return Err(Error::InvalidInput(format!("invalid collection slug {:?}", slug)));
    }
    Ok(())
}

/// Outcome of removing a track from a collection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MembershipRemoval {
    Removed,
    NotInCollection,
}

async fn load_summary(conn: &mut SqliteConnection, slug: &str) -> Result<Option<CollectionSummary>> {
    let row: Option<(String, String, String)> =
        sqlx::query_as("SELECT slug, name, icon FROM collection WHERE slug = ?")
            .bind(slug)
            .fetch_optional(&mut *conn)
            .await?;
    Ok(row.map(|(slug, name, icon)| CollectionSummary { slug, name, icon }))
}

async fn ensure_track_exists(conn: &mut SqliteConnection, track_id: i64) -> Result<()> {
    let found: Option<i64> = sqlx::query_scalar("SELECT id FROM track WHERE id = ?")
        .bind(track_id)
        .fetch_optional(&mut *conn)
        .await?;
    if found.is_none() {
        return Err(Error::NotFound(format!("track {}", track_id)));
    }
    Ok(())
}

impl Store {
    /// Create a collection, or rename / re-icon an existing one
    ///
    /// `icon: None` leaves an existing icon alone.
    pub async fn create_or_rename_collection(
        &self,
        slug: &str,
        name: &str,
        icon: Option<&str>,
    ) -> Result<(CollectionSummary, Action)> {
        validate_slug(slug)?;
        let name = name.trim();
        if name.is_empty() {
            return Err(Error::InvalidInput("collection name is required".to_string()));
        }

        let mut writer = self.begin_write().await?;
        let conn = writer.conn();

        let clash: Option<String> =
            sqlx::query_scalar("SELECT slug FROM collection WHERE name = ? AND slug != ?")
                .bind(name)
                .bind(slug)
                .fetch_optional(&mut *conn)
                .await?;
        if let Some(other_slug) = clash {
            return Err(Error::DuplicateCollection { other_slug });
        }

        let (summary, action) = match load_summary(conn, slug).await? {
            None => {
                let icon = icon.unwrap_or_default();
                sqlx::query("INSERT INTO collection (slug, name, icon) VALUES (?, ?, ?)")
                    .bind(slug)
                    .bind(name)
                    .bind(icon)
                    .execute(&mut *conn)
                    .await?;
                info!("Created collection {}", slug);
                let summary = CollectionSummary {
                    slug: slug.to_string(),
                    name: name.to_string(),
                    icon: icon.to_string(),
                };
                (summary, Action::CollectionCreated)
            }
            Some(existing) => {
                let icon = icon.unwrap_or(&existing.icon).to_string();
                if existing.name == name && existing.icon == icon {
                    (existing, Action::NoChange)
                } else {
                    sqlx::query("UPDATE collection SET name = ?, icon = ? WHERE slug = ?")
                        .bind(name)
                        .bind(&icon)
                        .bind(slug)
                        .execute(&mut *conn)
                        .await?;
                    info!("Updated collection {}", slug);
                    let summary = CollectionSummary {
                        slug: slug.to_string(),
                        name: name.to_string(),
                        icon,
                    };
                    (summary, Action::CollectionUpdated)
                }
            }
        };

        writer.commit().await?;
        if action != Action::NoChange {
            self.publish(CatalogEvent::for_collection(action, summary.clone()));
        }
        Ok((summary, action))
    }

    /// Delete a collection, removing each membership through the compacting path
    pub async fn delete_collection(&self, slug: &str) -> Result<CollectionSummary> {
        let mut writer = self.begin_write().await?;
        let conn = writer.conn();

        let summary = load_summary(conn, slug)
            .await?
            .ok_or_else(|| Error::NotFound(format!("collection {}", slug)))?;

        let members: Vec<i64> = sqlx::query_scalar(
            "SELECT trackid FROM collection_track WHERE collectionslug = ? ORDER BY trackid",
        )
        .bind(slug)
        .fetch_all(&mut *conn)
        .await?;
        for track_id in &members {
            remove_from_collection(conn, slug, *track_id).await?;
        }

        sqlx::query("DELETE FROM collection WHERE slug = ?")
            .bind(slug)
            .execute(&mut *conn)
            .await?;

        writer.commit().await?;
        info!("Deleted collection {} ({} members)", slug, members.len());

        self.publish(CatalogEvent::for_collection(
            Action::CollectionDeleted,
            summary.clone(),
        ));
        Ok(summary)
    }

    /// Add a track to a collection; adding an existing member is `noChange`
    pub async fn add_track_to_collection(&self, slug: &str, track_id: i64) -> Result<Action> {
        let mut writer = self.begin_write().await?;
        let added = append_to_collection(writer.conn(), slug, track_id).await?;
        if !added {
            return Ok(Action::NoChange);
        }
        let track = super::tracks::load_track(writer.conn(), track_id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("track {}", track_id)))?;
        writer.commit().await?;

        self.publish(CatalogEvent::for_track(Action::TrackUpdated, track));
        Ok(Action::TrackUpdated)
    }

    /// Remove a track from a collection
    ///
    /// A track that exists but is not a member is a successful
    /// [`MembershipRemoval::NotInCollection`].
    pub async fn remove_track_from_collection(
        &self,
        slug: &str,
        track_id: i64,
    ) -> Result<MembershipRemoval> {
        let mut writer = self.begin_write().await?;
        let conn = writer.conn();

        if load_summary(conn, slug).await?.is_none() {
            return Err(Error::NotFound(format!("collection {}", slug)));
        }
        ensure_track_exists(conn, track_id).await?;

        if !remove_from_collection(conn, slug, track_id).await? {
            return Ok(MembershipRemoval::NotInCollection);
        }
        let track = super::tracks::load_track(conn, track_id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("track {}", track_id)))?;
        writer.commit().await?;

        self.publish(CatalogEvent::for_track(Action::TrackUpdated, track));
        Ok(MembershipRemoval::Removed)
    }

    /// Every collection, by slug, each with all of its member tracks
    pub async fn list_collections(&self) -> Result<Vec<Collection>> {
        let summaries: Vec<(String, String, String)> = {
            let mut conn = self.read_conn().await?;
            sqlx::query_as("SELECT slug, name, icon FROM collection ORDER BY slug")
                .fetch_all(&mut *conn)
                .await?
        };

        let mut collections = Vec::with_capacity(summaries.len());
        for (slug, name, icon) in summaries {
            let ids = self.member_ids(&slug, PageRequest::All).await?;
            let tracks = self.load_tracks(&ids).await?;
            collections.push(Collection {
                slug,
                name,
                icon,
                total_tracks: tracks.len() as i64,
                tracks,
                total_pages: None,
            });
        }
        Ok(collections)
    }

    /// One collection with a page of its member tracks, ordered by id
    pub async fn get_collection(&self, slug: &str, page: PageRequest) -> Result<Collection> {
        let (summary, total) = {
            let mut conn = self.read_conn().await?;
            let summary = load_summary(&mut conn, slug)
                .await?
                .ok_or_else(|| Error::NotFound(format!("collection {}", slug)))?;
            let total: i64 =
                sqlx::query_scalar("SELECT COUNT(*) FROM collection_track WHERE collectionslug = ?")
                    .bind(slug)
                    .fetch_one(&mut *conn)
                    .await?;
            (summary, total)
        };

        let ids = self.member_ids(slug, page).await?;
        let tracks = self.load_tracks(&ids).await?;
        let pagination = calculate_pagination(total, page);

        Ok(Collection {
            slug: summary.slug,
            name: summary.name,
            icon: summary.icon,
            total_tracks: total,
            tracks,
            total_pages: Some(pagination.total_pages),
        })
    }

    /// A member track of a collection
    pub async fn collection_track(&self, slug: &str, track_id: i64) -> Result<Track> {
        {
            let mut conn = self.read_conn().await?;
            if load_summary(&mut conn, slug).await?.is_none() {
                return Err(Error::NotFound(format!("collection {}", slug)));
            }
            let member: Option<i64> = sqlx::query_scalar(
                "SELECT trackid FROM collection_track WHERE collectionslug = ? AND trackid = ?",
            )
            .bind(slug)
            .bind(track_id)
            .fetch_optional(&mut *conn)
            .await?;
            if member.is_none() {
                return Err(Error::NotFound(format!(
                    "track {} in collection {}",
                    track_id, slug
                )));
            }
        }
        self.get_track(track_id).await
    }

    async fn member_ids(&self, slug: &str, page: PageRequest) -> Result<Vec<i64>> {
        let mut conn = self.read_conn().await?;
        let ids = match page.limit_offset() {
            Some((limit, offset)) => {
                sqlx::query_scalar(
                    r#"
                    SELECT trackid FROM collection_track WHERE collectionslug = ?
                    ORDER BY trackid LIMIT ? OFFSET ?
                    "#,
                )
                .bind(slug)
                .bind(limit)
                .bind(offset)
                .fetch_all(&mut *conn)
                .await?
            }
            None => {
                sqlx::query_scalar(
                    "SELECT trackid FROM collection_track WHERE collectionslug = ? ORDER BY trackid",
                )
                .bind(slug)
                .fetch_all(&mut *conn)
                .await?
            }
        };
        Ok(ids)
    }
}
