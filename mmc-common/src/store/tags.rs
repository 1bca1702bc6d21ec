//! Predicates and tags
//!
//! Predicates are created lazily the first time a tag names them and are never
//! deleted. A tag is unique per (track, predicate); writing an empty value
//! deletes it.

use super::Store;
use crate::db::models::TagRow;
use crate::{Error, Result};
use sqlx::{Row, SqliteConnection};
use std::collections::BTreeMap;

/// Predicate ids are short identifiers: letters, digits, `_` and `-`
pub fn validate_predicate(predicate: &str) -> Result<()> {
    if predicate.is_empty()
        || !predicate
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
    {
        return Err(Error::InvalidInput(format!("invalid predicate {:?}", predicate)));
    }
    Ok(())
}

pub(crate) async fn ensure_predicate(conn: &mut SqliteConnection, predicate: &str) -> Result<()> {
    validate_predicate(predicate)?;
    sqlx::query("INSERT OR IGNORE INTO predicate (id) VALUES (?)")
        .bind(predicate)
        .execute(&mut *conn)
        .await?;
    Ok(())
}

/// Insert or replace one tag
pub(crate) async fn upsert_tag(
    conn: &mut SqliteConnection,
    track_id: i64,
    predicate: &str,
    value: &str,
) -> Result<()> {
    ensure_predicate(conn, predicate).await?;
    sqlx::query(
        r#"
        INSERT INTO tag (trackid, predicateid, value) VALUES (?, ?, ?)
        ON CONFLICT(trackid, predicateid) DO UPDATE SET value = excluded.value
        "#,
    )
    .bind(track_id)
    .bind(predicate)
    .bind(value)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

pub(crate) async fn delete_tag(
    conn: &mut SqliteConnection,
    track_id: i64,
    predicate: &str,
) -> Result<bool> {
    let result = sqlx::query("DELETE FROM tag WHERE trackid = ? AND predicateid = ?")
        .bind(track_id)
        .bind(predicate)
        .execute(&mut *conn)
        .await?;
    Ok(result.rows_affected() > 0)
}

pub(crate) async fn delete_all_tags(conn: &mut SqliteConnection, track_id: i64) -> Result<()> {
    sqlx::query("DELETE FROM tag WHERE trackid = ?")
        .bind(track_id)
        .execute(&mut *conn)
        .await?;
    Ok(())
}

pub(crate) async fn load_tags(
    conn: &mut SqliteConnection,
    track_id: i64,
) -> Result<BTreeMap<String, String>> {
    let rows: Vec<(String, String)> =
        sqlx::query_as("SELECT predicateid, value FROM tag WHERE trackid = ?")
            .bind(track_id)
            .fetch_all(&mut *conn)
            .await?;
    Ok(rows.into_iter().collect())
}

impl Store {
    /// All predicate ids, alphabetically
    pub async fn list_predicates(&self) -> Result<Vec<String>> {
        let mut conn = self.read_conn().await?;
        let ids = sqlx::query_scalar("SELECT id FROM predicate ORDER BY id")
            .fetch_all(&mut *conn)
            .await?;
        Ok(ids)
    }

    /// One tag value of a track
    pub async fn get_tag(&self, track_id: i64, predicate: &str) -> Result<String> {
        let mut conn = self.read_conn().await?;
        let exists: Option<i64> = sqlx::query_scalar("SELECT id FROM track WHERE id = ?")
            .bind(track_id)
            .fetch_optional(&mut *conn)
            .await?;
        if exists.is_none() {
            return Err(Error::NotFound(format!("track {}", track_id)));
        }

        sqlx::query_scalar("SELECT value FROM tag WHERE trackid = ? AND predicateid = ?")
            .bind(track_id)
            .bind(predicate)
            .fetch_optional(&mut *conn)
            .await?
            .ok_or_else(|| Error::NotFound(format!("tag {} on track {}", predicate, track_id)))
    }

    /// Tag-joined track rows, ordered by track id then predicate
    ///
    /// `Some(id)` restricts the stream to one track.
    pub async fn tag_rows(&self, track_id: Option<i64>) -> Result<Vec<TagRow>> {
        let mut conn = self.read_conn().await?;
        let sql = format!(
            r#"
            SELECT t.id, t.fingerprint, t.url, t.duration, g.predicateid, g.value
            FROM track t
            LEFT JOIN tag g ON g.trackid = t.id
            {}
            ORDER BY t.id, g.predicateid
            "#,
            if track_id.is_some() { "WHERE t.id = ?" } else { "" }
        );

        let mut query = sqlx::query(&sql);
        if let Some(id) = track_id {
            query = query.bind(id);
        }
        let rows = query.fetch_all(&mut *conn).await?;

        Ok(rows
            .iter()
            .map(|row| TagRow {
                track_id: row.get(0),
                fingerprint: row.get::<Option<String>, _>(1).unwrap_or_default(),
                url: row.get::<Option<String>, _>(2).unwrap_or_default(),
                duration: row.get(3),
                predicate: row.get(4),
                value: row.get(5),
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::models::{TrackDelta, TrackField};
    use crate::store::test_support::{add_track, store};
    use crate::store::WriteMode;

    #[test]
    fn test_predicate_validation() {
        assert!(validate_predicate("title").is_ok());
        assert!(validate_predicate("mbid_artist").is_ok());
        assert!(validate_predicate("").is_err());
        assert!(validate_predicate("has space").is_err());
    }

    #[tokio::test]
    async fn test_predicates_created_lazily() {
        let store = store().await;
        let track = add_track(&store, 1, 0.0).await;

        store
            .upsert_track_by_field(
                TrackField::Id,
                &track.id.to_string(),
                TrackDelta::with_tags([("artist", Some("The Beatles"))]),
                false,
                WriteMode::Patch,
            )
            .await
            .unwrap();

        let predicates = store.list_predicates().await.unwrap();
        assert_eq!(predicates, vec!["added".to_string(), "artist".to_string()]);
        assert_eq!(store.get_tag(track.id, "artist").await.unwrap(), "The Beatles");
        assert!(matches!(
            store.get_tag(track.id, "genre").await,
            Err(Error::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_tag_rows_include_untagged_tracks() {
        let store = store().await;
        let track = add_track(&store, 1, 0.0).await;
        sqlx::query("DELETE FROM tag")
            .execute(store.pool())
            .await
            .unwrap();

        let rows = store.tag_rows(None).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].track_id, track.id);
        assert!(rows[0].predicate.is_none());
    }
}
