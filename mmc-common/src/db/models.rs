//! Catalog models and transport shapes

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A catalogued audio track
///
/// Field order is the JSON field order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Track {
    /// Empty when the track has no fingerprint
    pub fingerprint: String,
    pub duration: i64,
    /// Empty when the track has no url
    pub url: String,
    #[serde(rename = "trackid")]
    pub id: i64,
    pub tags: BTreeMap<String, String>,
    pub weighting: f64,
    pub collections: Vec<CollectionSummary>,
}

/// Collection identity without its members
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectionSummary {
    pub slug: String,
    pub name: String,
    #[serde(default)]
    pub icon: String,
}

/// Collection with (a page of) its member tracks
#[derive(Debug, Clone, Serialize)]
pub struct Collection {
    pub slug: String,
    pub name: String,
    pub icon: String,
    #[serde(rename = "totalTracks")]
    pub total_tracks: i64,
    pub tracks: Vec<Track>,
    #[serde(rename = "totalPages", skip_serializing_if = "Option::is_none")]
    pub total_pages: Option<i64>,
}

/// Membership entry in a track delta; only the slug matters
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CollectionRef {
    pub slug: String,
}

/// Partial track supplied by a write
///
/// `None` leaves a field alone. A tag set to `null` or `""` is deleted. When
/// `collections` is present it is the desired membership set.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct TrackDelta {
    pub fingerprint: Option<String>,
    pub duration: Option<i64>,
    pub url: Option<String>,
    #[serde(rename = "trackid")]
    pub id: Option<i64>,
    pub tags: Option<BTreeMap<String, Option<String>>>,
    pub weighting: Option<f64>,
    pub collections: Option<Vec<CollectionRef>>,
}

impl TrackDelta {
    /// Delta touching only tags
    pub fn with_tags<I, K, V>(tags: I) -> Self
    where
        I: IntoIterator<Item = (K, Option<V>)>,
        K: Into<String>,
        V: Into<String>,
    {
        TrackDelta {
            tags: Some(
                tags.into_iter()
                    .map(|(k, v)| (k.into(), v.map(Into::into)))
                    .collect(),
            ),
            ..Default::default()
        }
    }

    /// True when the delta asks for nothing at all
    pub fn is_empty(&self) -> bool {
        self.fingerprint.is_none()
            && self.duration.is_none()
            && self.url.is_none()
            && self.id.is_none()
            && self.tags.as_ref().map_or(true, |t| t.is_empty())
            && self.weighting.is_none()
            && self.collections.is_none()
    }

    /// Base identity fields a bulk update may not touch
    pub fn touches_identity(&self) -> bool {
        self.id.is_some()
            || self.fingerprint.as_deref().map_or(false, |s| !s.is_empty())
            || self.url.as_deref().map_or(false, |s| !s.is_empty())
            || self.duration.map_or(false, |d| d != 0)
    }
}

/// Attribute a single-track write is keyed by
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackField {
    Id,
    Url,
    Fingerprint,
}

impl TrackField {
    pub fn column(&self) -> &'static str {
        match self {
            TrackField::Id => "id",
            TrackField::Url => "url",
            TrackField::Fingerprint => "fingerprint",
        }
    }
}

impl std::fmt::Display for TrackField {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.column())
    }
}

/// One row of the tag-joined track stream fed to the RDF renderer
///
/// Tracks without tags appear once with `predicate` and `value` unset.
#[derive(Debug, Clone, PartialEq)]
pub struct TagRow {
    pub track_id: i64,
    pub fingerprint: String,
    pub url: String,
    pub duration: i64,
    pub predicate: Option<String>,
    pub value: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_track_json_field_order() {
        let mut tags = BTreeMap::new();
        tags.insert("added".to_string(), "2024-01-01T00:00:00Z".to_string());
        let track = Track {
            fingerprint: "f1".to_string(),
            duration: 7,
            url: "http://example.org/t1".to_string(),
            id: 1,
            tags,
            weighting: 0.0,
            collections: vec![],
        };

        let json = serde_json::to_string(&track).unwrap();
        assert!(json.contains("\"trackid\":1,\"tags\":{\"added\":"));
    }

    #[test]
    fn test_delta_null_tag_means_delete() {
        let delta: TrackDelta =
            serde_json::from_str(r#"{"tags":{"genre":null,"title":"Help"}}"#).unwrap();
        let tags = delta.tags.unwrap();
        assert_eq!(tags.get("genre"), Some(&None));
        assert_eq!(tags.get("title"), Some(&Some("Help".to_string())));
    }

    #[test]
    fn test_delta_emptiness() {
        assert!(TrackDelta::default().is_empty());
        let delta: TrackDelta = serde_json::from_str(r#"{"tags":{}}"#).unwrap();
        assert!(delta.is_empty());
        let delta: TrackDelta = serde_json::from_str(r#"{"weighting":0}"#).unwrap();
        assert!(!delta.is_empty());
    }

    #[test]
    fn test_delta_identity_detection() {
        let delta: TrackDelta = serde_json::from_str(r#"{"url":"http://x"}"#).unwrap();
        assert!(delta.touches_identity());
        let delta: TrackDelta = serde_json::from_str(r#"{"tags":{"genre":"Maritime"}}"#).unwrap();
        assert!(!delta.touches_identity());
    }
}
