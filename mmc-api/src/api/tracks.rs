//! Track endpoints
//!
//! `/v2/tracks` is keyed by `?url=` / `?fingerprint=` for single tracks, or
//! filtered by `?q=` / `?p.<predicate>=` (with `?page=`) for listings and bulk
//! updates. `/v2/tracks/{id}` is keyed by track id.

use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use mmc_common::db::{Track, TrackDelta, TrackField};
use mmc_common::pagination::PageRequest;
use mmc_common::rdf::graph_from_rows;
use mmc_common::store::{TrackFilter, WriteMode};
use serde::Serialize;
use tracing::info;

use super::negotiate::preferred_rdf;
use super::{action_header, json_body, only_missing, parse_track_id, RANDOM_SAMPLE_SIZE};
use crate::{ApiError, ApiResult, AppState};

type Params = Query<Vec<(String, String)>>;

/// What a `/v2/tracks` query string addresses
#[derive(Debug, Clone, PartialEq)]
enum Target {
    Single(TrackField, String),
    Filter(TrackFilter, PageRequest),
}

fn parse_target(params: &[(String, String)]) -> ApiResult<Target> {
    let mut single = None;
    let mut query = None;
    let mut predicates = Vec::new();
    let mut page = None;

    for (key, value) in params {
        match key.as_str() {
            "url" => single = Some((TrackField::Url, value.clone())),
            "fingerprint" => single = Some((TrackField::Fingerprint, value.clone())),
            "q" => query = Some(value.clone()),
            "page" => page = Some(value.as_str()),
            other => match other.strip_prefix("p.") {
                Some(predicate) if !predicate.is_empty() => {
                    predicates.push((predicate.to_string(), value.clone()))
                }
                _ => {
                    return Err(ApiError::BadRequest(format!(
                        "Unknown parameter: {}",
                        other
                    )))
                }
            },
        }
    }
    let page = PageRequest::parse(page);

    match (single, query, predicates.is_empty()) {
        (Some((field, value)), None, true) => Ok(Target::Single(field, value)),
        (Some(_), _, _) => Err(ApiError::BadRequest(
            "url and fingerprint cannot be combined with q or p.* filters".to_string(),
        )),
        (None, Some(_), false) => Err(ApiError::BadRequest(
            "q cannot be combined with p.* filters".to_string(),
        )),
        (None, Some(q), true) => Ok(Target::Filter(TrackFilter::Query(q), page)),
        (None, None, false) => Ok(Target::Filter(TrackFilter::Predicates(predicates), page)),
        (None, None, true) => Ok(Target::Filter(TrackFilter::Query(String::new()), page)),
    }
}

/// Paginated track listing
#[derive(Debug, Serialize)]
pub struct TrackList {
    pub tracks: Vec<Track>,
    #[serde(rename = "totalTracks")]
    pub total_tracks: i64,
    pub page: i64,
    #[serde(rename = "totalPages")]
    pub total_pages: i64,
}

#[derive(Debug, Serialize)]
pub struct RandomTracks {
    pub tracks: Vec<Track>,
}

/// PUT must describe the whole track
fn require_put_fields(delta: &TrackDelta, keyed_by: TrackField) -> ApiResult<()> {
    let is_blank = |v: &Option<String>| v.as_deref().map_or(true, str::is_empty);

    let mut missing = Vec::new();
    if keyed_by != TrackField::Fingerprint && is_blank(&delta.fingerprint) {
        missing.push("fingerprint");
    }
    if keyed_by != TrackField::Url && is_blank(&delta.url) {
        missing.push("url");
    }
    if delta.duration.is_none() {
        missing.push("duration");
    }

    if missing.is_empty() {
        Ok(())
    } else {
        Err(ApiError::BadRequest(format!(
            "Missing fields: {}",
            missing.join(", ")
        )))
    }
}

/// JSON by default, Turtle or JSON-LD when the client prefers it
async fn single_track_response(
    state: &AppState,
    track: Track,
    headers: &HeaderMap,
) -> ApiResult<Response> {
    let accept = headers.get(header::ACCEPT).and_then(|v| v.to_str().ok());
    let Some(format) = preferred_rdf(accept) else {
        return Ok(Json(track).into_response());
    };

    let rows = state.store.tag_rows(Some(track.id)).await?;
    let graph = graph_from_rows(&rows, &state.rdf);
    Ok((
        [(header::CONTENT_TYPE, format.content_type())],
        format.render(&graph, &state.rdf),
    )
        .into_response())
}

async fn upsert(
    state: &AppState,
    field: TrackField,
    value: &str,
    headers: &HeaderMap,
    body: &Bytes,
    mode: WriteMode,
) -> ApiResult<Response> {
    let delta: TrackDelta = json_body(body)?;
    if mode == WriteMode::Put {
        require_put_fields(&delta, field)?;
    }

    let outcome = state
        .store
        .upsert_track_by_field(field, value, delta, only_missing(headers), mode)
        .await?;
    Ok((action_header(outcome.action), Json(outcome.track)).into_response())
}

/// GET /v2/tracks
pub async fn get_tracks(
    State(state): State<AppState>,
    Query(params): Params,
    headers: HeaderMap,
) -> ApiResult<Response> {
    match parse_target(&params)? {
        Target::Single(field, value) => {
            let track = state.store.get_track_by_field(field, &value).await?;
            single_track_response(&state, track, &headers).await
        }
        Target::Filter(filter, page) => {
            let result = state.store.search(&filter, page).await?;
            Ok(Json(TrackList {
                tracks: result.tracks,
                total_tracks: result.total,
                page: result.pagination.page,
                total_pages: result.pagination.total_pages,
            })
            .into_response())
        }
    }
}

/// PUT /v2/tracks?url=… or ?fingerprint=…
pub async fn put_tracks(
    State(state): State<AppState>,
    Query(params): Params,
    headers: HeaderMap,
    body: Bytes,
) -> ApiResult<Response> {
    match parse_target(&params)? {
        Target::Single(field, value) => {
            upsert(&state, field, &value, &headers, &body, WriteMode::Put).await
        }
        Target::Filter(..) => Err(ApiError::BadRequest(
            "PUT needs a url or fingerprint parameter".to_string(),
        )),
    }
}

/// PATCH /v2/tracks - single track by identifier, or bulk by filter
pub async fn patch_tracks(
    State(state): State<AppState>,
    Query(params): Params,
    headers: HeaderMap,
    body: Bytes,
) -> ApiResult<Response> {
    let targeted = params.iter().any(|(key, _)| {
        matches!(key.as_str(), "url" | "fingerprint" | "q") || key.starts_with("p.")
    });
    if !targeted {
        return Err(ApiError::BadRequest(
            "PATCH needs url, fingerprint, q or p.* parameters".to_string(),
        ));
    }

    match parse_target(&params)? {
        Target::Single(field, value) => {
            upsert(&state, field, &value, &headers, &body, WriteMode::Patch).await
        }
        Target::Filter(filter, page) => {
            let delta: TrackDelta = json_body(&body)?;
            let outcome = state
                .store
                .bulk_update(&filter, page, delta, only_missing(&headers))
                .await?;
            info!(
                "Bulk PATCH matched {} tracks, changed {}",
                outcome.total, outcome.changed
            );

            let action = outcome.action();
            Ok((
                action_header(action),
                Json(TrackList {
                    tracks: outcome.tracks,
                    total_tracks: outcome.total,
                    page: outcome.pagination.page,
                    total_pages: outcome.pagination.total_pages,
                }),
            )
                .into_response())
        }
    }
}

/// GET /v2/tracks/random
pub async fn random_tracks(State(state): State<AppState>) -> ApiResult<Json<RandomTracks>> {
    let tracks = state.store.sample_tracks(RANDOM_SAMPLE_SIZE).await?;
    Ok(Json(RandomTracks { tracks }))
}

/// GET /v2/tracks/{id}
pub async fn get_track(
    State(state): State<AppState>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> ApiResult<Response> {
    let id = parse_track_id(&id)?;
    let track = state.store.get_track(id).await?;
    single_track_response(&state, track, &headers).await
}

/// PUT /v2/tracks/{id}
pub async fn put_track(
    State(state): State<AppState>,
    Path(id): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> ApiResult<Response> {
    let id = parse_track_id(&id)?;
    upsert(&state, TrackField::Id, &id.to_string(), &headers, &body, WriteMode::Put).await
}

/// PATCH /v2/tracks/{id}
pub async fn patch_track(
    State(state): State<AppState>,
    Path(id): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> ApiResult<Response> {
    let id = parse_track_id(&id)?;
    upsert(&state, TrackField::Id, &id.to_string(), &headers, &body, WriteMode::Patch).await
}

/// DELETE /v2/tracks/{id}
pub async fn delete_track(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Response> {
    let id = parse_track_id(&id)?;
    state.store.delete_track(id).await?;
    Ok((
        StatusCode::NO_CONTENT,
        action_header(mmc_common::events::Action::TrackDeleted),
    )
        .into_response())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_parse_single_targets() {
        assert_eq!(
            parse_target(&params(&[("url", "http://x")])).unwrap(),
            Target::Single(TrackField::Url, "http://x".to_string())
        );
        assert_eq!(
            parse_target(&params(&[("fingerprint", "f1")])).unwrap(),
            Target::Single(TrackField::Fingerprint, "f1".to_string())
        );
    }

    #[test]
    fn test_parse_filters() {
        assert_eq!(
            parse_target(&params(&[("q", "test"), ("page", "2")])).unwrap(),
            Target::Filter(TrackFilter::Query("test".to_string()), PageRequest::Number(2))
        );
        assert_eq!(
            parse_target(&params(&[("p.title", "Help"), ("page", "all")])).unwrap(),
            Target::Filter(
                TrackFilter::Predicates(vec![("title".to_string(), "Help".to_string())]),
                PageRequest::All
            )
        );
        assert_eq!(
            parse_target(&[]).unwrap(),
            Target::Filter(TrackFilter::Query(String::new()), PageRequest::Number(1))
        );
    }

    #[test]
    fn test_parse_rejects_mixed_filters() {
        assert!(parse_target(&params(&[("url", "x"), ("q", "y")])).is_err());
        assert!(parse_target(&params(&[("q", "x"), ("p.title", "y")])).is_err());
    }

    #[test]
    fn test_parse_rejects_unknown_parameters() {
        assert!(matches!(
            parse_target(&params(&[("tittle", "x")])),
            Err(ApiError::BadRequest(_))
        ));
        assert!(parse_target(&params(&[("q", "x"), ("pg", "2")])).is_err());
        assert!(parse_target(&params(&[("p.", "x")])).is_err());
    }

    #[test]
    fn test_put_field_requirements() {
        let delta: TrackDelta = serde_json::from_str(r#"{"fingerprint":"f1","duration":7}"#).unwrap();
        assert!(require_put_fields(&delta, TrackField::Url).is_ok());
        assert!(require_put_fields(&delta, TrackField::Id).is_err());

        let delta: TrackDelta = serde_json::from_str(r#"{"url":"http://x"}"#).unwrap();
        match require_put_fields(&delta, TrackField::Fingerprint) {
            Err(ApiError::BadRequest(msg)) => assert_eq!(msg, "Missing fields: duration"),
            other => panic!("unexpected {:?}", other),
        }
    }
}
