//! Single-tag and predicate endpoints

use axum::{
    extract::{Path, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use mmc_common::db::{TrackDelta, TrackField};
use mmc_common::store::tags::validate_predicate;
use mmc_common::store::WriteMode;

use super::{action_header, only_missing, parse_track_id};
use crate::{ApiResult, AppState};

/// GET /v2/predicates
pub async fn list_predicates(State(state): State<AppState>) -> ApiResult<Json<Vec<String>>> {
    Ok(Json(state.store.list_predicates().await?))
}

/// GET /v2/tracks/{id}/tags/{predicate}
pub async fn get_tag(
    State(state): State<AppState>,
    Path((id, predicate)): Path<(String, String)>,
) -> ApiResult<Response> {
    let id = parse_track_id(&id)?;
    let value = state.store.get_tag(id, &predicate).await?;
    Ok(([(header::CONTENT_TYPE, "text/plain; charset=utf-8")], value).into_response())
}

/// PUT /v2/tracks/{id}/tags/{predicate} - plain-text value; empty clears the tag
pub async fn put_tag(
    State(state): State<AppState>,
    Path((id, predicate)): Path<(String, String)>,
    headers: HeaderMap,
    body: String,
) -> ApiResult<Response> {
    let id = parse_track_id(&id)?;
    validate_predicate(&predicate)?;

    let value = body.trim_end_matches(&['\r', '\n'][..]);
    let delta = TrackDelta::with_tags([(predicate.as_str(), Some(value))]);
    let outcome = state
        .store
        .upsert_track_by_field(
            TrackField::Id,
            &id.to_string(),
            delta,
            only_missing(&headers),
            WriteMode::Patch,
        )
        .await?;
    Ok((action_header(outcome.action), Json(outcome.track)).into_response())
}

/// DELETE /v2/tracks/{id}/tags/{predicate}
pub async fn delete_tag(
    State(state): State<AppState>,
    Path((id, predicate)): Path<(String, String)>,
) -> ApiResult<Response> {
    let id = parse_track_id(&id)?;
    let delta = TrackDelta::with_tags([(predicate.as_str(), None::<&str>)]);
    let outcome = state
        .store
        .upsert_track_by_field(TrackField::Id, &id.to_string(), delta, false, WriteMode::Patch)
        .await?;
    Ok((StatusCode::NO_CONTENT, action_header(outcome.action)).into_response())
}
