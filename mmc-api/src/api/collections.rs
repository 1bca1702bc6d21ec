//! Collection endpoints

use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use mmc_common::db::{Collection, Track};
use mmc_common::events::Action;
use mmc_common::pagination::PageRequest;
use mmc_common::store::MembershipRemoval;
use serde::Deserialize;

use super::tracks::RandomTracks;
use super::{action_header, json_body, parse_track_id, RANDOM_SAMPLE_SIZE};
use crate::{ApiError, ApiResult, AppState};

#[derive(Debug, Default, Deserialize)]
pub struct PageParams {
    pub page: Option<String>,
}

/// Body of PUT /v2/collections/{slug}
#[derive(Debug, Default, Deserialize)]
pub struct CollectionBody {
    pub name: Option<String>,
    pub icon: Option<String>,
}

/// GET /v2/collections
pub async fn list_collections(State(state): State<AppState>) -> ApiResult<Json<Vec<Collection>>> {
    Ok(Json(state.store.list_collections().await?))
}

/// GET /v2/collections/{slug}?page=n
pub async fn get_collection(
    State(state): State<AppState>,
    Path(slug): Path<String>,
    Query(params): Query<PageParams>,
) -> ApiResult<Json<Collection>> {
    let page = PageRequest::parse(params.page.as_deref());
    Ok(Json(state.store.get_collection(&slug, page).await?))
}

/// PUT /v2/collections/{slug} - create, rename or change the icon
pub async fn put_collection(
    State(state): State<AppState>,
    Path(slug): Path<String>,
    body: Bytes,
) -> ApiResult<Response> {
    let body: CollectionBody = json_body(&body)?;
    let name = body
        .name
        .ok_or_else(|| ApiError::BadRequest("Missing fields: name".to_string()))?;

    let (summary, action) = state
        .store
        .create_or_rename_collection(&slug, &name, body.icon.as_deref())
        .await?;
    Ok((action_header(action), Json(summary)).into_response())
}

/// DELETE /v2/collections/{slug}
pub async fn delete_collection(
    State(state): State<AppState>,
    Path(slug): Path<String>,
) -> ApiResult<Response> {
    state.store.delete_collection(&slug).await?;
    Ok((StatusCode::NO_CONTENT, action_header(Action::CollectionDeleted)).into_response())
}

/// GET /v2/collections/{slug}/random
pub async fn random_collection_tracks(
    State(state): State<AppState>,
    Path(slug): Path<String>,
) -> ApiResult<Json<RandomTracks>> {
    let tracks = state
        .store
        .sample_collection(&slug, RANDOM_SAMPLE_SIZE)
        .await?;
    Ok(Json(RandomTracks { tracks }))
}

/// GET /v2/collections/{slug}/{trackId}
pub async fn get_member(
    State(state): State<AppState>,
    Path((slug, track_id)): Path<(String, String)>,
) -> ApiResult<Json<Track>> {
    let track_id = parse_track_id(&track_id)?;
    Ok(Json(state.store.collection_track(&slug, track_id).await?))
}

/// PUT /v2/collections/{slug}/{trackId}
pub async fn add_member(
    State(state): State<AppState>,
    Path((slug, track_id)): Path<(String, String)>,
) -> ApiResult<Response> {
    let track_id = parse_track_id(&track_id)?;
    let action = state.store.add_track_to_collection(&slug, track_id).await?;
    let track = state.store.get_track(track_id).await?;
    Ok((action_header(action), Json(track)).into_response())
}

/// DELETE /v2/collections/{slug}/{trackId}
///
/// Removing a track that isn't a member succeeds with `Not In Collection`.
pub async fn remove_member(
    State(state): State<AppState>,
    Path((slug, track_id)): Path<(String, String)>,
) -> ApiResult<Response> {
    let track_id = parse_track_id(&track_id)?;
    let response = match state
        .store
        .remove_track_from_collection(&slug, track_id)
        .await?
    {
        MembershipRemoval::Removed => {
            (StatusCode::NO_CONTENT, action_header(Action::TrackUpdated)).into_response()
        }
        MembershipRemoval::NotInCollection => (
            StatusCode::OK,
            action_header(Action::NoChange),
            [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
            "Not In Collection",
        )
            .into_response(),
    };
    Ok(response)
}
