//! Plain-text weighting endpoints

use axum::{
    extract::{Path, State},
    http::header,
    response::{IntoResponse, Response},
};

use super::{action_header, parse_track_id};
use crate::{ApiError, ApiResult, AppState};

const TEXT_PLAIN: &str = "text/plain; charset=utf-8";

/// GET /v2/tracks/{id}/weighting
pub async fn get_weighting(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Response> {
    let id = parse_track_id(&id)?;
    let weighting = state.store.get_weighting(id).await?;
    Ok(([(header::CONTENT_TYPE, TEXT_PLAIN)], weighting.to_string()).into_response())
}

/// PUT /v2/tracks/{id}/weighting
pub async fn put_weighting(
    State(state): State<AppState>,
    Path(id): Path<String>,
    body: String,
) -> ApiResult<Response> {
    let id = parse_track_id(&id)?;
    let weighting: f64 = body
        .trim()
        .parse()
        .map_err(|_| ApiError::BadRequest(format!("Weighting must be a number, got {:?}", body.trim())))?;

    let action = state.store.set_weighting(id, weighting).await?;
    let stored = state.store.get_weighting(id).await?;
    Ok((
        [(header::CONTENT_TYPE, TEXT_PLAIN)],
        action_header(action),
        stored.to_string(),
    )
        .into_response())
}
