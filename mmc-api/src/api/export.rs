//! GET /v2/export - serve the file written by mmc-export

use axum::{
    extract::State,
    http::header,
    response::{IntoResponse, Response},
};
use mmc_common::rdf::RdfFormat;
use tracing::warn;

use crate::{ApiError, ApiResult, AppState};

pub async fn get_export(State(state): State<AppState>) -> ApiResult<Response> {
    let content = match tokio::fs::read(&state.export_path).await {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(ApiError::NotFound(
                "Export has not been generated yet".to_string(),
            ));
        }
        Err(e) => {
            warn!("Failed to read export {}: {}", state.export_path.display(), e);
            return Err(ApiError::Internal(format!("Failed to read export: {}", e)));
        }
    };

    let format = RdfFormat::from_extension(&state.export_path);
    Ok(([(header::CONTENT_TYPE, format.content_type())], content).into_response())
}
