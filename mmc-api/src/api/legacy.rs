//! Removed pre-v2 endpoints

use axum::http::StatusCode;

/// Paths that moved under `/v2/`
pub const LEGACY_PREFIXES: &[&str] = &["/tracks", "/tags", "/predicates", "/globals", "/search"];

pub const GONE_BODY: &str = "This endpoint has been removed.  Use /v2/ instead.";

/// Any method on a legacy path
pub async fn gone() -> (StatusCode, &'static str) {
    (StatusCode::GONE, GONE_BODY)
}
