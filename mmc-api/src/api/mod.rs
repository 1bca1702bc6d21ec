//! HTTP handlers for mmc-api

pub mod auth;
pub mod collections;
pub mod export;
pub mod info;
pub mod legacy;
pub mod negotiate;
pub mod tags;
pub mod tracks;
pub mod weighting;

use crate::{ApiError, ApiResult};
use axum::body::Bytes;
use axum::http::{header, HeaderMap, HeaderName};
use axum::response::Redirect;
use mmc_common::events::Action;
use serde::de::DeserializeOwned;
use std::future::{ready, Ready};

/// Response header carrying the outcome of a write
pub const TRACK_ACTION: HeaderName = HeaderName::from_static("track-action");

/// Number of weighted samples returned by the random endpoints
pub const RANDOM_SAMPLE_SIZE: usize = 20;

/// `Track-Action` header for a response
pub fn action_header(action: Action) -> [(HeaderName, &'static str); 1] {
    [(TRACK_ACTION, action.as_str())]
}

/// Method fallback answering 405 with the permitted methods
pub fn not_allowed(allow: &'static str) -> impl Fn() -> Ready<ApiError> + Clone + Send + Sync + 'static {
    move || ready(ApiError::MethodNotAllowed(allow))
}

/// GET /
pub async fn root_redirect() -> Redirect {
    Redirect::to("/v2/tracks")
}

/// `If-None-Match: *` switches writes to only-missing tags
pub fn only_missing(headers: &HeaderMap) -> bool {
    headers
        .get(header::IF_NONE_MATCH)
        .and_then(|v| v.to_str().ok())
        .map_or(false, |v| v.trim() == "*")
}

/// Parse a JSON request body; an empty body is the type's default
pub fn json_body<T: DeserializeOwned + Default>(body: &Bytes) -> ApiResult<T> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(T::default());
    }
    serde_json::from_slice(body).map_err(|e| ApiError::BadRequest(format!("Invalid JSON: {}", e)))
}

/// Numeric track id from a path segment
pub fn parse_track_id(raw: &str) -> ApiResult<i64> {
    raw.trim()
        .parse::<i64>()
        .ok()
        .filter(|id| *id > 0)
        .ok_or_else(|| ApiError::BadRequest(format!("Invalid track id {:?}", raw)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_only_missing_header() {
        let mut headers = HeaderMap::new();
        assert!(!only_missing(&headers));
        headers.insert(header::IF_NONE_MATCH, HeaderValue::from_static("*"));
        assert!(only_missing(&headers));
        headers.insert(header::IF_NONE_MATCH, HeaderValue::from_static("\"abc\""));
        assert!(!only_missing(&headers));
    }

    #[test]
    fn test_json_body() {
        let empty: serde_json::Map<String, serde_json::Value> = json_body(&Bytes::new()).unwrap();
        assert!(empty.is_empty());
        let bad: ApiResult<serde_json::Map<String, serde_json::Value>> =
            json_body(&Bytes::from_static(b"{nope"));
        assert!(matches!(bad, Err(ApiError::BadRequest(_))));
    }

    #[test]
    fn test_parse_track_id() {
        assert_eq!(parse_track_id("12").unwrap(), 12);
        assert!(parse_track_id("0").is_err());
        assert!(parse_track_id("abc").is_err());
    }
}
