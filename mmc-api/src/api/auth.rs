//! Authentication middleware for mmc-api
//!
//! Validates `Authorization: key <value>` against the client-key table and
//! records the caller's identity as a request extension.

use axum::{
    extract::{Request, State},
    http::header,
    middleware::Next,
    response::Response,
};
use tracing::{debug, warn};

use crate::{ApiError, AppState};

/// Authentication middleware
///
/// Applied to protected routes only; `/_info` does not use it.
pub async fn auth_middleware(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let header_value = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok());

    let client = match state.client_keys.authenticate(header_value) {
        Ok(client) => client.clone(),
        Err(e) => {
            warn!("Rejected {} {}: {}", request.method(), request.uri().path(), e);
            return Err(ApiError::Unauthenticated(e.to_string()));
        }
    };

    debug!(
        "{} {} from {}:{}",
        request.method(),
        request.uri().path(),
        client.system,
        client.environment
    );
    request.extensions_mut().insert(client);

    Ok(next.run(request).await)
}
