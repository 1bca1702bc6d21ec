//! mmc-api library - catalog HTTP service
//!
//! Authenticated JSON API over the catalog Store, plus the unauthenticated
//! `/_info` probe and RDF renderings of single tracks and the export file.

use axum::Router;
use chrono::{DateTime, Utc};
use mmc_common::api::ClientKeys;
use mmc_common::rdf::RdfContext;
use mmc_common::Store;
use std::path::PathBuf;
use std::sync::Arc;

pub mod api;
pub mod error;

pub use error::{ApiError, ApiResult};

/// Name reported in `/_info` and used as the event source
pub const SYSTEM_NAME: &str = "mmc-api";

/// Application state shared across HTTP handlers
#[derive(Clone)]
pub struct AppState {
    pub store: Store,
    /// Read-only for the lifetime of the process
    pub client_keys: Arc<ClientKeys>,
    pub rdf: Arc<RdfContext>,
    /// File written by mmc-export and served at `/v2/export`
    pub export_path: PathBuf,
    pub startup_time: DateTime<Utc>,
}

impl AppState {
    pub fn new(
        store: Store,
        client_keys: ClientKeys,
        rdf: RdfContext,
        export_path: PathBuf,
    ) -> Self {
        Self {
            store,
            client_keys: Arc::new(client_keys),
            rdf: Arc::new(rdf),
            export_path,
            startup_time: Utc::now(),
        }
    }
}

/// Build application router
///
/// Everything except `/_info` and the removed legacy paths requires a client key.
pub fn build_router(state: AppState) -> Router {
    use api::not_allowed;
    use axum::middleware;
    use axum::routing::{any, get};

    let protected = Router::new()
        .route("/", get(api::root_redirect).fallback(not_allowed("GET")))
        .route(
            "/v2/tracks",
            get(api::tracks::get_tracks)
                .put(api::tracks::put_tracks)
                .patch(api::tracks::patch_tracks)
                .fallback(not_allowed("GET, PUT, PATCH")),
        )
        .route(
            "/v2/tracks/random",
            get(api::tracks::random_tracks).fallback(not_allowed("GET")),
        )
        .route(
            "/v2/tracks/:id",
            get(api::tracks::get_track)
                .put(api::tracks::put_track)
                .patch(api::tracks::patch_track)
                .delete(api::tracks::delete_track)
                .fallback(not_allowed("GET, PUT, PATCH, DELETE")),
        )
        .route(
            "/v2/tracks/:id/weighting",
            get(api::weighting::get_weighting)
                .put(api::weighting::put_weighting)
                .fallback(not_allowed("GET, PUT")),
        )
        .route(
            "/v2/tracks/:id/tags/:predicate",
            get(api::tags::get_tag)
                .put(api::tags::put_tag)
                .delete(api::tags::delete_tag)
                .fallback(not_allowed("GET, PUT, DELETE")),
        )
        .route(
            "/v2/predicates",
            get(api::tags::list_predicates).fallback(not_allowed("GET")),
        )
        .route(
            "/v2/collections",
            get(api::collections::list_collections).fallback(not_allowed("GET")),
        )
        .route(
            "/v2/collections/:slug",
            get(api::collections::get_collection)
                .put(api::collections::put_collection)
                .delete(api::collections::delete_collection)
                .fallback(not_allowed("GET, PUT, DELETE")),
        )
        .route(
            "/v2/collections/:slug/random",
            get(api::collections::random_collection_tracks).fallback(not_allowed("GET")),
        )
        .route(
            "/v2/collections/:slug/:track_id",
            get(api::collections::get_member)
                .put(api::collections::add_member)
                .delete(api::collections::remove_member)
                .fallback(not_allowed("GET, PUT, DELETE")),
        )
        .route(
            "/v2/export",
            get(api::export::get_export).fallback(not_allowed("GET")),
        )
        .layer(middleware::from_fn_with_state(
            state.clone(),
            api::auth::auth_middleware,
        ));

    let mut public = Router::new().route(
        mmc_common::api::AUTH_EXEMPT_PATH,
        get(api::info::get_info).fallback(not_allowed("GET")),
    );
    for legacy in api::legacy::LEGACY_PREFIXES {
        public = public
            .route(legacy, any(api::legacy::gone))
            .route(&format!("{}/*rest", legacy), any(api::legacy::gone));
    }

    Router::new()
        .merge(protected)
        .merge(public)
        .with_state(state)
}
