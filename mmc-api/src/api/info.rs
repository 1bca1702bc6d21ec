//! GET /_info - health checks and metrics, no authentication

use axum::extract::State;
use axum::Json;
use serde_json::{json, Value};

use crate::{AppState, SYSTEM_NAME};

pub async fn get_info(State(state): State<AppState>) -> Json<Value> {
    let report = state.store.info(Some(SYSTEM_NAME)).await;

    let mut body = json!(report);
    body["startedAt"] = json!(state.startup_time.to_rfc3339());
    Json(body)
}
