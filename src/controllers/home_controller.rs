use axum::{
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde_json::json;

use crate::AppState;

pub async fn not_found() -> impl IntoResponse {
    (StatusCode::NOT_FOUND, Json(json!({ "error": "not found" })))
}

pub async fn health() -> impl IntoResponse {
    (StatusCode::OK, "ok")
}

pub async fn health_db(State(state): State<AppState>) -> impl IntoResponse {
    match state.store.list_items().await {
        Ok(items) => (StatusCode::OK, format!("sqlite: ok ({} items)", items.len())).into_response(),
        Err(e) => (StatusCode::INTERNAL_SERVER_ERROR, format!("sqlite error: {e}")).into_response(),
    }
}
