use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Deserialize;
use serde_json::json;

use crate::{services::scheduler::FetchNowStatus, AppState};

use super::error_response;

const DEFAULT_HISTORY: usize = 50;
const MAX_HISTORY: usize = 500;

#[derive(Deserialize)]
pub struct CreateItemBody {
    #[serde(default)]
    pub name: Option<String>,
    pub url: String,
    #[serde(alias = "targetPrice")]
    pub target_price: f64,
}

#[derive(Deserialize)]
pub struct UpdateTargetBody {
    #[serde(alias = "targetPrice")]
    pub target_price: f64,
}

#[derive(Deserialize)]
pub struct HistoryQuery {
    pub limit: Option<usize>,
}

// GET /api/items
pub async fn get_dashboard(State(state): State<AppState>) -> Response {
    match state.store.dashboard_snapshot().await {
        Ok(rows) => (StatusCode::OK, Json(rows)).into_response(),
        Err(e) => error_response(e),
    }
}

// POST /api/items
pub async fn post_create_item(
    State(state): State<AppState>,
    Json(body): Json<CreateItemBody>,
) -> Response {
    match state
        .store
        .add_item(body.name.as_deref(), &body.url, body.target_price)
        .await
    {
        Ok(id) => {
            tracing::info!(item_id = %id, url = %body.url.trim(), "item added");
            let _ = state.events_tx.send("itemsUpdated".to_string());
            (StatusCode::CREATED, Json(json!({ "id": id }))).into_response()
        }
        Err(e) => error_response(e),
    }
}

// POST /api/items/:id/target
pub async fn post_update_target(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<UpdateTargetBody>,
) -> Response {
    match state.store.update_target(&id, body.target_price).await {
        Ok(()) => {
            let _ = state.events_tx.send("itemsUpdated".to_string());
            (StatusCode::OK, Json(json!({ "ok": true }))).into_response()
        }
        Err(e) => error_response(e),
    }
}

// DELETE /api/items/:id
pub async fn delete_item(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    match state.store.delete_item(&id).await {
        Ok(()) => {
            tracing::info!(item_id = %id, "item deleted");
            let _ = state.events_tx.send("itemsUpdated".to_string());
            (StatusCode::OK, Json(json!({ "ok": true }))).into_response()
        }
        Err(e) => error_response(e),
    }
}

// POST /api/items/:id/fetch
pub async fn post_fetch_now(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    match state.scheduler.trigger_fetch_now(&id).await {
        Ok(FetchNowStatus::Queued) => {
            (StatusCode::ACCEPTED, Json(json!({ "status": "queued" }))).into_response()
        }
        Ok(FetchNowStatus::NotFound) => {
            (StatusCode::NOT_FOUND, Json(json!({ "status": "notFound" }))).into_response()
        }
        Ok(FetchNowStatus::Stopped) => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({ "status": "stopped" })),
        )
            .into_response(),
        Err(e) => error_response(e),
    }
}

// GET /api/items/:id/history?limit=N
pub async fn get_history(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(q): Query<HistoryQuery>,
) -> Response {
    match state.store.get_item(&id).await {
        Ok(Some(_)) => {}
        Ok(None) => {
            return (
                StatusCode::NOT_FOUND,
                Json(json!({ "error": format!("item {id} not found") })),
            )
                .into_response();
        }
        Err(e) => return error_response(e),
    }

    let limit = q.limit.unwrap_or(DEFAULT_HISTORY).clamp(1, MAX_HISTORY);
    match state.store.history_for(&id, limit).await {
        Ok(samples) => (StatusCode::OK, Json(samples)).into_response(),
        Err(e) => error_response(e),
    }
}

// POST /api/notify/test
pub async fn post_test_notification(State(state): State<AppState>) -> Response {
    let outcome = state
        .notifier
        .send("✅ Test message from pricewatch")
        .await;
    tracing::info!(sent = outcome.is_sent(), "test notification: {}", outcome.detail());

    (StatusCode::OK, Json(outcome)).into_response()
}
