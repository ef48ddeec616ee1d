use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

use crate::error::StoreError;

pub mod home_controller;
pub mod items_controller;
pub mod realtime_controller;

/// Validation -> 422, unknown id -> 404, anything else -> 500.
pub(crate) fn error_response(e: StoreError) -> Response {
    let status = match &e {
        StoreError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
        StoreError::NotFound(_) => StatusCode::NOT_FOUND,
        _ => {
            tracing::error!("store error: {e}");
            StatusCode::INTERNAL_SERVER_ERROR
        }
    };

    (status, Json(json!({ "error": e.to_string() }))).into_response()
}
