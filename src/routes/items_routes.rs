use axum::{Router, routing::{delete, get, post}};
use crate::{AppState, controllers::items_controller};

pub fn add_routes(router: Router<AppState>) -> Router<AppState> {
    router
        .route(
            "/api/items",
            get(items_controller::get_dashboard).post(items_controller::post_create_item),
        )
        .route("/api/items/:id", delete(items_controller::delete_item))
        .route("/api/items/:id/target", post(items_controller::post_update_target))
        .route("/api/items/:id/fetch", post(items_controller::post_fetch_now))
        .route("/api/items/:id/history", get(items_controller::get_history))
        .route("/api/notify/test", post(items_controller::post_test_notification))
}
