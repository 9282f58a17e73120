use axum::{
    middleware,
    routing::{delete, get, post, put},
    Router,
};

use crate::handlers::notifications;
use crate::middleware::auth::{admin_only, authenticate};
use crate::state::AppState;

pub fn routes(state: AppState) -> Router<AppState> {
    let inbox = Router::new()
        .route("/", get(notifications::list_notifications))
        .route("/unread-count", get(notifications::unread_count))
        .route("/mark-all-read", put(notifications::mark_all_read))
        .route("/clear-all", delete(notifications::clear_all))
        .route(
            "/preferences",
            get(notifications::get_preferences).put(notifications::update_preferences),
        )
        .route("/:id", delete(notifications::delete_notification))
        .route("/:id/read", put(notifications::mark_read))
        .route_layer(middleware::from_fn_with_state(state.clone(), authenticate));

    let outbound = Router::new()
        .route("/send", post(notifications::send_notification))
        .route("/broadcast", post(notifications::broadcast))
        .route_layer(middleware::from_fn(admin_only))
        .route_layer(middleware::from_fn_with_state(state, authenticate));

    inbox.merge(outbound)
}
