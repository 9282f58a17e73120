use axum::{middleware, routing::get, Router};

use crate::handlers::analytics;
use crate::middleware::auth::{admin_only, authenticate, leader_or_admin};
use crate::state::AppState;

pub fn routes(state: AppState) -> Router<AppState> {
    let personal = Router::new()
        .route("/dashboard", get(analytics::dashboard))
        .route("/user", get(analytics::user_stats))
        .route("/trends", get(analytics::trends))
        .route("/categories", get(analytics::categories))
        .route("/donations/summary", get(analytics::donation_summary))
        .route_layer(middleware::from_fn_with_state(state.clone(), authenticate));

    let leaders = Router::new()
        .route("/campaigns/overview", get(analytics::campaign_overview))
        .route("/campaigns/:id/performance", get(analytics::campaign_performance))
        .route("/donations/trends", get(analytics::donation_trends))
        .route_layer(middleware::from_fn(leader_or_admin))
        .route_layer(middleware::from_fn_with_state(state.clone(), authenticate));

    let platform = Router::new()
        .route("/admin/platform-stats", get(analytics::platform_stats))
        .route("/admin/user-analytics", get(analytics::user_analytics))
        .route("/admin/financial-report", get(analytics::financial_report))
        .route("/admin/export", get(analytics::export))
        .route_layer(middleware::from_fn(admin_only))
        .route_layer(middleware::from_fn_with_state(state, authenticate));

    personal.merge(leaders).merge(platform)
}
