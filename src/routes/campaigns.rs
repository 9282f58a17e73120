use axum::{
    middleware,
    routing::{get, post, put},
    Router,
};

use crate::handlers::campaigns;
use crate::middleware::{
    auth::{admin_only, authenticate, leader_or_admin},
    rate_limit,
};
use crate::state::AppState;

pub fn routes(state: AppState) -> Router<AppState> {
    let public = Router::new()
        .route("/", get(campaigns::list_campaigns))
        .route("/featured", get(campaigns::featured_campaigns))
        .route("/trending", get(campaigns::trending_campaigns))
        .route("/urgent", get(campaigns::urgent_campaigns))
        .route("/search", get(campaigns::search_campaigns))
        .route("/categories", get(campaigns::campaign_categories))
        .route("/:id", get(campaigns::get_campaign))
        .route("/:id/donations", get(campaigns::campaign_donations))
        .route("/:id/updates", get(campaigns::campaign_updates))
        .route("/:id/impact-reports", get(campaigns::impact_reports))
        .route("/:id/share", post(campaigns::share_campaign));

    let create = Router::new()
        .route("/", post(campaigns::create_campaign))
        .route_layer(middleware::from_fn(leader_or_admin))
        .route_layer(middleware::from_fn_with_state(state.clone(), authenticate))
        .route_layer(middleware::from_fn_with_state(state.clone(), rate_limit::campaign));

    let manage = Router::new()
        .route("/mine", get(campaigns::my_campaigns))
        .route(
            "/:id",
            put(campaigns::update_campaign).delete(campaigns::delete_campaign),
        )
        .route("/:id/updates", post(campaigns::add_campaign_update))
        .route("/:id/impact-reports", post(campaigns::add_impact_report))
        .route("/:id/status", put(campaigns::set_campaign_status))
        .route_layer(middleware::from_fn(leader_or_admin))
        .route_layer(middleware::from_fn_with_state(state.clone(), authenticate));

    let moderate = Router::new()
        .route("/:id/approve", put(campaigns::approve_campaign))
        .route("/:id/reject", put(campaigns::reject_campaign))
        .route_layer(middleware::from_fn(admin_only))
        .route_layer(middleware::from_fn_with_state(state, authenticate));

    public.merge(create).merge(manage).merge(moderate)
}
