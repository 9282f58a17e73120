use axum::{
    middleware,
    routing::{get, post, put},
    Router,
};

use crate::handlers::auth;
use crate::handlers::planned::{planned, PlannedFeature};
use crate::middleware::{auth::authenticate, rate_limit};
use crate::state::AppState;

pub fn routes(state: AppState) -> Router<AppState> {
    // Credential endpoints share the strict auth budget.
    let credentials = Router::new()
        .route("/register", post(auth::register))
        .route("/login", post(auth::login))
        .route("/refresh", post(auth::refresh))
        .route("/verify-email", post(auth::verify_email))
        .route("/google", post(planned(PlannedFeature::GoogleAuth)))
        .route("/facebook", post(planned(PlannedFeature::FacebookAuth)))
        .route_layer(middleware::from_fn_with_state(state.clone(), rate_limit::auth));

    let recovery = Router::new()
        .route("/forgot-password", post(auth::forgot_password))
        .route("/reset-password", post(auth::reset_password))
        .route_layer(middleware::from_fn_with_state(state.clone(), rate_limit::password_reset))
        .route_layer(middleware::from_fn_with_state(state.clone(), rate_limit::auth));

    let session = Router::new()
        .route("/logout", post(auth::logout))
        .route("/resend-verification", post(auth::resend_verification))
        .route("/me", get(auth::me).put(auth::update_me).delete(auth::delete_me))
        .route("/change-password", put(auth::change_password))
        .route("/check", get(auth::check))
        .route_layer(middleware::from_fn_with_state(state, authenticate));

    credentials.merge(recovery).merge(session)
}
