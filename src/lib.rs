pub mod config;
pub mod database;
pub mod dtos;
pub mod errors;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod services;
pub mod state;

use axum::{
    extract::Request,
    http::{header, HeaderValue, Method},
    middleware::from_fn_with_state,
    routing::get,
    Router,
};
use tower_http::{
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use crate::config::AppConfig;
use crate::errors::AppError;
use crate::state::AppState;

fn cors(config: &AppConfig) -> CorsLayer {
    let base = CorsLayer::new()
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE]);

    match config
        .client_url
        .as_deref()
        .and_then(|url| url.parse::<HeaderValue>().ok())
    {
        Some(origin) => base.allow_origin(origin).allow_credentials(true),
        None => base.allow_origin(Any),
    }
}

async fn route_not_found() -> AppError {
    AppError::not_found("Route not found")
}

pub fn build_router(state: AppState) -> Router {
    let api = Router::new()
        .route("/health", get(handlers::health::readiness))
        .nest("/auth", routes::auth::routes(state.clone()))
        .nest("/campaigns", routes::campaigns::routes(state.clone()))
        .nest("/donations", routes::donations::routes(state.clone()))
        .nest("/admin", routes::admin::routes(state.clone()))
        .nest("/analytics", routes::analytics::routes(state.clone()))
        .nest("/notifications", routes::notifications::routes(state.clone()))
        .layer(from_fn_with_state(state.clone(), middleware::rate_limit::general));

    let trace = TraceLayer::new_for_http().make_span_with(|request: &Request| {
        tracing::info_span!(
            "request",
            id = %uuid::Uuid::new_v4(),
            method = %request.method(),
            uri = %request.uri(),
        )
    });

    Router::new()
        .route("/health", get(handlers::health::liveness))
        .nest("/api", api)
        .fallback(route_not_found)
        .layer(cors(&state.config))
        .layer(CompressionLayer::new())
        .layer(trace)
        .with_state(state)
}
