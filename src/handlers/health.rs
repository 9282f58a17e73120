use axum::{extract::State, http::StatusCode, response::Json};
use mongodb::bson::doc;
use serde_json::{json, Value};

use crate::state::AppState;

pub async fn liveness() -> Json<Value> {
    Json(json!({
        "status": "OK",
        "timestamp": chrono::Utc::now().to_rfc3339(),
    }))
}

/// Readiness: the service is only healthy while MongoDB answers a ping.
pub async fn readiness(State(state): State<AppState>) -> (StatusCode, Json<Value>) {
    let (status, database) = match state.db.run_command(doc! { "ping": 1 }).await {
        Ok(_) => (StatusCode::OK, "connected"),
        Err(err) => {
            tracing::warn!("health check ping failed: {}", err);
            (StatusCode::SERVICE_UNAVAILABLE, "disconnected")
        }
    };

    (
        status,
        Json(json!({
            "success": status.is_success(),
            "status": if status.is_success() { "OK" } else { "DEGRADED" },
            "database": database,
            "timestamp": chrono::Utc::now().to_rfc3339(),
        })),
    )
}
