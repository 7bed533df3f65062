use axum::response::IntoResponse;
use axum::Json;

/// Liveness check; does not touch the database.
pub async fn health_check() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}
