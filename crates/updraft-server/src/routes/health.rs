use axum::Json;

/// GET /health: liveness check, also used by agents waiting for connectivity.
pub async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "OK",
        "time": chrono::Utc::now().to_rfc3339(),
    }))
}
