use axum::Json;
use serde_json::{json, Value};

pub async fn root() -> Json<Value> {
    Json(json!({ "message": "BEIR Dataset API is running" }))
}

pub async fn health_check() -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "service": "metrics-api",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}
