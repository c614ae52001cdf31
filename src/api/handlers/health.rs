use axum::{
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use std::path::Path;

use crate::api::handlers::pedidos::AppState;

pub const SERVICE_NAME: &str = "pedidos-dashboard";

/// Health check endpoint
pub async fn health_check(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "healthy",
        "service": SERVICE_NAME,
        "database": state.config.database.name,
        "server": state.config.database.host,
    }))
}

/// Serve `favicon.ico` from the static directory, or 204 when there is none
pub async fn favicon(State(state): State<AppState>) -> Response {
    let path = Path::new(&state.config.server.static_dir).join("favicon.ico");
    match tokio::fs::read(&path).await {
        Ok(bytes) => ([(header::CONTENT_TYPE, "image/x-icon")], bytes).into_response(),
        Err(_) => StatusCode::NO_CONTENT.into_response(),
    }
}
