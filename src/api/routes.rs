use axum::{
    routing::{get, post},
    Router,
};
use std::path::Path;
use tower_http::{
    cors::CorsLayer,
    services::{ServeDir, ServeFile},
    trace::TraceLayer,
};

use crate::api::handlers::pedidos::AppState;
use crate::api::handlers::{health, pedidos};

/// Page served at `/`
pub const DASHBOARD_PAGE: &str = "dashboard-pedidos-real.html";

/// Create router with application state
pub fn create_router_with_state(state: AppState) -> Router {
    let static_dir = Path::new(&state.config.server.static_dir).to_path_buf();
    let dashboard = ServeFile::new(static_dir.join(DASHBOARD_PAGE));

    Router::new()
        .route("/health", get(health::health_check))
        .route("/favicon.ico", get(health::favicon))
        .route("/api/pedidos", get(pedidos::list_pedidos))
        .route("/api/pedidos/depositar", post(pedidos::deposit_pedidos))
        .route("/pedidos", get(pedidos::render_pedidos_table))
        .route_service("/", dashboard)
        // Everything else is served verbatim from the static directory
        .fallback_service(ServeDir::new(static_dir))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
