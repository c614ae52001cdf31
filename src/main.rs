use axum::Router;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{error, info, warn};

use pedidos_dashboard::api;
use pedidos_dashboard::api::handlers::pedidos::AppState;
use pedidos_dashboard::config::Config;
use pedidos_dashboard::services::{DataSource, MssqlDataSource};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load configuration
    let config = Config::from_env().map_err(|e| {
        eprintln!("Failed to load configuration: {}", e);
        e
    })?;

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_new(&config.logging.level)
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    if config.database.password.is_none() {
        warn!("SQL_PASSWORD is not set, SQL Server login will likely fail");
    }

    let source = Arc::new(MssqlDataSource::new(config.database.clone()));
    info!("PEDIDOS source: {}", source.describe());

    let state = AppState::new(source, config.clone()).map_err(|e| {
        error!("Failed to load templates: {}", e);
        e
    })?;

    // Create router with state
    let app: Router = api::routes::create_router_with_state(state);

    // Start server
    let addr: SocketAddr = config.server_address().parse()?;
    info!("Server listening on http://{}", addr);
    info!("Dashboard: http://{}/ | table: http://{}/pedidos", addr, addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
