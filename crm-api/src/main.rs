//! CRM API Server Entry Point
//!
//! Loads workspace metadata, connects the database, optionally syncs
//! workspace storage, and starts the Axum HTTP server.

use std::net::SocketAddr;
use std::sync::Arc;

use crm_api::telemetry::{init_tracing, TelemetryConfig};
use crm_api::{
    create_api_router, ApiConfig, ApiError, ApiResult, AppState, DbClient, DbConfig,
    InMemoryMetadataStore, MetadataStore, PgWorkspaceQueryRunner,
};

#[tokio::main]
async fn main() -> ApiResult<()> {
    let telemetry_config = TelemetryConfig::default();
    init_tracing(&telemetry_config)?;

    let api_config = ApiConfig::from_env();
    let store = match &api_config.metadata_path {
        Some(path) => InMemoryMetadataStore::load(path, api_config.auto_provision_workspaces)?,
        None => InMemoryMetadataStore::new(api_config.auto_provision_workspaces),
    };
    let metadata: Arc<dyn MetadataStore> = Arc::new(store);

    let db = DbClient::from_config(&DbConfig::from_env())?;
    let runner = Arc::new(PgWorkspaceQueryRunner::new(db.clone()));
    let state = AppState::new(Arc::clone(&metadata), runner, api_config).with_db(db);

    for workspace in metadata.workspaces().await {
        state.sync_storage(&workspace).await?;
    }
    let listener_handle = Arc::clone(&state.schemas).spawn_invalidation_listener(metadata.subscribe());

    let app = create_api_router(state)?;

    let addr = resolve_bind_addr()?;
    tracing::info!(%addr, "Starting CRM API server");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| ApiError::internal_error(format!("Failed to bind {}: {}", addr, e)))?;

    let server = axum::serve(listener, app);
    tokio::select! {
        result = server => {
            result.map_err(|e| ApiError::internal_error(format!("Server error: {}", e)))?;
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Shutdown signal received");
        }
    }

    listener_handle.abort();
    Ok(())
}

fn resolve_bind_addr() -> ApiResult<SocketAddr> {
    let host = std::env::var("CRM_API_BIND").unwrap_or_else(|_| "0.0.0.0".to_string());
    let port_str = std::env::var("PORT")
        .ok()
        .or_else(|| std::env::var("CRM_API_PORT").ok())
        .unwrap_or_else(|| "3000".to_string());
    let port = port_str
        .parse::<u16>()
        .map_err(|_| ApiError::invalid_input(format!("Invalid port value: {}", port_str)))?;

    let addr = format!("{}:{}", host, port);
    addr.parse::<SocketAddr>()
        .map_err(|e| ApiError::invalid_input(format!("Invalid bind address {}: {}", addr, e)))
}
