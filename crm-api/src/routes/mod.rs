//! HTTP Routes Module
//!
//! Includes:
//! - REST record routes under /rest/*
//! - GraphQL endpoint at /graphql (+ SDL and playground)
//! - Metadata routes under /metadata/*
//! - Health checks at /health/* and metrics at /metrics (public)
//! - CORS support for browser-based clients

pub mod graphql;
pub mod health;
pub mod metadata;
pub mod rest;

use std::time::Duration;

use axum::{
    http::{header, header::HeaderName, HeaderValue, Method},
    middleware::from_fn,
    routing::get,
    Router,
};
use tower::limit::ConcurrencyLimitLayer;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::config::ApiConfig;
use crate::error::{ApiError, ApiResult};
use crate::middleware::{workspace_context_middleware, USER_ID_HEADER, WORKSPACE_ID_HEADER};
use crate::state::AppState;
use crate::telemetry::{metrics_handler, observability_middleware};

pub use graphql::create_router as graphql_router;
pub use health::create_router as health_router;
pub use metadata::create_router as metadata_router;
pub use rest::create_router as rest_router;

// ============================================================================
// PRODUCTION VALIDATION
// ============================================================================

/// Check if running in a production environment.
fn is_production_environment() -> bool {
    std::env::var("CRM_ENVIRONMENT")
        .map(|e| matches!(e.to_lowercase().as_str(), "production" | "prod"))
        .unwrap_or(false)
}

/// Validate API configuration for production use.
fn validate_api_config_for_production(config: &ApiConfig) -> ApiResult<()> {
    if config.cors_origins.is_empty() {
        return Err(ApiError::invalid_input(
            "CORS origins not configured for production. Set CRM_CORS_ORIGINS.",
        ));
    }
    if config.auto_provision_workspaces {
        tracing::warn!(
            "Workspace auto-provisioning is enabled in production.\n\
             Set CRM_AUTO_PROVISION_WORKSPACES=false to serve only known workspaces."
        );
    }
    Ok(())
}

// ============================================================================
// CORS LAYER
// ============================================================================

/// Build the CORS layer from ApiConfig.
///
/// In development mode (empty origins), allows all origins.
/// In production mode, only allows configured origins.
fn build_cors_layer(config: &ApiConfig) -> CorsLayer {
    let cors = CorsLayer::new()
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::PATCH,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([
            header::AUTHORIZATION,
            header::CONTENT_TYPE,
            header::ACCEPT,
            HeaderName::from_static(WORKSPACE_ID_HEADER),
            HeaderName::from_static(USER_ID_HEADER),
        ])
        .max_age(Duration::from_secs(config.cors_max_age_secs));

    if config.cors_origins.is_empty() {
        tracing::info!("CORS: Development mode - allowing all origins");
        cors.allow_origin(Any).allow_headers(Any)
    } else {
        tracing::info!(
            "CORS: Production mode - allowing origins: {:?}",
            config.cors_origins
        );
        let origins: Vec<HeaderValue> = config
            .cors_origins
            .iter()
            .filter_map(|o| o.parse().ok())
            .collect();

        if config.cors_allow_credentials {
            cors.allow_origin(origins).allow_credentials(true)
        } else {
            cors.allow_origin(origins)
        }
    }
}

// ============================================================================
// ROUTER
// ============================================================================

/// Create the complete API router.
///
/// # Middleware Order (outer to inner)
/// 1. CORS - handles preflight requests
/// 2. Request tracing and metrics
/// 3. Concurrency limit - queues callers beyond the in-flight limit
/// 4. Workspace context (only on /rest, /graphql and /metadata)
pub fn create_api_router(state: AppState) -> ApiResult<axum::Router> {
    if is_production_environment() {
        validate_api_config_for_production(&state.config)?;
    }
    let config = state.config.clone();

    let workspace_routes = Router::new()
        .nest("/rest", rest::create_router())
        .merge(graphql::create_router())
        .nest("/metadata", metadata::create_router())
        .layer(from_fn(workspace_context_middleware));

    let router = Router::new()
        .merge(workspace_routes)
        .merge(graphql::create_playground_router())
        .nest("/health", health::create_router())
        .route("/metrics", get(metrics_handler))
        .with_state(state);

    Ok(router
        .layer(ConcurrencyLimitLayer::new(config.max_concurrent_requests))
        .layer(from_fn(observability_middleware))
        .layer(TraceLayer::new_for_http())
        .layer(build_cors_layer(&config)))
}
