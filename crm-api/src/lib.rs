//! CRM API - REST/GraphQL layer over tenant-defined objects
//!
//! Every workspace describes its own objects in metadata. REST requests are
//! parsed into structured queries, GraphQL schemas are generated per
//! workspace, and both surfaces execute through the workspace query runner
//! against the workspace's Postgres schema.

pub mod config;
pub mod db;
pub mod error;
pub mod graphql;
pub mod macros;
pub mod metadata_store;
pub mod middleware;
pub mod routes;
pub mod runner;
pub mod state;
pub mod telemetry;
pub mod workspace_manager;

// Re-export commonly used types
pub use config::ApiConfig;
pub use db::{DbClient, DbConfig};
pub use error::{ApiError, ApiResult, ErrorCode};
pub use graphql::{WorkspaceSchemaBuilder, WorkspaceSchemaCache};
pub use metadata_store::{InMemoryMetadataStore, MetadataEvent, MetadataStore};
pub use middleware::{workspace_context_middleware, WorkspaceContext, WorkspaceExtractor};
pub use routes::create_api_router;
pub use runner::{
    execute_rest, PgWorkspaceQueryRunner, QueryInfo, WorkspaceQueryRunner,
    WorkspaceQueryRunnerOptions,
};
pub use state::AppState;
pub use workspace_manager::WorkspaceManager;
