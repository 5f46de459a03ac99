//! Shared application state for Axum routers.

use std::sync::Arc;

use crm_core::WorkspaceMetadata;
use crm_query::RestQueryBuilder;
use uuid::Uuid;

use crate::config::ApiConfig;
use crate::db::DbClient;
use crate::error::ApiResult;
use crate::graphql::{SchemaOptions, WorkspaceSchemaBuilder, WorkspaceSchemaCache};
use crate::metadata_store::MetadataStore;
use crate::runner::WorkspaceQueryRunner;
use crate::workspace_manager::WorkspaceManager;

/// Application-wide state shared across all routes.
#[derive(Clone)]
pub struct AppState {
    pub metadata: Arc<dyn MetadataStore>,
    pub runner: Arc<dyn WorkspaceQueryRunner>,
    /// GraphQL schemas keyed by workspace and metadata version.
    pub schemas: Arc<WorkspaceSchemaCache>,
    pub rest: RestQueryBuilder,
    /// Absent when running against a non-database runner.
    pub db: Option<DbClient>,
    /// Present when workspace storage is synchronized on metadata changes.
    pub workspace_manager: Option<WorkspaceManager>,
    pub config: ApiConfig,
    pub start_time: std::time::Instant,
}

impl AppState {
    pub fn new(
        metadata: Arc<dyn MetadataStore>,
        runner: Arc<dyn WorkspaceQueryRunner>,
        config: ApiConfig,
    ) -> Self {
        let builder = WorkspaceSchemaBuilder::new(Arc::clone(&runner)).with_options(SchemaOptions {
            max_depth: config.graphql_max_depth,
            ..SchemaOptions::default()
        });
        let schemas = Arc::new(WorkspaceSchemaCache::new(
            builder,
            config.schema_cache_capacity,
        ));
        Self {
            metadata,
            runner,
            schemas,
            rest: RestQueryBuilder::default(),
            db: None,
            workspace_manager: None,
            config,
            start_time: std::time::Instant::now(),
        }
    }

    /// Attaches the database used for readiness checks, and for storage
    /// sync when enabled in config.
    pub fn with_db(mut self, db: DbClient) -> Self {
        if self.config.sync_workspace_schemas {
            self.workspace_manager = Some(WorkspaceManager::new(db.clone()));
        }
        self.db = Some(db);
        self
    }

    /// Current metadata of a workspace, with its storage brought up to that
    /// version first when sync is enabled.
    pub async fn workspace(&self, workspace_id: Uuid) -> ApiResult<Arc<WorkspaceMetadata>> {
        let metadata = self.metadata.workspace(workspace_id).await?;
        self.sync_storage(&metadata).await?;
        Ok(metadata)
    }

    pub async fn sync_storage(&self, metadata: &WorkspaceMetadata) -> ApiResult<()> {
        match &self.workspace_manager {
            Some(manager) => manager.ensure_synced(metadata).await,
            None => Ok(()),
        }
    }
}

crate::impl_from_ref!(Arc<dyn MetadataStore>, metadata);
crate::impl_from_ref!(Arc<dyn WorkspaceQueryRunner>, runner);
crate::impl_from_ref!(Arc<WorkspaceSchemaCache>, schemas);
crate::impl_from_ref!(ApiConfig, config);
