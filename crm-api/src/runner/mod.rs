//! Workspace Query Runner
//!
//! Executes structured reads and writes against one workspace's records.
//! Both the REST surface and the GraphQL resolvers delegate here with a
//! [`WorkspaceQueryRunnerOptions`] bundle describing the call.

pub mod expand;
pub mod postgres;
pub mod record;
pub mod sql;

pub use postgres::PgWorkspaceQueryRunner;

use crate::error::{ApiError, ApiResult, ErrorCode};
use async_trait::async_trait;
use crm_core::{
    FieldMetadata, FilterClause, ObjectMetadataItem, QueryArgs, RecordConnection, RecordData,
    WorkspaceMetadata, WorkspaceQuery,
};
use serde_json::{Map, Value};
use std::sync::Arc;
use uuid::Uuid;

/// Details of the GraphQL field being resolved, when the call comes from
/// GraphQL.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryInfo {
    pub field_name: String,
    pub path: String,
    /// Top-level selection of the field.
    pub selection: Vec<String>,
}

/// Everything a runner call needs besides its arguments.
#[derive(Debug, Clone)]
pub struct WorkspaceQueryRunnerOptions {
    /// Target object, projected to its enabled fields.
    pub object_metadata_item: Arc<ObjectMetadataItem>,
    pub workspace_id: Uuid,
    pub user_id: Option<Uuid>,
    /// Fields of the target object.
    pub field_metadata_collection: Vec<FieldMetadata>,
    /// Full metadata snapshot of the workspace.
    pub object_metadata_collection: Arc<WorkspaceMetadata>,
    pub info: Option<QueryInfo>,
}

impl WorkspaceQueryRunnerOptions {
    pub fn new(
        object: Arc<ObjectMetadataItem>,
        metadata: Arc<WorkspaceMetadata>,
        user_id: Option<Uuid>,
    ) -> Self {
        Self {
            field_metadata_collection: object.fields.clone(),
            object_metadata_item: object,
            workspace_id: metadata.workspace_id,
            user_id,
            object_metadata_collection: metadata,
            info: None,
        }
    }

    pub fn with_info(mut self, info: QueryInfo) -> Self {
        self.info = Some(info);
        self
    }

    /// Options targeting another enabled object of the same workspace.
    pub fn for_object(&self, name_singular: &str) -> ApiResult<Self> {
        let metadata = &self.object_metadata_collection;
        let object = metadata
            .object(name_singular)
            .filter(|o| metadata.is_object_enabled(o))
            .ok_or_else(|| ApiError::object_not_found(name_singular))?;
        Ok(Self::new(
            Arc::new(metadata.visible_object(object)),
            Arc::clone(metadata),
            self.user_id,
        ))
    }

    pub fn object_name(&self) -> &str {
        &self.object_metadata_item.name_singular
    }
}

/// Executes record operations for one workspace.
#[async_trait]
pub trait WorkspaceQueryRunner: Send + Sync {
    async fn find_many(
        &self,
        options: &WorkspaceQueryRunnerOptions,
        args: QueryArgs,
    ) -> ApiResult<RecordConnection>;

    async fn find_one(
        &self,
        options: &WorkspaceQueryRunnerOptions,
        args: QueryArgs,
    ) -> ApiResult<Option<RecordData>>;

    async fn create_many(
        &self,
        options: &WorkspaceQueryRunnerOptions,
        data: Vec<RecordData>,
    ) -> ApiResult<Vec<RecordData>>;

    async fn create_one(
        &self,
        options: &WorkspaceQueryRunnerOptions,
        data: RecordData,
    ) -> ApiResult<RecordData>;

    /// Fails with `RECORD_NOT_FOUND` when no record has `id`.
    async fn update_one(
        &self,
        options: &WorkspaceQueryRunnerOptions,
        id: Uuid,
        data: RecordData,
    ) -> ApiResult<RecordData>;

    async fn update_many(
        &self,
        options: &WorkspaceQueryRunnerOptions,
        filter: FilterClause,
        data: RecordData,
    ) -> ApiResult<Vec<RecordData>>;

    /// Fails with `RECORD_NOT_FOUND` when no record has `id`.
    async fn delete_one(
        &self,
        options: &WorkspaceQueryRunnerOptions,
        id: Uuid,
    ) -> ApiResult<RecordData>;

    async fn delete_many(
        &self,
        options: &WorkspaceQueryRunnerOptions,
        filter: FilterClause,
    ) -> ApiResult<Vec<RecordData>>;
}

// ============================================================================
// REST EXECUTION
// ============================================================================

fn keyed(key: String, value: Value) -> Value {
    let mut map = Map::new();
    map.insert(key, value);
    Value::Object(map)
}

fn records(records: Vec<RecordData>) -> Value {
    Value::Array(records.into_iter().map(Value::Object).collect())
}

/// Runs a REST-built query and shapes the JSON response body. Results are
/// keyed by the matching GraphQL root field name.
pub async fn execute_rest(
    runner: &dyn WorkspaceQueryRunner,
    query: WorkspaceQuery,
    options: &WorkspaceQueryRunnerOptions,
) -> ApiResult<Value> {
    let field = query.method().root_field_name(&options.object_metadata_item);
    let body = match query {
        WorkspaceQuery::FindMany(args) => {
            let depth = args.depth;
            let connection = runner.find_many(options, args).await?;
            let page_info = serde_json::to_value(&connection.page_info)?;
            let total_count = connection.total_count;
            let mut nodes = connection.into_nodes();
            expand::expand_records(runner, options, &mut nodes, depth).await?;

            let mut body = Map::new();
            body.insert("data".to_string(), keyed(field, records(nodes)));
            body.insert("pageInfo".to_string(), page_info);
            body.insert("totalCount".to_string(), Value::from(total_count));
            Value::Object(body)
        }
        WorkspaceQuery::FindOne(args) => {
            let depth = args.depth;
            let record = runner.find_one(options, args).await?.ok_or_else(|| {
                ApiError::new(
                    ErrorCode::RecordNotFound,
                    format!("Record of '{}' not found", options.object_name()),
                )
            })?;
            let mut nodes = vec![record];
            expand::expand_records(runner, options, &mut nodes, depth).await?;
            let record = nodes.into_iter().next().map_or(Value::Null, Value::Object);
            keyed("data".to_string(), keyed(field, record))
        }
        WorkspaceQuery::CreateOne(data) => {
            let record = runner.create_one(options, data).await?;
            keyed("data".to_string(), keyed(field, Value::Object(record)))
        }
        WorkspaceQuery::CreateMany(data) => {
            let created = runner.create_many(options, data).await?;
            keyed("data".to_string(), keyed(field, records(created)))
        }
        WorkspaceQuery::UpdateOne { id, data } => {
            let record = runner.update_one(options, id, data).await?;
            keyed("data".to_string(), keyed(field, Value::Object(record)))
        }
        WorkspaceQuery::DeleteOne { id } => {
            let record = runner.delete_one(options, id).await?;
            let id = record.get("id").cloned().unwrap_or(Value::Null);
            keyed("data".to_string(), keyed(field, keyed("id".to_string(), id)))
        }
    };
    Ok(body)
}
