//! End-to-end smoke tests against PostgreSQL

#![cfg(feature = "db-tests")]

use std::sync::Arc;

use crm_api::{
    ApiConfig, ApiResult, AppState, DbClient, DbConfig, InMemoryMetadataStore,
    PgWorkspaceQueryRunner, WorkspaceManager, WorkspaceQueryRunner, WorkspaceQueryRunnerOptions,
};
use crm_core::standard_objects::standard_workspace;
use crm_core::{FilterClause, FilterOperator, FilterValue, QueryArgs, RecordData, WorkspaceMetadata};
use serde_json::{json, Value};
use uuid::Uuid;

fn test_db() -> ApiResult<DbClient> {
    let config = DbConfig::from_env();
    DbClient::from_config(&config)
}

fn options(metadata: &Arc<WorkspaceMetadata>, object: &str) -> Option<WorkspaceQueryRunnerOptions> {
    metadata.object(object).map(|item| {
        WorkspaceQueryRunnerOptions::new(
            Arc::new(metadata.visible_object(item)),
            Arc::clone(metadata),
            None,
        )
    })
}

fn record(value: Value) -> RecordData {
    match value {
        Value::Object(map) => map,
        _ => RecordData::new(),
    }
}

#[tokio::test]
async fn smoke_test_record_crud_chain() -> ApiResult<()> {
    let db = test_db()?;
    let metadata = Arc::new(standard_workspace(Uuid::now_v7(), [])?);
    WorkspaceManager::new(db.clone()).sync(&metadata).await?;
    let runner = PgWorkspaceQueryRunner::new(db);

    let companies = options(&metadata, "company").expect("company is a standard object");
    let people = options(&metadata, "person").expect("person is a standard object");

    let acme = runner
        .create_one(&companies, record(json!({ "name": "Acme", "employees": 12 })))
        .await?;
    let acme_id = acme
        .get("id")
        .and_then(Value::as_str)
        .and_then(|id| Uuid::parse_str(id).ok())
        .expect("created record has an id");

    runner
        .create_one(
            &people,
            record(json!({ "name": "Alice", "companyId": acme_id.to_string() })),
        )
        .await?;

    let filter = FilterClause::leaf("name", FilterOperator::Eq, FilterValue::text("Acme"));
    let found = runner
        .find_many(&companies, QueryArgs::with_filter(Some(filter)))
        .await?;
    assert_eq!(found.total_count, 1);

    let updated = runner
        .update_one(&companies, acme_id, record(json!({ "employees": 13 })))
        .await?;
    assert_eq!(
        updated.get("employees").and_then(Value::as_f64),
        Some(13.0)
    );

    runner.delete_one(&companies, acme_id).await?;
    let filter = FilterClause::leaf("name", FilterOperator::Eq, FilterValue::text("Alice"));
    let alice = runner
        .find_one(&people, QueryArgs::with_filter(Some(filter)))
        .await?
        .expect("person survives company deletion");
    assert_eq!(alice.get("companyId"), Some(&Value::Null));
    Ok(())
}

#[tokio::test]
async fn smoke_test_workspace_sync_is_idempotent() -> ApiResult<()> {
    let db = test_db()?;
    let metadata = standard_workspace(Uuid::now_v7(), [])?;
    let manager = WorkspaceManager::new(db);
    manager.sync(&metadata).await?;
    manager.sync(&metadata).await?;
    Ok(())
}

#[tokio::test]
async fn smoke_test_provisioned_workspace_gets_storage_before_first_query() -> ApiResult<()> {
    let db = test_db()?;
    let config = ApiConfig {
        sync_workspace_schemas: true,
        auto_provision_workspaces: true,
        ..ApiConfig::default()
    };
    let runner = Arc::new(PgWorkspaceQueryRunner::new(db.clone()));
    let state = AppState::new(
        Arc::new(InMemoryMetadataStore::new(true)),
        Arc::clone(&runner) as Arc<dyn WorkspaceQueryRunner>,
        config,
    )
    .with_db(db);

    let metadata = state.workspace(Uuid::now_v7()).await?;
    let companies = options(&metadata, "company").expect("company is a standard object");
    let found = runner.find_many(&companies, QueryArgs::default()).await?;
    assert_eq!(found.total_count, 0);

    // Already applied at this version.
    state.workspace(metadata.workspace_id).await?;
    Ok(())
}
