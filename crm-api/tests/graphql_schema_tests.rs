//! Workspace GraphQL schema tests
//!
//! Schemas are built from fixture metadata over an in-memory runner and
//! executed directly, without HTTP.

use std::sync::Arc;

use async_graphql::Request;
use crm_api::graphql::{RootKind, RootTypeFactory, ResolverFactories, ResolverFactoryContext};
use crm_api::{
    ApiResult, ErrorCode, InMemoryMetadataStore, MetadataStore, WorkspaceContext,
    WorkspaceSchemaBuilder, WorkspaceSchemaCache,
};
use crm_core::standard_objects::standard_workspace_builder;
use crm_core::{FeatureFlagKey, ObjectMetadataBuilder, ResolverMethod, WorkspaceMetadata};
use crm_test_utils::fixtures::{fully_enabled_workspace, standard_workspace, WORKSPACE_ID};
use serde_json::{json, Value};
use uuid::Uuid;

#[path = "support/runner.rs"]
mod runner_support;
use runner_support::InMemoryRunner;

const ACME_ID: &str = "0190d2b1-7c1e-7000-8000-00000000a001";
const GLOBEX_ID: &str = "0190d2b1-7c1e-7000-8000-00000000a002";
const ALICE_ID: &str = "0190d2b1-7c1e-7000-8000-00000000b001";

fn runner() -> Arc<InMemoryRunner> {
    Arc::new(
        InMemoryRunner::new()
            .with_records(
                "company",
                vec![
                    json!({ "id": ACME_ID, "name": "Acme", "employees": 12 }),
                    json!({ "id": GLOBEX_ID, "name": "Globex", "employees": 40 }),
                ],
            )
            .with_records(
                "person",
                vec![json!({ "id": ALICE_ID, "name": "Alice", "companyId": ACME_ID })],
            ),
    )
}

fn workspace() -> WorkspaceContext {
    WorkspaceContext {
        workspace_id: WORKSPACE_ID,
        user_id: None,
    }
}

fn build(
    metadata: WorkspaceMetadata,
    runner: Arc<InMemoryRunner>,
) -> ApiResult<async_graphql::dynamic::Schema> {
    WorkspaceSchemaBuilder::new(runner).build(Arc::new(metadata))
}

async fn execute(
    schema: &async_graphql::dynamic::Schema,
    query: &str,
) -> (Value, Vec<String>) {
    let response = schema.execute(Request::new(query).data(workspace())).await;
    let errors = response.errors.iter().map(|e| e.message.clone()).collect();
    (response.data.into_json().unwrap_or(Value::Null), errors)
}

#[test]
fn test_root_fields_follow_naming_convention() -> ApiResult<()> {
    let schema = build(standard_workspace()?, runner())?;
    let sdl = schema.sdl();
    for field in [
        "companies(",
        "company(",
        "createCompany(",
        "createCompanies(",
        "updateCompany(",
        "updateCompanies(",
        "deleteCompany(",
        "deleteCompanies(",
        "people(",
        "person(",
    ] {
        assert!(sdl.contains(field), "missing root field {}", field);
    }
    assert!(sdl.contains("type CompanyConnection"));
    assert!(sdl.contains("input CompanyFilterInput"));
    assert!(sdl.contains("enum OpportunityStageEnum"));
    Ok(())
}

#[test]
fn test_gated_objects_are_skipped() -> ApiResult<()> {
    let sdl = build(standard_workspace()?, runner())?.sdl();
    assert!(!sdl.contains("CalendarChannel"));
    assert!(!sdl.contains("calendarChannels"));

    let sdl = build(fully_enabled_workspace()?, runner())?.sdl();
    assert!(sdl.contains("type CalendarChannel"));
    assert!(sdl.contains("calendarChannels"));
    Ok(())
}

#[test]
fn test_type_name_collision_fails_build() -> ApiResult<()> {
    let metadata = standard_workspace_builder(WORKSPACE_ID)
        .object(ObjectMetadataBuilder::new("pageInfo", "pageInfos").custom().build())
        .build()?;
    let err = build(metadata, runner()).err();
    assert_eq!(err.map(|e| e.code), Some(ErrorCode::SchemaBuildFailed));
    Ok(())
}

#[test]
fn test_root_type_factory_only_takes_its_own_methods() -> ApiResult<()> {
    let metadata = Arc::new(standard_workspace()?);
    let company = metadata
        .object("company")
        .map(|o| ResolverFactoryContext::new(o, Arc::clone(&metadata), runner()))
        .into_iter()
        .collect::<Vec<_>>();
    let factories = ResolverFactories::default();
    let roots = RootTypeFactory::new(&factories);

    let query = roots.create(&company, &ResolverMethod::ALL, RootKind::Query)?;
    assert_eq!(query.type_name(), "Query");
    let mutation = roots.create(&company, &[ResolverMethod::DeleteOne], RootKind::Mutation)?;
    assert_eq!(mutation.type_name(), "Mutation");
    Ok(())
}

#[tokio::test]
async fn test_find_many_filters_through_runner() -> ApiResult<()> {
    let runner = runner();
    let schema = build(standard_workspace()?, Arc::clone(&runner))?;
    let (data, errors) = execute(
        &schema,
        r#"{ companies(filter: { name: { eq: "Acme" } }) {
                totalCount
                edges { node { id name employees } }
                pageInfo { hasNextPage }
            } }"#,
    )
    .await;

    assert!(errors.is_empty(), "{:?}", errors);
    assert_eq!(data["companies"]["totalCount"], json!(1));
    assert_eq!(data["companies"]["edges"][0]["node"]["name"], json!("Acme"));
    assert_eq!(data["companies"]["edges"][0]["node"]["id"], json!(ACME_ID));
    assert_eq!(data["companies"]["pageInfo"]["hasNextPage"], json!(false));

    let calls = runner.calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].method, ResolverMethod::FindMany);
    assert_eq!(calls[0].object, "company");
    assert_eq!(calls[0].workspace_id, WORKSPACE_ID);
    assert_eq!(calls[0].field_name.as_deref(), Some("companies"));
    Ok(())
}

#[tokio::test]
async fn test_relations_resolve_both_directions() -> ApiResult<()> {
    let schema = build(standard_workspace()?, runner())?;
    let (data, errors) = execute(
        &schema,
        r#"{
            person(filter: { name: { eq: "Alice" } }) { name company { name } }
            company(filter: { name: { eq: "Acme" } }) {
                people { totalCount edges { node { name } } }
            }
        }"#,
    )
    .await;

    assert!(errors.is_empty(), "{:?}", errors);
    assert_eq!(data["person"]["company"]["name"], json!("Acme"));
    assert_eq!(data["company"]["people"]["totalCount"], json!(1));
    assert_eq!(
        data["company"]["people"]["edges"][0]["node"]["name"],
        json!("Alice")
    );
    Ok(())
}

#[tokio::test]
async fn test_mutations_dispatch_by_method() -> ApiResult<()> {
    let runner = runner();
    let schema = build(standard_workspace()?, Arc::clone(&runner))?;

    let (data, errors) = execute(
        &schema,
        &format!(r#"mutation {{ deleteCompany(id: "{}") {{ id name }} }}"#, GLOBEX_ID),
    )
    .await;
    assert!(errors.is_empty(), "{:?}", errors);
    assert_eq!(data["deleteCompany"]["name"], json!("Globex"));

    let (data, errors) = execute(
        &schema,
        r#"mutation { createCompany(data: { name: "Initech" }) { name } }"#,
    )
    .await;
    assert!(errors.is_empty(), "{:?}", errors);
    assert_eq!(data["createCompany"]["name"], json!("Initech"));

    let methods: Vec<ResolverMethod> = runner.calls().iter().map(|c| c.method).collect();
    assert_eq!(
        methods,
        vec![ResolverMethod::DeleteOne, ResolverMethod::CreateOne]
    );
    let names: Vec<String> = runner
        .records("company")
        .iter()
        .filter_map(|r| r.get("name").and_then(Value::as_str).map(str::to_string))
        .collect();
    assert_eq!(names, vec!["Acme", "Initech"]);
    Ok(())
}

#[tokio::test]
async fn test_missing_record_surfaces_not_found() -> ApiResult<()> {
    let schema = build(standard_workspace()?, runner())?;
    let (_, errors) = execute(
        &schema,
        &format!(r#"mutation {{ deleteCompany(id: "{}") {{ id }} }}"#, Uuid::nil()),
    )
    .await;
    assert_eq!(errors.len(), 1);
    assert!(errors[0].contains("not found"), "{}", errors[0]);
    Ok(())
}

#[tokio::test]
async fn test_resolvers_require_matching_workspace() -> ApiResult<()> {
    let schema = build(standard_workspace()?, runner())?;

    let response = schema.execute(Request::new("{ companies { totalCount } }")).await;
    assert_eq!(response.errors.len(), 1);
    assert!(response.errors[0].message.contains("Workspace context required"));

    let other = WorkspaceContext {
        workspace_id: Uuid::now_v7(),
        user_id: None,
    };
    let response = schema
        .execute(Request::new("{ companies { totalCount } }").data(other))
        .await;
    assert_eq!(response.errors.len(), 1);
    assert!(response.errors[0].message.contains("cannot serve"));
    Ok(())
}

#[tokio::test]
async fn test_invalid_filter_field_is_rejected() -> ApiResult<()> {
    let schema = build(standard_workspace()?, runner())?;
    let (_, errors) = execute(&schema, r#"{ companies(filter: { nope: { eq: "x" } }) { totalCount } }"#).await;
    assert_eq!(errors.len(), 1);
    Ok(())
}

// ============================================================================
// SCHEMA CACHE
// ============================================================================

fn cache(capacity: usize) -> WorkspaceSchemaCache {
    WorkspaceSchemaCache::new(WorkspaceSchemaBuilder::new(runner()), capacity)
}

#[tokio::test]
async fn test_cache_rebuilds_on_newer_version() -> ApiResult<()> {
    let store = InMemoryMetadataStore::new(false);
    store.insert(standard_workspace()?);
    let cache = cache(8);

    let first = cache.get_or_build(store.workspace(WORKSPACE_ID).await?).await?;
    assert!(!first.sdl().contains("calendarChannels"));
    let again = cache.get_or_build(store.workspace(WORKSPACE_ID).await?).await?;
    assert_eq!(first.sdl(), again.sdl());
    assert_eq!(cache.len().await, 1);

    let updated = store
        .set_feature_flag(WORKSPACE_ID, FeatureFlagKey::IsCalendarEnabled, true)
        .await?;
    let rebuilt = cache.get_or_build(updated).await?;
    assert!(rebuilt.sdl().contains("calendarChannels"));
    assert_eq!(cache.len().await, 1);
    Ok(())
}

#[tokio::test]
async fn test_cache_evicts_oldest_at_capacity() -> ApiResult<()> {
    let cache = cache(1);
    let other = Uuid::now_v7();
    cache.get_or_build(Arc::new(standard_workspace()?)).await?;
    cache
        .get_or_build(Arc::new(
            crm_core::standard_objects::standard_workspace(other, [])?,
        ))
        .await?;
    assert_eq!(cache.len().await, 1);
    Ok(())
}

#[tokio::test]
async fn test_metadata_events_invalidate_cache() -> ApiResult<()> {
    let store = InMemoryMetadataStore::new(false);
    store.insert(standard_workspace()?);
    let cache = Arc::new(cache(8));
    let listener = Arc::clone(&cache).spawn_invalidation_listener(store.subscribe());

    cache.get_or_build(store.workspace(WORKSPACE_ID).await?).await?;
    assert_eq!(cache.len().await, 1);

    store
        .set_feature_flag(WORKSPACE_ID, FeatureFlagKey::IsMessagingEnabled, true)
        .await?;
    for _ in 0..50 {
        if cache.is_empty().await {
            break;
        }
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    }
    assert!(cache.is_empty().await);
    listener.abort();
    Ok(())
}
