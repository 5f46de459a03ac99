//! Resolver factories
//!
//! One stateless factory per resolver method, registered in
//! [`ResolverFactories`] under the method name. `create` closes over the
//! object being built and returns the resolver; the resolver converts its
//! arguments and delegates to the query runner.

pub mod mutation;
pub mod query;
pub mod relation;

use crate::error::{ApiError, ApiResult};
use crate::middleware::WorkspaceContext;
use crate::runner::{QueryInfo, WorkspaceQueryRunner, WorkspaceQueryRunnerOptions};
use async_graphql::dynamic::{FieldFuture, FieldValue, ResolverContext};
use crm_core::{ObjectMetadataItem, RecordData, ResolverMethod, WorkspaceMetadata};
use std::collections::BTreeMap;
use std::sync::Arc;

pub use mutation::{
    CreateManyResolverFactory, CreateOneResolverFactory, DeleteManyResolverFactory,
    DeleteOneResolverFactory, UpdateManyResolverFactory, UpdateOneResolverFactory,
};
pub use query::{FindManyResolverFactory, FindOneResolverFactory};

/// A root or relation field resolver.
pub type Resolver = Arc<dyn for<'a> Fn(ResolverContext<'a>) -> FieldFuture<'a> + Send + Sync>;

/// Boxes a closure as a [`Resolver`].
pub fn resolver<F>(f: F) -> Resolver
where
    F: for<'a> Fn(ResolverContext<'a>) -> FieldFuture<'a> + Send + Sync + 'static,
{
    Arc::new(f)
}

/// What a factory closes over when creating a resolver.
#[derive(Clone)]
pub struct ResolverFactoryContext {
    /// Target object, projected to its enabled fields.
    pub object: Arc<ObjectMetadataItem>,
    pub metadata: Arc<WorkspaceMetadata>,
    pub runner: Arc<dyn WorkspaceQueryRunner>,
}

impl ResolverFactoryContext {
    pub fn new(
        object: &ObjectMetadataItem,
        metadata: Arc<WorkspaceMetadata>,
        runner: Arc<dyn WorkspaceQueryRunner>,
    ) -> Self {
        Self {
            object: Arc::new(metadata.visible_object(object)),
            metadata,
            runner,
        }
    }

    /// Context for another enabled object of the same workspace.
    pub fn for_object(&self, name_singular: &str) -> Option<Self> {
        self.metadata
            .object(name_singular)
            .filter(|o| self.metadata.is_object_enabled(o))
            .map(|o| Self::new(o, Arc::clone(&self.metadata), Arc::clone(&self.runner)))
    }

    /// Runner options for the field being resolved.
    ///
    /// Fails when the request carries no workspace context or targets
    /// another workspace than the one this schema was built for.
    pub fn options(&self, ctx: &ResolverContext<'_>) -> ApiResult<WorkspaceQueryRunnerOptions> {
        let request = ctx
            .data::<WorkspaceContext>()
            .map_err(|_| ApiError::unauthorized("Workspace context required"))?;
        if request.workspace_id != self.metadata.workspace_id {
            return Err(ApiError::forbidden(format!(
                "Schema of workspace {} cannot serve workspace {}",
                self.metadata.workspace_id, request.workspace_id
            )));
        }
        Ok(WorkspaceQueryRunnerOptions::new(
            Arc::clone(&self.object),
            Arc::clone(&self.metadata),
            request.user_id,
        )
        .with_info(query_info(ctx)))
    }
}

pub fn query_info(ctx: &ResolverContext<'_>) -> QueryInfo {
    let field = ctx.field();
    QueryInfo {
        field_name: field.name().to_string(),
        path: ctx
            .path_node
            .map(|node| node.to_string_vec().join("."))
            .unwrap_or_default(),
        selection: field
            .selection_set()
            .map(|selected| selected.name().to_string())
            .collect(),
    }
}

pub fn record_value<'a>(record: RecordData) -> FieldValue<'a> {
    FieldValue::owned_any(record)
}

pub fn records_value<'a>(records: Vec<RecordData>) -> FieldValue<'a> {
    FieldValue::list(records.into_iter().map(record_value))
}

// ============================================================================
// FACTORY TRAIT AND DISPATCH TABLE
// ============================================================================

pub trait ResolverFactory: Send + Sync {
    fn method(&self) -> ResolverMethod;

    /// Creates the resolver. Performs no I/O and cannot fail; errors
    /// surface when the resolver runs.
    fn create(&self, context: ResolverFactoryContext) -> Resolver;
}

/// Dispatch table from method name to factory.
#[derive(Clone)]
pub struct ResolverFactories {
    factories: BTreeMap<ResolverMethod, Arc<dyn ResolverFactory>>,
}

impl ResolverFactories {
    pub fn empty() -> Self {
        Self {
            factories: BTreeMap::new(),
        }
    }

    /// Registers `factory` under its method, replacing any previous one.
    pub fn register(&mut self, factory: Arc<dyn ResolverFactory>) {
        self.factories.insert(factory.method(), factory);
    }

    pub fn get(&self, method: ResolverMethod) -> Option<&Arc<dyn ResolverFactory>> {
        self.factories.get(&method)
    }

    /// Looks a factory up by method name, e.g. `"deleteOne"`.
    pub fn by_name(&self, name: &str) -> Option<&Arc<dyn ResolverFactory>> {
        name.parse::<ResolverMethod>()
            .ok()
            .and_then(|method| self.get(method))
    }

    pub fn methods(&self) -> impl Iterator<Item = ResolverMethod> + '_ {
        self.factories.keys().copied()
    }
}

impl Default for ResolverFactories {
    fn default() -> Self {
        let mut factories = Self::empty();
        let all: [Arc<dyn ResolverFactory>; 8] = [
            Arc::new(FindManyResolverFactory),
            Arc::new(FindOneResolverFactory),
            Arc::new(CreateManyResolverFactory),
            Arc::new(CreateOneResolverFactory),
            Arc::new(UpdateOneResolverFactory),
            Arc::new(UpdateManyResolverFactory),
            Arc::new(DeleteOneResolverFactory),
            Arc::new(DeleteManyResolverFactory),
        ];
        for factory in all {
            factories.register(factory);
        }
        factories
    }
}
