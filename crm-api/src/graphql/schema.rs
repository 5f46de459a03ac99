//! Workspace schema assembly
//!
//! A pure function from one workspace metadata snapshot to an executable
//! dynamic schema. Disabled objects and fields never reach the schema.

use crate::error::{ApiError, ApiResult};
use crate::graphql::resolvers::{ResolverFactories, ResolverFactoryContext};
use crate::graphql::root::{RootKind, RootTypeFactory};
use crate::graphql::types::{object_type_names, object_types, shared_type_names, shared_types};
use crate::runner::WorkspaceQueryRunner;
use async_graphql::dynamic::Schema;
use crm_core::{ResolverMethod, WorkspaceMetadata};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

/// Default nesting limit for GraphQL operations.
pub const DEFAULT_MAX_DEPTH: usize = 10;

/// Build-time knobs.
#[derive(Debug, Clone)]
pub struct SchemaOptions {
    pub max_depth: usize,
    /// Exposed root methods; both roots draw from this list.
    pub methods: Vec<ResolverMethod>,
}

impl Default for SchemaOptions {
    fn default() -> Self {
        Self {
            max_depth: DEFAULT_MAX_DEPTH,
            methods: ResolverMethod::ALL.to_vec(),
        }
    }
}

#[derive(Clone)]
pub struct WorkspaceSchemaBuilder {
    factories: Arc<ResolverFactories>,
    runner: Arc<dyn WorkspaceQueryRunner>,
    options: SchemaOptions,
}

impl WorkspaceSchemaBuilder {
    pub fn new(runner: Arc<dyn WorkspaceQueryRunner>) -> Self {
        Self {
            factories: Arc::new(ResolverFactories::default()),
            runner,
            options: SchemaOptions::default(),
        }
    }

    pub fn with_factories(mut self, factories: ResolverFactories) -> Self {
        self.factories = Arc::new(factories);
        self
    }

    pub fn with_options(mut self, options: SchemaOptions) -> Self {
        self.options = options;
        self
    }

    /// Builds the schema of `metadata`'s workspace.
    pub fn build(&self, metadata: Arc<WorkspaceMetadata>) -> ApiResult<Schema> {
        let contexts: Vec<ResolverFactoryContext> = metadata
            .enabled_objects()
            .map(|object| {
                ResolverFactoryContext::new(object, Arc::clone(&metadata), Arc::clone(&self.runner))
            })
            .collect();
        if contexts.is_empty() {
            return Err(ApiError::schema_build_failed(format!(
                "Workspace {} has no enabled objects",
                metadata.workspace_id
            )));
        }
        check_type_names(&contexts)?;

        let roots = RootTypeFactory::new(&self.factories);
        let query = roots.create(&contexts, &self.options.methods, RootKind::Query)?;
        let mutation = roots.create(&contexts, &self.options.methods, RootKind::Mutation)?;

        let mut builder = Schema::build(
            RootKind::Query.type_name(),
            Some(RootKind::Mutation.type_name()),
            None,
        )
        .register(query)
        .register(mutation);
        for shared in shared_types() {
            builder = builder.register(shared);
        }
        for context in &contexts {
            for generated in object_types(context) {
                builder = builder.register(generated);
            }
        }

        let schema = builder.limit_depth(self.options.max_depth).finish()?;
        debug!(
            workspace_id = %metadata.workspace_id,
            version = metadata.version,
            objects = contexts.len(),
            "Built workspace schema"
        );
        Ok(schema)
    }
}

/// Rejects objects whose generated type names clash with each other or
/// with the shared types.
fn check_type_names(contexts: &[ResolverFactoryContext]) -> ApiResult<()> {
    let mut owners: HashMap<String, String> = shared_type_names()
        .into_iter()
        .map(|name| (name.to_string(), "shared types".to_string()))
        .collect();

    for context in contexts {
        for name in object_type_names(&context.object) {
            if let Some(owner) = owners.get(&name) {
                return Err(ApiError::schema_build_failed(format!(
                    "Type '{}' of object '{}' collides with {}",
                    name, context.object.name_singular, owner
                )));
            }
            owners.insert(name, format!("object '{}'", context.object.name_singular));
        }
    }
    Ok(())
}
