//! Dynamic GraphQL per workspace
//!
//! Types and root fields are generated from workspace metadata, resolvers
//! dispatch to the [`WorkspaceQueryRunner`](crate::runner::WorkspaceQueryRunner),
//! and built schemas are cached by workspace and metadata version.

pub mod args;
pub mod cache;
pub mod resolvers;
pub mod root;
pub mod schema;
pub mod types;

pub use cache::WorkspaceSchemaCache;
pub use resolvers::{ResolverFactories, ResolverFactory, ResolverFactoryContext};
pub use root::{RootKind, RootTypeFactory};
pub use schema::{SchemaOptions, WorkspaceSchemaBuilder};
