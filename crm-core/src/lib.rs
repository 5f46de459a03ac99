//! CRM Core - Metadata and Query Types
//!
//! Pure data structures shared by the REST query builder and the API layer:
//! the per-workspace metadata model, standard objects, filter clauses,
//! ordering descriptors, cursors and query arguments.

pub mod error;
pub mod filter;
pub mod metadata;
pub mod order_by;
pub mod query;
pub mod standard_objects;

pub use error::{CursorError, MetadataError, ParseEnumError};
pub use filter::{Conjunction, FilterClause, FilterOperator, FilterValue, NullCheck};
pub use metadata::{
    FeatureFlagKey, FeatureFlags, FieldDefinition, FieldMetadata, FieldMetadataType,
    ObjectDefinition, ObjectMetadataBuilder, ObjectMetadataItem, OnDeleteAction,
    RelationDefinition, RelationDirection, RelationLink, RelationMetadata, RelationType,
    SelectOption, WorkspaceMetadata, WorkspaceMetadataBuilder, CREATED_AT_FIELD, ID_FIELD,
    UPDATED_AT_FIELD,
};
pub use order_by::{OrderBy, OrderByDirection, OrderByNode, OrderTerm};
pub use query::{
    Cursor, FieldSelection, PageInfo, Pagination, QueryArgs, RecordConnection, RecordData,
    RecordEdge, ResolverMethod, WorkspaceQuery, DEFAULT_DEPTH, DEFAULT_PAGE_SIZE, MAX_DEPTH,
    MAX_PAGE_SIZE,
};
