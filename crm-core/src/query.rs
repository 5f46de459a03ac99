//! Query arguments, cursors and result shapes shared by the REST and GraphQL
//! surfaces.

use crate::error::{CursorError, ParseEnumError};
use crate::filter::FilterClause;
use crate::metadata::ObjectMetadataItem;
use crate::order_by::OrderBy;
use base64::engine::general_purpose::{STANDARD, URL_SAFE_NO_PAD};
use base64::Engine as _;
use convert_case::{Case, Casing};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// A record as a JSON object keyed by field name.
pub type RecordData = serde_json::Map<String, serde_json::Value>;

/// Number of records returned when no limit is given.
pub const DEFAULT_PAGE_SIZE: u32 = 60;
/// Largest page a single request may ask for.
pub const MAX_PAGE_SIZE: u32 = 200;
/// Relation levels embedded in REST responses by default.
pub const DEFAULT_DEPTH: u8 = 2;
pub const MAX_DEPTH: u8 = 2;

// ============================================================================
// CURSOR
// ============================================================================

/// Keyset position of a record within an ordering.
///
/// Encoded as base64 JSON so clients treat it as opaque.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Cursor {
    pub id: Uuid,
    /// Values of the ordering terms for this record, keyed by dotted path.
    #[serde(default)]
    pub order_values: serde_json::Map<String, serde_json::Value>,
}

impl Cursor {
    pub fn new(id: Uuid) -> Self {
        Self {
            id,
            order_values: serde_json::Map::new(),
        }
    }

    pub fn encode(&self) -> String {
        // Serializing a map of JSON values cannot fail.
        let json = serde_json::to_vec(self).unwrap_or_default();
        STANDARD.encode(json)
    }

    /// Accepts standard and URL-safe alphabets.
    pub fn decode(encoded: &str) -> Result<Self, CursorError> {
        let bytes = STANDARD
            .decode(encoded)
            .or_else(|_| URL_SAFE_NO_PAD.decode(encoded.trim_end_matches('=')))
            .map_err(|e| CursorError::InvalidEncoding {
                reason: e.to_string(),
            })?;
        serde_json::from_slice(&bytes).map_err(|e| CursorError::InvalidPayload {
            reason: e.to_string(),
        })
    }
}

// ============================================================================
// QUERY ARGS
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Pagination {
    pub first: Option<u32>,
    pub last: Option<u32>,
    pub after: Option<Cursor>,
    pub before: Option<Cursor>,
}

impl Pagination {
    pub fn first(limit: u32) -> Self {
        Self {
            first: Some(limit),
            ..Self::default()
        }
    }

    /// Backward pagination reads the ordering in reverse.
    pub fn is_backward(&self) -> bool {
        self.first.is_none() && (self.last.is_some() || self.before.is_some())
    }

    /// Page size with defaults and cap applied.
    pub fn page_size(&self) -> u32 {
        let requested = if self.is_backward() {
            self.last
        } else {
            self.first
        };
        requested.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE)
    }
}

/// Which fields a caller asked for.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum FieldSelection {
    #[default]
    All,
    Fields(BTreeSet<String>),
}

impl FieldSelection {
    pub fn includes(&self, field: &str) -> bool {
        match self {
            FieldSelection::All => true,
            FieldSelection::Fields(fields) => fields.contains(field),
        }
    }
}

/// Arguments of a read.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryArgs {
    pub filter: Option<FilterClause>,
    pub order_by: OrderBy,
    pub pagination: Pagination,
    /// Relation levels to embed in each record.
    pub depth: u8,
    pub selection: FieldSelection,
}

impl Default for QueryArgs {
    fn default() -> Self {
        Self {
            filter: None,
            order_by: OrderBy::new(),
            pagination: Pagination::default(),
            depth: 0,
            selection: FieldSelection::All,
        }
    }
}

impl QueryArgs {
    pub fn with_filter(filter: Option<FilterClause>) -> Self {
        Self {
            filter,
            ..Self::default()
        }
    }
}

// ============================================================================
// RESOLVER METHODS
// ============================================================================

/// Operations every object exposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ResolverMethod {
    FindMany,
    FindOne,
    CreateMany,
    CreateOne,
    UpdateOne,
    UpdateMany,
    DeleteOne,
    DeleteMany,
}

impl ResolverMethod {
    pub const ALL: [ResolverMethod; 8] = [
        ResolverMethod::FindMany,
        ResolverMethod::FindOne,
        ResolverMethod::CreateMany,
        ResolverMethod::CreateOne,
        ResolverMethod::UpdateOne,
        ResolverMethod::UpdateMany,
        ResolverMethod::DeleteOne,
        ResolverMethod::DeleteMany,
    ];

    pub const QUERIES: [ResolverMethod; 2] = [ResolverMethod::FindMany, ResolverMethod::FindOne];

    pub const MUTATIONS: [ResolverMethod; 6] = [
        ResolverMethod::CreateMany,
        ResolverMethod::CreateOne,
        ResolverMethod::UpdateOne,
        ResolverMethod::UpdateMany,
        ResolverMethod::DeleteOne,
        ResolverMethod::DeleteMany,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ResolverMethod::FindMany => "findMany",
            ResolverMethod::FindOne => "findOne",
            ResolverMethod::CreateMany => "createMany",
            ResolverMethod::CreateOne => "createOne",
            ResolverMethod::UpdateOne => "updateOne",
            ResolverMethod::UpdateMany => "updateMany",
            ResolverMethod::DeleteOne => "deleteOne",
            ResolverMethod::DeleteMany => "deleteMany",
        }
    }

    pub fn is_query(&self) -> bool {
        Self::QUERIES.contains(self)
    }

    /// Whether the method acts on a set of records rather than one.
    pub fn is_many(&self) -> bool {
        matches!(
            self,
            ResolverMethod::FindMany
                | ResolverMethod::CreateMany
                | ResolverMethod::UpdateMany
                | ResolverMethod::DeleteMany
        )
    }

    /// Root GraphQL field exposing this method for `object`:
    /// `companies`, `company`, `createCompanies`, `updateCompany`, ...
    pub fn root_field_name(&self, object: &ObjectMetadataItem) -> String {
        let name = if self.is_many() {
            &object.name_plural
        } else {
            &object.name_singular
        };
        let prefix = match self {
            ResolverMethod::FindMany | ResolverMethod::FindOne => return name.clone(),
            ResolverMethod::CreateMany | ResolverMethod::CreateOne => "create",
            ResolverMethod::UpdateOne | ResolverMethod::UpdateMany => "update",
            ResolverMethod::DeleteOne | ResolverMethod::DeleteMany => "delete",
        };
        format!("{}{}", prefix, name.to_case(Case::Pascal))
    }
}

impl fmt::Display for ResolverMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ResolverMethod {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|m| m.as_str() == s)
            .ok_or_else(|| ParseEnumError::new("resolver method", s))
    }
}

// ============================================================================
// STRUCTURED CALLS
// ============================================================================

/// A fully resolved operation on one object, ready for the query runner.
#[derive(Debug, Clone, PartialEq)]
pub enum WorkspaceQuery {
    FindMany(QueryArgs),
    FindOne(QueryArgs),
    CreateOne(RecordData),
    CreateMany(Vec<RecordData>),
    UpdateOne { id: Uuid, data: RecordData },
    DeleteOne { id: Uuid },
}

impl WorkspaceQuery {
    pub fn method(&self) -> ResolverMethod {
        match self {
            WorkspaceQuery::FindMany(_) => ResolverMethod::FindMany,
            WorkspaceQuery::FindOne(_) => ResolverMethod::FindOne,
            WorkspaceQuery::CreateOne(_) => ResolverMethod::CreateOne,
            WorkspaceQuery::CreateMany(_) => ResolverMethod::CreateMany,
            WorkspaceQuery::UpdateOne { .. } => ResolverMethod::UpdateOne,
            WorkspaceQuery::DeleteOne { .. } => ResolverMethod::DeleteOne,
        }
    }
}

// ============================================================================
// RESULTS
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageInfo {
    pub has_next_page: bool,
    pub has_previous_page: bool,
    pub start_cursor: Option<String>,
    pub end_cursor: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordEdge {
    pub node: RecordData,
    pub cursor: String,
}

/// A page of records.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordConnection {
    pub edges: Vec<RecordEdge>,
    pub page_info: PageInfo,
    pub total_count: i64,
}

impl RecordConnection {
    pub fn nodes(&self) -> impl Iterator<Item = &RecordData> {
        self.edges.iter().map(|edge| &edge.node)
    }

    pub fn into_nodes(self) -> Vec<RecordData> {
        self.edges.into_iter().map(|edge| edge.node).collect()
    }
}
