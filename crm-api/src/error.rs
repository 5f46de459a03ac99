//! Error Types for the CRM API
//!
//! This module defines error handling for the API layer, including:
//! - ApiError struct for structured error responses
//! - ErrorCode enum for categorizing errors
//! - IntoResponse implementation for Axum HTTP responses
//! - Conversions from query-builder, metadata and database errors
//!
//! All errors are serialized as JSON with appropriate HTTP status codes.
//! GraphQL resolvers surface the same code as an error extension.

use async_graphql::ErrorExtensions;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use crm_core::{CursorError, MetadataError};
use crm_query::QueryBuilderError;
use serde::{Deserialize, Serialize};
use std::fmt;

// ============================================================================
// ERROR CODE ENUM
// ============================================================================

/// Error codes for API responses.
///
/// Each error code maps to a specific HTTP status code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    // ========================================================================
    // Authentication Errors (401, 403)
    // ========================================================================
    /// Request carries no workspace context
    Unauthorized,

    /// Request is not allowed to touch the resource
    Forbidden,

    // ========================================================================
    // Validation Errors (400)
    // ========================================================================
    /// Request validation failed
    ValidationFailed,

    /// Request contains invalid input data
    InvalidInput,

    /// Required field is missing from request
    MissingField,

    /// Field value is out of valid range
    InvalidRange,

    /// Field format is incorrect
    InvalidFormat,

    /// `filter` expression or argument could not be used
    InvalidFilter,

    /// `order_by` expression or argument could not be used
    InvalidOrderBy,

    /// Pagination cursor could not be decoded
    InvalidCursor,

    /// Field does not exist on the target object
    FieldNotFound,

    // ========================================================================
    // Not Found Errors (404)
    // ========================================================================
    /// Requested record does not exist
    RecordNotFound,

    /// Requested object does not exist or is disabled
    ObjectNotFound,

    /// Requested workspace does not exist
    WorkspaceNotFound,

    // ========================================================================
    // Conflict Errors (409)
    // ========================================================================
    /// Entity with the same identifier already exists
    EntityAlreadyExists,

    /// Dependents block the operation
    RelationRestricted,

    /// Operation conflicts with current state
    StateConflict,

    // ========================================================================
    // Server Errors (500, 503)
    // ========================================================================
    /// Internal server error
    InternalError,

    /// Database operation failed
    DatabaseError,

    /// Workspace schema could not be generated
    SchemaBuildFailed,

    /// Service is temporarily unavailable
    ServiceUnavailable,

    /// Database connection pool exhausted
    ConnectionPoolExhausted,

    /// Operation timed out
    Timeout,
}

impl ErrorCode {
    /// Get the HTTP status code for this error code.
    pub fn status_code(&self) -> StatusCode {
        match self {
            ErrorCode::Unauthorized => StatusCode::UNAUTHORIZED,
            ErrorCode::Forbidden => StatusCode::FORBIDDEN,

            ErrorCode::ValidationFailed
            | ErrorCode::InvalidInput
            | ErrorCode::MissingField
            | ErrorCode::InvalidRange
            | ErrorCode::InvalidFormat
            | ErrorCode::InvalidFilter
            | ErrorCode::InvalidOrderBy
            | ErrorCode::InvalidCursor
            | ErrorCode::FieldNotFound => StatusCode::BAD_REQUEST,

            ErrorCode::RecordNotFound | ErrorCode::ObjectNotFound | ErrorCode::WorkspaceNotFound => {
                StatusCode::NOT_FOUND
            }

            ErrorCode::EntityAlreadyExists
            | ErrorCode::RelationRestricted
            | ErrorCode::StateConflict => StatusCode::CONFLICT,

            ErrorCode::ServiceUnavailable | ErrorCode::ConnectionPoolExhausted => {
                StatusCode::SERVICE_UNAVAILABLE
            }

            ErrorCode::Timeout => StatusCode::GATEWAY_TIMEOUT,

            ErrorCode::InternalError | ErrorCode::DatabaseError | ErrorCode::SchemaBuildFailed => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Get a default message for this error code.
    pub fn default_message(&self) -> &'static str {
        match self {
            ErrorCode::Unauthorized => "Workspace context required",
            ErrorCode::Forbidden => "Access forbidden",

            ErrorCode::ValidationFailed => "Request validation failed",
            ErrorCode::InvalidInput => "Invalid input data",
            ErrorCode::MissingField => "Required field is missing",
            ErrorCode::InvalidRange => "Value is out of valid range",
            ErrorCode::InvalidFormat => "Invalid format",
            ErrorCode::InvalidFilter => "Invalid filter",
            ErrorCode::InvalidOrderBy => "Invalid order by",
            ErrorCode::InvalidCursor => "Invalid cursor",
            ErrorCode::FieldNotFound => "Field not found",

            ErrorCode::RecordNotFound => "Record not found",
            ErrorCode::ObjectNotFound => "Object not found",
            ErrorCode::WorkspaceNotFound => "Workspace not found",

            ErrorCode::EntityAlreadyExists => "Entity already exists",
            ErrorCode::RelationRestricted => "Related records prevent this operation",
            ErrorCode::StateConflict => "Operation conflicts with current state",

            ErrorCode::InternalError => "Internal server error",
            ErrorCode::DatabaseError => "Database operation failed",
            ErrorCode::SchemaBuildFailed => "Workspace schema could not be generated",
            ErrorCode::ServiceUnavailable => "Service temporarily unavailable",
            ErrorCode::ConnectionPoolExhausted => "Connection pool exhausted",
            ErrorCode::Timeout => "Operation timed out",
        }
    }

    /// Wire name, e.g. `INVALID_FILTER`.
    pub fn wire_name(&self) -> String {
        serde_json::to_value(self)
            .ok()
            .and_then(|v| v.as_str().map(str::to_string))
            .unwrap_or_else(|| self.to_string())
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

// ============================================================================
// API ERROR STRUCT
// ============================================================================

/// Structured error response for API operations.
///
/// The same shape is returned by the REST, GraphQL and metadata surfaces.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiError {
    /// Error code categorizing the error
    pub code: ErrorCode,

    /// Human-readable error message
    pub message: String,

    /// Optional additional details
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl ApiError {
    /// Create a new API error with the given code and message.
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            details: None,
        }
    }

    /// Create a new API error with the given code, using the default message.
    pub fn from_code(code: ErrorCode) -> Self {
        Self {
            code,
            message: code.default_message().to_string(),
            details: None,
        }
    }

    /// Add additional details to the error.
    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }

    /// Get the HTTP status code for this error.
    pub fn status_code(&self) -> StatusCode {
        self.code.status_code()
    }

    // ========================================================================
    // Convenience constructors for common errors
    // ========================================================================

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Unauthorized, message)
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Forbidden, message)
    }

    pub fn validation_failed(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::ValidationFailed, message)
    }

    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidInput, message)
    }

    /// Create a MissingField error.
    pub fn missing_field(object: &str, field: &str) -> Self {
        Self::new(
            ErrorCode::MissingField,
            format!("Required field '{}' is missing for '{}'", field, object),
        )
    }

    /// Create an InvalidFormat error.
    pub fn invalid_format(field: &str, expected: &str) -> Self {
        Self::new(
            ErrorCode::InvalidFormat,
            format!("Field '{}' has invalid format, expected {}", field, expected),
        )
    }

    pub fn invalid_filter(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidFilter, message)
    }

    pub fn invalid_order_by(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidOrderBy, message)
    }

    /// Create a FieldNotFound error.
    pub fn field_not_found(object: &str, field: &str) -> Self {
        Self::new(
            ErrorCode::FieldNotFound,
            format!("field '{}' does not exist in '{}' object", field, object),
        )
    }

    /// Create a RecordNotFound error.
    pub fn record_not_found(object: &str, id: impl fmt::Display) -> Self {
        Self::new(
            ErrorCode::RecordNotFound,
            format!("{} with id {} not found", object, id),
        )
    }

    pub fn object_not_found(object: &str) -> Self {
        Self::new(
            ErrorCode::ObjectNotFound,
            format!("object '{}' not found", object),
        )
    }

    pub fn workspace_not_found(workspace_id: impl fmt::Display) -> Self {
        Self::new(
            ErrorCode::WorkspaceNotFound,
            format!("Workspace {} not found", workspace_id),
        )
    }

    pub fn entity_already_exists(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::EntityAlreadyExists, message)
    }

    /// Create a RelationRestricted error.
    pub fn relation_restricted(object: &str, dependent: &str) -> Self {
        Self::new(
            ErrorCode::RelationRestricted,
            format!(
                "Cannot delete {} while related {} records exist",
                object, dependent
            ),
        )
    }

    pub fn internal_error(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InternalError, message)
    }

    pub fn database_error(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::DatabaseError, message)
    }

    pub fn schema_build_failed(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::SchemaBuildFailed, message)
    }

    pub fn service_unavailable(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::ServiceUnavailable, message)
    }

    pub fn connection_pool_exhausted() -> Self {
        Self::from_code(ErrorCode::ConnectionPoolExhausted)
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

impl std::error::Error for ApiError {}

// ============================================================================
// AXUM INTEGRATION
// ============================================================================

/// Allows ApiError to be returned directly from Axum handlers.
impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_client_error() {
            tracing::warn!(code = %self.code, message = %self.message, "Request rejected");
        }
        let body = Json(self);
        (status, body).into_response()
    }
}

// ============================================================================
// GRAPHQL INTEGRATION
// ============================================================================

impl From<ApiError> for async_graphql::Error {
    fn from(err: ApiError) -> Self {
        let code = err.code.wire_name();
        let details = err.details.clone();
        async_graphql::Error::new(err.message).extend_with(move |_, extensions| {
            extensions.set("code", code);
            if let Some(details) = details.and_then(|d| async_graphql::Value::from_json(d).ok()) {
                extensions.set("details", details);
            }
        })
    }
}

impl From<async_graphql::dynamic::SchemaError> for ApiError {
    fn from(err: async_graphql::dynamic::SchemaError) -> Self {
        tracing::error!("Schema generation error: {}", err.0);
        ApiError::schema_build_failed(err.0)
    }
}

// ============================================================================
// CONVERSIONS FROM DOMAIN ERRORS
// ============================================================================

impl From<QueryBuilderError> for ApiError {
    fn from(err: QueryBuilderError) -> Self {
        let code = match &err {
            QueryBuilderError::UnparsableFilter { .. }
            | QueryBuilderError::InvalidFilterClause { .. }
            | QueryBuilderError::NotArity { .. }
            | QueryBuilderError::InvalidOperator { .. }
            | QueryBuilderError::InvalidFilterValue { .. } => ErrorCode::InvalidFilter,
            QueryBuilderError::InvalidOrderByDirection { .. } => ErrorCode::InvalidOrderBy,
            QueryBuilderError::FieldNotFound { .. } => ErrorCode::FieldNotFound,
            QueryBuilderError::InvalidLimit { .. } | QueryBuilderError::InvalidDepth { .. } => {
                ErrorCode::InvalidRange
            }
            QueryBuilderError::InvalidCursor(_) => ErrorCode::InvalidCursor,
            QueryBuilderError::ObjectNotFound { .. } => ErrorCode::ObjectNotFound,
            QueryBuilderError::InvalidId { .. } => ErrorCode::InvalidFormat,
            QueryBuilderError::MissingId { .. } => ErrorCode::MissingField,
            QueryBuilderError::InvalidPath { .. } | QueryBuilderError::InvalidBody { .. } => {
                ErrorCode::InvalidInput
            }
        };
        ApiError::new(code, err.to_string())
    }
}

impl From<MetadataError> for ApiError {
    fn from(err: MetadataError) -> Self {
        let code = match &err {
            MetadataError::DuplicateObject { .. } | MetadataError::DuplicateField { .. } => {
                ErrorCode::EntityAlreadyExists
            }
            MetadataError::UnknownObject { .. } => ErrorCode::ObjectNotFound,
            _ => ErrorCode::ValidationFailed,
        };
        ApiError::new(code, err.to_string())
    }
}

impl From<CursorError> for ApiError {
    fn from(err: CursorError) -> Self {
        ApiError::new(ErrorCode::InvalidCursor, err.to_string())
    }
}

// ============================================================================
// CONVERSIONS FROM STANDARD ERRORS
// ============================================================================

/// Convert from tokio_postgres::Error to ApiError.
impl From<tokio_postgres::Error> for ApiError {
    fn from(err: tokio_postgres::Error) -> Self {
        use tokio_postgres::error::SqlState;

        if let Some(state) = err.code() {
            if state == &SqlState::UNIQUE_VIOLATION {
                return ApiError::entity_already_exists("A record with this id already exists");
            }
            if state == &SqlState::FOREIGN_KEY_VIOLATION {
                return ApiError::new(
                    ErrorCode::StateConflict,
                    "Referenced record does not exist",
                );
            }
            if state == &SqlState::NOT_NULL_VIOLATION {
                return ApiError::validation_failed("A required field is null");
            }
            if state == &SqlState::UNDEFINED_TABLE || state == &SqlState::INVALID_SCHEMA_NAME {
                tracing::error!("Workspace storage missing: {:?}", err);
                return ApiError::service_unavailable("Workspace storage is not provisioned");
            }
        }

        // Log the full error for debugging
        tracing::error!("Database error: {:?}", err);

        // Return a generic database error to avoid leaking internal details
        ApiError::database_error("Database operation failed")
    }
}

/// Convert from deadpool_postgres::PoolError to ApiError.
impl From<deadpool_postgres::PoolError> for ApiError {
    fn from(err: deadpool_postgres::PoolError) -> Self {
        tracing::error!("Connection pool error: {:?}", err);

        match err {
            deadpool_postgres::PoolError::Timeout(_) => ApiError::connection_pool_exhausted(),
            deadpool_postgres::PoolError::Closed => {
                ApiError::service_unavailable("Database connection pool is closed")
            }
            _ => ApiError::database_error("Failed to acquire database connection"),
        }
    }
}

/// Convert from serde_json::Error to ApiError.
impl From<serde_json::Error> for ApiError {
    fn from(err: serde_json::Error) -> Self {
        tracing::error!("JSON serialization error: {:?}", err);
        ApiError::invalid_input(format!("Invalid JSON: {}", err))
    }
}

impl From<serde_yaml::Error> for ApiError {
    fn from(err: serde_yaml::Error) -> Self {
        ApiError::invalid_input(format!("Invalid workspace manifest: {}", err))
    }
}

/// Convert from uuid::Error to ApiError.
impl From<uuid::Error> for ApiError {
    fn from(err: uuid::Error) -> Self {
        ApiError::invalid_format("id", &format!("valid UUID: {}", err))
    }
}

// ============================================================================
// RESULT TYPE ALIAS
// ============================================================================

/// Result type alias for API operations.
pub type ApiResult<T> = Result<T, ApiError>;
