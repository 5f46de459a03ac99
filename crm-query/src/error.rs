//! Errors raised while turning a REST request into a structured query.
//!
//! Messages are returned verbatim to API clients, so they name the offending
//! value and show the expected syntax.

use crm_core::CursorError;
use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum QueryBuilderError {
    #[error("'filter' unparsable. '{expression}' {reason}")]
    UnparsableFilter { expression: String, reason: String },

    #[error("'filter' invalid for '{clause}', use eg: 'field[eq]:value'")]
    InvalidFilterClause { clause: String },

    #[error("'filter' invalid. 'not' conjunction accepts exactly one clause, received {count}")]
    NotArity { count: usize },

    #[error("'filter' invalid for '{field}'. Operator '{operator}' is not allowed, use one of: {allowed}")]
    InvalidOperator {
        field: String,
        operator: String,
        allowed: String,
    },

    /// Value does not match what the operator or field type expects.
    #[error("{message}")]
    InvalidFilterValue { message: String },

    #[error("'order_by' direction '{direction}' invalid. Allowed values are 'AscNullsFirst', 'AscNullsLast', 'DescNullsFirst', 'DescNullsLast'. eg: ?order_by=field_1[AscNullsFirst],field_2[DescNullsLast],field_3")]
    InvalidOrderByDirection { direction: String },

    #[error("field '{field}' does not exist in '{object}' object")]
    FieldNotFound { field: String, object: String },

    #[error("limit '{value}' is invalid. Should be a positive integer")]
    InvalidLimit { value: String },

    #[error("'depth={value}' parameter invalid. Allowed values are 0, 1 or 2")]
    InvalidDepth { value: String },

    #[error("'last_cursor' invalid: {0}")]
    InvalidCursor(#[from] CursorError),

    #[error("object '{name}' not found{hint}")]
    ObjectNotFound { name: String, hint: String },

    #[error("path '{path}' invalid. eg: /rest/companies or /rest/companies/<id>")]
    InvalidPath { path: String },

    #[error("id '{id}' is not a valid UUID")]
    InvalidId { id: String },

    #[error("{method} requires a record id in the path")]
    MissingId { method: String },

    #[error("request body invalid: {reason}")]
    InvalidBody { reason: String },
}

impl QueryBuilderError {
    pub(crate) fn unparsable(expression: &str, reason: impl Into<String>) -> Self {
        QueryBuilderError::UnparsableFilter {
            expression: expression.to_string(),
            reason: reason.into(),
        }
    }

    pub(crate) fn field_not_found(field: &str, object: &str) -> Self {
        QueryBuilderError::FieldNotFound {
            field: field.to_string(),
            object: object.to_string(),
        }
    }
}

pub type QueryBuilderResult<T> = Result<T, QueryBuilderError>;
