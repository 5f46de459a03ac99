//! Error types for metadata and query value handling

use thiserror::Error;

/// Metadata model errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum MetadataError {
    #[error("Object '{name}' is defined more than once")]
    DuplicateObject { name: String },

    #[error("Field '{field}' is defined more than once on '{object}'")]
    DuplicateField { object: String, field: String },

    #[error("Invalid name '{name}': {reason}")]
    InvalidName { name: String, reason: String },

    #[error("Object '{name}' does not exist")]
    UnknownObject { name: String },

    #[error("Relation field '{field}' on '{object}' targets missing object '{target}'")]
    RelationTargetMissing {
        object: String,
        field: String,
        target: String,
    },

    #[error("Relation field '{field}' on '{object}' is inconsistent: {reason}")]
    InconsistentRelation {
        object: String,
        field: String,
        reason: String,
    },

    #[error("Relation field '{field}' on '{object}' has no relation metadata")]
    OrphanRelationField { object: String, field: String },

    #[error("Select field '{field}' on '{object}' has no options")]
    MissingSelectOptions { object: String, field: String },
}

/// Unrecognized textual form of an enum.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("Unknown {kind} '{value}'")]
pub struct ParseEnumError {
    pub kind: &'static str,
    pub value: String,
}

impl ParseEnumError {
    pub fn new(kind: &'static str, value: &str) -> Self {
        Self {
            kind,
            value: value.to_string(),
        }
    }
}

/// Cursor decoding errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CursorError {
    #[error("Cursor is not valid base64: {reason}")]
    InvalidEncoding { reason: String },

    #[error("Cursor payload is malformed: {reason}")]
    InvalidPayload { reason: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metadata_error_messages_name_the_offender() {
        let err = MetadataError::DuplicateField {
            object: "company".to_string(),
            field: "name".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Field 'name' is defined more than once on 'company'"
        );

        let err = MetadataError::RelationTargetMissing {
            object: "person".to_string(),
            field: "company".to_string(),
            target: "organization".to_string(),
        };
        assert!(err.to_string().contains("organization"));
    }
}
