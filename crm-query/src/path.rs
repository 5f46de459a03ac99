//! `/rest/<objectPlural>[/<id>]` path handling.

use crate::error::{QueryBuilderError, QueryBuilderResult};
use crm_core::{ObjectMetadataItem, WorkspaceMetadata};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RestPath {
    pub object_plural: String,
    pub id: Option<String>,
}

pub fn parse_rest_path(path: &str) -> QueryBuilderResult<RestPath> {
    let trimmed = path.trim_matches('/');
    let trimmed = trimmed.strip_prefix("rest/").unwrap_or(trimmed);
    let segments: Vec<&str> = trimmed.split('/').filter(|s| !s.is_empty()).collect();
    match segments.as_slice() {
        [object] if *object != "rest" => Ok(RestPath {
            object_plural: object.to_string(),
            id: None,
        }),
        [object, id] => Ok(RestPath {
            object_plural: object.to_string(),
            id: Some(id.to_string()),
        }),
        _ => Err(QueryBuilderError::InvalidPath {
            path: path.to_string(),
        }),
    }
}

/// Looks up an enabled object by plural name, projected to its enabled
/// fields.
pub fn resolve_object(
    metadata: &WorkspaceMetadata,
    object_plural: &str,
) -> QueryBuilderResult<ObjectMetadataItem> {
    if let Some(object) = metadata.visible_object_by_plural(object_plural) {
        return Ok(object);
    }
    let hint = metadata
        .object(object_plural)
        .filter(|o| metadata.is_object_enabled(o))
        .map(|o| format!(". Did you mean '{}'?", o.name_plural))
        .unwrap_or_default();
    Err(QueryBuilderError::ObjectNotFound {
        name: object_plural.to_string(),
        hint,
    })
}

pub fn parse_record_id(raw: &str) -> QueryBuilderResult<Uuid> {
    Uuid::parse_str(raw).map_err(|_| QueryBuilderError::InvalidId { id: raw.to_string() })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crm_core::{standard_objects, FeatureFlagKey, MetadataError};

    #[test]
    fn test_parse_rest_path() -> QueryBuilderResult<()> {
        assert_eq!(
            parse_rest_path("/rest/companies")?,
            RestPath {
                object_plural: "companies".to_string(),
                id: None
            }
        );
        assert_eq!(
            parse_rest_path("/rest/companies/abc/")?.id,
            Some("abc".to_string())
        );
        assert_eq!(parse_rest_path("people")?.object_plural, "people");
        assert!(parse_rest_path("/rest").is_err());
        assert!(parse_rest_path("/rest/a/b/c").is_err());
        Ok(())
    }

    #[test]
    fn test_resolve_object_hints_plural() -> Result<(), MetadataError> {
        let metadata = standard_objects::standard_workspace(Uuid::nil(), [])?;
        assert!(resolve_object(&metadata, "companies").is_ok());
        assert_eq!(
            resolve_object(&metadata, "company").map_err(|e| e.to_string()),
            Err("object 'company' not found. Did you mean 'companies'?".to_string())
        );
        assert_eq!(
            resolve_object(&metadata, "widgets").map_err(|e| e.to_string()),
            Err("object 'widgets' not found".to_string())
        );
        Ok(())
    }

    #[test]
    fn test_gated_object_is_not_found() -> Result<(), MetadataError> {
        let metadata = standard_objects::standard_workspace(Uuid::nil(), [])?;
        assert!(resolve_object(&metadata, "calendarChannels").is_err());

        let metadata =
            standard_objects::standard_workspace(Uuid::nil(), [FeatureFlagKey::IsCalendarEnabled])?;
        assert!(resolve_object(&metadata, "calendarChannels").is_ok());
        Ok(())
    }

    #[test]
    fn test_parse_record_id() {
        assert!(parse_record_id("00000000-0000-0000-0000-000000000000").is_ok());
        assert!(matches!(
            parse_record_id("42"),
            Err(QueryBuilderError::InvalidId { .. })
        ));
    }
}
