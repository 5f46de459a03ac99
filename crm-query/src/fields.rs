//! Field existence checks against object metadata.

use crate::error::{QueryBuilderError, QueryBuilderResult};
use crm_core::{FieldMetadata, ObjectMetadataItem};

/// Fails on the first name that is not a field of `object`.
pub fn check_fields<'a>(
    object: &ObjectMetadataItem,
    names: impl IntoIterator<Item = &'a str>,
) -> QueryBuilderResult<()> {
    for name in names {
        lookup_field(object, name)?;
    }
    Ok(())
}

pub(crate) fn lookup_field<'o>(
    object: &'o ObjectMetadataItem,
    name: &str,
) -> QueryBuilderResult<&'o FieldMetadata> {
    object
        .field(name)
        .ok_or_else(|| QueryBuilderError::field_not_found(name, &object.name_singular))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crm_core::standard_objects;

    #[test]
    fn test_check_fields_names_missing_field() {
        let company = standard_objects::company();
        assert!(check_fields(&company, ["name", "employees"]).is_ok());
        assert_eq!(
            check_fields(&company, ["name", "revenue"]).map_err(|e| e.to_string()),
            Err("field 'revenue' does not exist in 'company' object".to_string())
        );
    }
}
