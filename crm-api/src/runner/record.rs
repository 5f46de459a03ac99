//! Record validation for writes
//!
//! Incoming record data is checked against the object's visible fields and
//! normalized (UUIDs hyphenated, timestamps RFC 3339) before it reaches SQL.

use crate::error::{ApiError, ApiResult};
use crate::runner::sql::parse_timestamp;
use crm_core::{FieldMetadata, FieldMetadataType, ObjectMetadataItem, RecordData, ID_FIELD};
use serde_json::Value;
use uuid::Uuid;

/// Validates a create payload, generating the id and applying defaults.
pub fn prepare_create(object: &ObjectMetadataItem, data: RecordData) -> ApiResult<RecordData> {
    let mut record = RecordData::new();
    for (name, value) in data {
        let field = writable_field(object, &name)?;
        let value = coerce_value(object, field, value)?;
        record.insert(name, value);
    }

    if record.get(ID_FIELD).map_or(true, Value::is_null) {
        record.insert(ID_FIELD.to_string(), Value::String(Uuid::now_v7().to_string()));
    }

    for field in object.column_fields() {
        if record.contains_key(&field.name) || field.is_read_only() {
            continue;
        }
        match &field.default_value {
            Some(default) => {
                let value = coerce_value(object, field, default.clone())?;
                record.insert(field.name.clone(), value);
            }
            None if !field.is_optional_on_create() => {
                return Err(ApiError::missing_field(&object.name_singular, &field.name));
            }
            None => {}
        }
    }
    Ok(record)
}

/// Validates a partial update. The id cannot change.
pub fn prepare_update(object: &ObjectMetadataItem, data: RecordData) -> ApiResult<RecordData> {
    let mut record = RecordData::new();
    for (name, value) in data {
        if name == ID_FIELD {
            return Err(ApiError::invalid_input(format!(
                "Field '{}' of '{}' cannot be updated",
                ID_FIELD, object.name_singular
            )));
        }
        let field = writable_field(object, &name)?;
        let value = coerce_value(object, field, value)?;
        record.insert(name, value);
    }
    Ok(record)
}

fn writable_field<'a>(object: &'a ObjectMetadataItem, name: &str) -> ApiResult<&'a FieldMetadata> {
    let field = object
        .field(name)
        .ok_or_else(|| ApiError::field_not_found(&object.name_singular, name))?;
    if field.is_read_only() {
        return Err(ApiError::invalid_input(format!(
            "Field '{}' of '{}' is read-only",
            name, object.name_singular
        )));
    }
    if field.is_relation() {
        let hint = object
            .relation_for_field(name)
            .filter(|link| link.owns_join_column)
            .map(|link| format!(", set '{}' instead", link.relation.join_column()))
            .unwrap_or_default();
        return Err(ApiError::invalid_input(format!(
            "Field '{}' of '{}' is a relation{}",
            name, object.name_singular, hint
        )));
    }
    Ok(field)
}

/// Checks `value` against the field type and returns its canonical form.
pub fn coerce_value(
    object: &ObjectMetadataItem,
    field: &FieldMetadata,
    value: Value,
) -> ApiResult<Value> {
    if value.is_null() {
        if field.is_nullable {
            return Ok(Value::Null);
        }
        return Err(ApiError::validation_failed(format!(
            "Field '{}' of '{}' cannot be null",
            field.name, object.name_singular
        )));
    }

    let name = field.name.as_str();
    match field.field_type {
        FieldMetadataType::Uuid => value
            .as_str()
            .and_then(|s| Uuid::parse_str(s.trim()).ok())
            .map(|id| Value::String(id.to_string()))
            .ok_or_else(|| ApiError::invalid_format(name, "a UUID")),
        FieldMetadataType::Text | FieldMetadataType::Email | FieldMetadataType::Phone => {
            match value {
                Value::String(_) => Ok(value),
                _ => Err(ApiError::invalid_format(name, "a string")),
            }
        }
        FieldMetadataType::Number | FieldMetadataType::Position => match value {
            Value::Number(_) => Ok(value),
            _ => Err(ApiError::invalid_format(name, "a number")),
        },
        FieldMetadataType::Boolean => match value {
            Value::Bool(_) => Ok(value),
            _ => Err(ApiError::invalid_format(name, "a boolean")),
        },
        FieldMetadataType::DateTime => value
            .as_str()
            .and_then(parse_timestamp)
            .map(|ts| Value::String(ts.to_rfc3339()))
            .ok_or_else(|| ApiError::invalid_format(name, "an ISO 8601 date-time")),
        FieldMetadataType::Select => match value.as_str() {
            Some(option) if field.has_option(option) => Ok(value),
            _ => {
                let allowed: Vec<&str> = field.options.iter().map(|o| o.value.as_str()).collect();
                Err(ApiError::validation_failed(format!(
                    "Value {} is not an option of '{}'. Allowed: {}",
                    value,
                    name,
                    allowed.join(", ")
                )))
            }
        },
        FieldMetadataType::RawJson => Ok(value),
        FieldMetadataType::Relation => Err(ApiError::invalid_input(format!(
            "Field '{}' is a relation",
            name
        ))),
    }
}
