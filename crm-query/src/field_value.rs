//! Conversion of raw filter values to typed comparison values.

use crate::error::{QueryBuilderError, QueryBuilderResult};
use crate::filter_content::split_top_level;
use crm_core::{FieldMetadataType, FilterOperator, FilterValue, NullCheck};
use std::borrow::Cow;

/// Removes one layer of matching single or double quotes. Inside them a
/// doubled quote of the same kind reads as one.
pub(crate) fn strip_quotes(value: &str) -> Cow<'_, str> {
    let bytes = value.as_bytes();
    if bytes.len() >= 2 {
        let (first, last) = (bytes[0], bytes[bytes.len() - 1]);
        if first == last && (first == b'"' || first == b'\'') {
            let inner = &value[1..value.len() - 1];
            let quote = char::from(first);
            let doubled = format!("{quote}{quote}");
            return if inner.contains(&doubled) {
                Cow::Owned(inner.replace(&doubled, &quote.to_string()))
            } else {
                Cow::Borrowed(inner)
            };
        }
    }
    Cow::Borrowed(value)
}

/// Converts a raw value into the representation its field type compares
/// with.
///
/// Unparsable numbers become `NaN` rather than an error; a filter comparing
/// against `NaN` matches nothing.
pub fn format_field_value(
    raw: &str,
    field_type: Option<FieldMetadataType>,
    operator: Option<FilterOperator>,
) -> QueryBuilderResult<FilterValue> {
    match operator {
        Some(FilterOperator::In) => format_list(raw, field_type),
        Some(FilterOperator::Is) => format_null_check(raw),
        _ => format_scalar(raw, field_type),
    }
}

fn format_list(raw: &str, field_type: Option<FieldMetadataType>) -> QueryBuilderResult<FilterValue> {
    let trimmed = raw.trim();
    let inner = trimmed
        .strip_prefix('[')
        .and_then(|rest| rest.strip_suffix(']'))
        .ok_or_else(|| QueryBuilderError::InvalidFilterValue {
            message: format!(
                "'filter' invalid for 'in' operator. Received '{}' but array value expected eg: 'field[in]:[value_1,value_2]'",
                raw
            ),
        })?;
    if inner.trim().is_empty() {
        return Ok(FilterValue::List(Vec::new()));
    }
    let items = split_top_level(inner).map_err(|reason| QueryBuilderError::InvalidFilterValue {
        message: format!("'filter' invalid for 'in' operator. '{}' {}", raw, reason),
    })?;
    items
        .into_iter()
        .map(|item| format_scalar(item.trim(), field_type))
        .collect::<QueryBuilderResult<Vec<_>>>()
        .map(FilterValue::List)
}

fn format_null_check(raw: &str) -> QueryBuilderResult<FilterValue> {
    let value = strip_quotes(raw.trim());
    NullCheck::parse(&value.to_uppercase())
        .map(|check| FilterValue::text(check.as_str()))
        .ok_or_else(|| QueryBuilderError::InvalidFilterValue {
            message: format!(
                "'filter' invalid for 'is' operator. Received '{}' but 'NULL' or 'NOT_NULL' expected eg: 'field[is]:NULL'",
                raw
            ),
        })
}

fn format_scalar(raw: &str, field_type: Option<FieldMetadataType>) -> QueryBuilderResult<FilterValue> {
    match field_type {
        Some(FieldMetadataType::Number | FieldMetadataType::Position) => Ok(FilterValue::Number(
            strip_quotes(raw).trim().parse::<f64>().unwrap_or(f64::NAN),
        )),
        Some(FieldMetadataType::Boolean) => match strip_quotes(raw).to_lowercase().as_str() {
            "true" => Ok(FilterValue::Boolean(true)),
            "false" => Ok(FilterValue::Boolean(false)),
            _ => Err(QueryBuilderError::InvalidFilterValue {
                message: format!(
                    "'filter' invalid for boolean field. Received '{}' but 'true' or 'false' expected",
                    raw
                ),
            }),
        },
        _ => Ok(FilterValue::text(strip_quotes(raw))),
    }
}
