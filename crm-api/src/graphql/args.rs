//! GraphQL arguments to structured query arguments
//!
//! Arguments are first converted to JSON, then mapped onto the same
//! structures the REST builder produces.

use crate::error::{ApiError, ApiResult};
use async_graphql::dynamic::ResolverContext;
use crm_core::{
    Cursor, FieldMetadata, FilterClause, FilterOperator, FilterValue, NullCheck,
    ObjectMetadataItem, OrderBy, OrderByDirection, OrderByNode, Pagination, QueryArgs,
    RecordData, WorkspaceMetadata,
};
use serde_json::{Map, Value};
use uuid::Uuid;

/// Non-null arguments of the field being resolved, as JSON.
pub fn args_json(ctx: &ResolverContext<'_>) -> ApiResult<Map<String, Value>> {
    let mut args = Map::new();
    for (name, value) in ctx.args.as_index_map() {
        let json = value
            .clone()
            .into_json()
            .map_err(|e| ApiError::invalid_input(format!("Argument '{}': {}", name, e)))?;
        if !json.is_null() {
            args.insert(name.to_string(), json);
        }
    }
    Ok(args)
}

// ============================================================================
// FILTER
// ============================================================================

/// Converts a `<Type>FilterInput` value into a clause tree. Several
/// entries at one level are combined with `and`.
pub fn filter_from_json(object: &ObjectMetadataItem, value: &Value) -> ApiResult<FilterClause> {
    let entries = value
        .as_object()
        .ok_or_else(|| ApiError::invalid_filter(format!("Filter must be an object, got {}", value)))?;

    let mut clauses = Vec::new();
    for (key, value) in entries {
        if value.is_null() {
            continue;
        }
        match key.as_str() {
            "and" | "or" => {
                let items = value.as_array().ok_or_else(|| {
                    ApiError::invalid_filter(format!("'{}' expects a list of filters", key))
                })?;
                let nested = items
                    .iter()
                    .map(|item| filter_from_json(object, item))
                    .collect::<ApiResult<Vec<_>>>()?;
                clauses.push(if key == "and" {
                    FilterClause::and(nested)
                } else {
                    FilterClause::or(nested)
                });
            }
            "not" => clauses.push(FilterClause::not(filter_from_json(object, value)?)),
            name => {
                let field = object
                    .field(name)
                    .filter(|f| !f.is_relation())
                    .ok_or_else(|| ApiError::field_not_found(&object.name_singular, name))?;
                clauses.extend(field_clauses(field, value)?);
            }
        }
    }

    if clauses.len() == 1 {
        if let Some(clause) = clauses.pop() {
            return Ok(clause);
        }
    }
    Ok(FilterClause::and(clauses))
}

fn field_clauses(field: &FieldMetadata, value: &Value) -> ApiResult<Vec<FilterClause>> {
    let operators = value.as_object().ok_or_else(|| {
        ApiError::invalid_filter(format!(
            "Filter on '{}' must map operators to values",
            field.name
        ))
    })?;

    let mut clauses = Vec::new();
    for (operator, operand) in operators {
        if operand.is_null() {
            continue;
        }
        let operator: FilterOperator = operator
            .parse()
            .map_err(|e: crm_core::ParseEnumError| ApiError::invalid_filter(e.to_string()))?;
        if !field.field_type.supports(operator) {
            return Err(ApiError::invalid_filter(format!(
                "Operator '{}' is not supported by field '{}' of type {}",
                operator, field.name, field.field_type
            )));
        }
        let value = match operator {
            FilterOperator::In => match operand {
                Value::Array(items) => FilterValue::List(
                    items
                        .iter()
                        .map(|item| scalar_value(field, item))
                        .collect::<ApiResult<_>>()?,
                ),
                _ => {
                    return Err(ApiError::invalid_filter(format!(
                        "'in' on '{}' expects a list",
                        field.name
                    )))
                }
            },
            FilterOperator::Is => match operand.as_str().and_then(NullCheck::parse) {
                Some(check) => FilterValue::text(check.as_str()),
                None => {
                    return Err(ApiError::invalid_filter(format!(
                        "'is' on '{}' expects NULL or NOT_NULL",
                        field.name
                    )))
                }
            },
            _ => scalar_value(field, operand)?,
        };
        clauses.push(FilterClause::leaf(&field.name, operator, value));
    }
    Ok(clauses)
}

fn scalar_value(field: &FieldMetadata, value: &Value) -> ApiResult<FilterValue> {
    let converted = if field.field_type.is_numeric() {
        value.as_f64().map(FilterValue::Number)
    } else if field.field_type == crm_core::FieldMetadataType::Boolean {
        value.as_bool().map(FilterValue::Boolean)
    } else {
        value.as_str().map(FilterValue::text)
    };
    converted.ok_or_else(|| {
        ApiError::invalid_filter(format!(
            "Value {} does not match field '{}' of type {}",
            value, field.name, field.field_type
        ))
    })
}

// ============================================================================
// ORDER BY
// ============================================================================

/// Converts an `orderBy` argument (one `<Type>OrderByInput` or a list of
/// them) into an ordering. Later entries win on repeated keys.
pub fn order_by_from_json(
    metadata: &WorkspaceMetadata,
    object: &ObjectMetadataItem,
    value: &Value,
) -> ApiResult<OrderBy> {
    let items = match value {
        Value::Array(items) => items.iter().collect(),
        other => vec![other],
    };
    let mut order_by = OrderBy::new();
    for item in items {
        order_by.merge(order_by_entry(metadata, object, item)?);
    }
    Ok(order_by)
}

fn order_by_entry(
    metadata: &WorkspaceMetadata,
    object: &ObjectMetadataItem,
    value: &Value,
) -> ApiResult<OrderBy> {
    let entries = value.as_object().ok_or_else(|| {
        ApiError::invalid_order_by(format!("orderBy entries must be objects, got {}", value))
    })?;

    let mut order_by = OrderBy::new();
    for (name, value) in entries {
        if value.is_null() {
            continue;
        }
        if !object.has_field(name) {
            return Err(ApiError::field_not_found(&object.name_singular, name));
        }
        let node = match value {
            Value::String(direction) => OrderByNode::Direction(
                direction
                    .parse::<OrderByDirection>()
                    .map_err(|e| ApiError::invalid_order_by(e.to_string()))?,
            ),
            Value::Object(_) => {
                let target = object
                    .relation_for_field(name)
                    .filter(|link| link.owns_join_column)
                    .and_then(|link| metadata.object(link.target_object))
                    .ok_or_else(|| {
                        ApiError::invalid_order_by(format!(
                            "Field '{}' of '{}' cannot be ordered by nested fields",
                            name, object.name_singular
                        ))
                    })?;
                let target = metadata.visible_object(target);
                OrderByNode::Nested(order_by_entry(metadata, &target, value)?)
            }
            other => {
                return Err(ApiError::invalid_order_by(format!(
                    "Invalid direction {} for '{}'",
                    other, name
                )))
            }
        };
        order_by.insert(name.clone(), node);
    }
    Ok(order_by)
}

// ============================================================================
// PAGINATION AND READ ARGUMENTS
// ============================================================================

fn page_size(args: &Map<String, Value>, key: &str) -> ApiResult<Option<u32>> {
    match args.get(key) {
        None => Ok(None),
        Some(value) => value
            .as_u64()
            .filter(|n| *n > 0)
            .and_then(|n| u32::try_from(n).ok())
            .map(Some)
            .ok_or_else(|| {
                ApiError::invalid_input(format!("'{}' must be a positive integer", key))
            }),
    }
}

fn cursor(args: &Map<String, Value>, key: &str) -> ApiResult<Option<Cursor>> {
    match args.get(key) {
        None => Ok(None),
        Some(Value::String(encoded)) => Ok(Some(Cursor::decode(encoded)?)),
        Some(other) => Err(ApiError::invalid_input(format!(
            "'{}' must be a cursor string, got {}",
            key, other
        ))),
    }
}

pub fn pagination_from_json(args: &Map<String, Value>) -> ApiResult<Pagination> {
    Ok(Pagination {
        first: page_size(args, "first")?,
        last: page_size(args, "last")?,
        after: cursor(args, "after")?,
        before: cursor(args, "before")?,
    })
}

/// Read arguments of a `findMany`, `findOne` or one-to-many relation field.
pub fn query_args_from_json(
    metadata: &WorkspaceMetadata,
    object: &ObjectMetadataItem,
    args: &Map<String, Value>,
) -> ApiResult<QueryArgs> {
    let filter = args
        .get("filter")
        .map(|value| filter_from_json(object, value))
        .transpose()?;
    let order_by = match args.get("orderBy") {
        Some(value) => order_by_from_json(metadata, object, value)?,
        None => OrderBy::new(),
    };
    Ok(QueryArgs {
        filter,
        order_by,
        pagination: pagination_from_json(args)?,
        ..QueryArgs::default()
    })
}

// ============================================================================
// WRITE ARGUMENTS
// ============================================================================

fn record(value: &Value) -> ApiResult<RecordData> {
    value
        .as_object()
        .cloned()
        .ok_or_else(|| ApiError::invalid_input(format!("Record data must be an object, got {}", value)))
}

pub fn data_from_json(args: &Map<String, Value>) -> ApiResult<RecordData> {
    args.get("data")
        .map(record)
        .transpose()?
        .ok_or_else(|| ApiError::invalid_input("Argument 'data' is required"))
}

pub fn data_list_from_json(args: &Map<String, Value>) -> ApiResult<Vec<RecordData>> {
    match args.get("data") {
        Some(Value::Array(items)) => items.iter().map(record).collect(),
        Some(other) => Err(ApiError::invalid_input(format!(
            "Argument 'data' must be a list, got {}",
            other
        ))),
        None => Err(ApiError::invalid_input("Argument 'data' is required")),
    }
}

pub fn id_from_json(args: &Map<String, Value>) -> ApiResult<Uuid> {
    let raw = args
        .get("id")
        .and_then(Value::as_str)
        .ok_or_else(|| ApiError::invalid_input("Argument 'id' is required"))?;
    Ok(Uuid::parse_str(raw)?)
}

pub fn required_filter_from_json(
    object: &ObjectMetadataItem,
    args: &Map<String, Value>,
) -> ApiResult<FilterClause> {
    args.get("filter")
        .map(|value| filter_from_json(object, value))
        .transpose()?
        .ok_or_else(|| ApiError::invalid_input("Argument 'filter' is required"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;
    use crm_core::standard_objects::company;
    use crm_test_utils::fixtures::standard_workspace;
    use serde_json::json;

    fn args(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => Map::new(),
        }
    }

    #[test]
    fn test_filter_single_leaf() -> ApiResult<()> {
        let clause = filter_from_json(&company(), &json!({ "name": { "eq": "Acme" } }))?;
        assert_eq!(
            clause,
            FilterClause::leaf("name", FilterOperator::Eq, FilterValue::text("Acme"))
        );
        Ok(())
    }

    #[test]
    fn test_filter_combines_entries_with_and() -> ApiResult<()> {
        let clause = filter_from_json(
            &company(),
            &json!({
                "employees": { "gte": 10, "lt": 500 },
                "or": [
                    { "idealCustomerProfile": { "eq": true } },
                    { "not": { "domainName": { "is": "NULL" } } }
                ]
            }),
        )?;
        assert_eq!(
            clause,
            FilterClause::and(vec![
                FilterClause::leaf("employees", FilterOperator::Gte, FilterValue::Number(10.0)),
                FilterClause::leaf("employees", FilterOperator::Lt, FilterValue::Number(500.0)),
                FilterClause::or(vec![
                    FilterClause::leaf("idealCustomerProfile", FilterOperator::Eq, FilterValue::Boolean(true)),
                    FilterClause::not(FilterClause::leaf(
                        "domainName",
                        FilterOperator::Is,
                        FilterValue::text("NULL")
                    )),
                ]),
            ])
        );
        Ok(())
    }

    #[test]
    fn test_filter_in_list() -> ApiResult<()> {
        let clause = filter_from_json(&company(), &json!({ "employees": { "in": [1, 2] } }))?;
        assert_eq!(
            clause,
            FilterClause::leaf(
                "employees",
                FilterOperator::In,
                FilterValue::List(vec![FilterValue::Number(1.0), FilterValue::Number(2.0)])
            )
        );
        Ok(())
    }

    #[test]
    fn test_filter_rejections() {
        let code = |value: Value| filter_from_json(&company(), &value).err().map(|e| e.code);
        assert_eq!(code(json!({ "unknown": { "eq": 1 } })), Some(ErrorCode::FieldNotFound));
        assert_eq!(code(json!({ "name": { "gt": "A" } })), Some(ErrorCode::InvalidFilter));
        assert_eq!(code(json!({ "employees": { "eq": "ten" } })), Some(ErrorCode::InvalidFilter));
        assert_eq!(code(json!({ "name": { "is": "EMPTY" } })), Some(ErrorCode::InvalidFilter));
    }

    #[test]
    fn test_empty_filter_matches_everything() -> ApiResult<()> {
        assert_eq!(filter_from_json(&company(), &json!({}))?, FilterClause::and(vec![]));
        Ok(())
    }

    #[test]
    fn test_order_by_list_and_nested() -> Result<(), Box<dyn std::error::Error>> {
        let metadata = standard_workspace()?;
        let person = metadata.object("person").ok_or("missing person")?;
        let order_by = order_by_from_json(
            &metadata,
            person,
            &json!([{ "name": "AscNullsLast" }, { "company": { "name": "DescNullsFirst" } }]),
        )?;
        assert_eq!(
            order_by.get("name"),
            Some(&OrderByNode::Direction(OrderByDirection::AscNullsLast))
        );
        assert_eq!(
            order_by.get("company"),
            Some(&OrderByNode::Nested(OrderBy::single(
                "name",
                OrderByDirection::DescNullsFirst
            )))
        );
        Ok(())
    }

    #[test]
    fn test_order_by_rejects_one_to_many_nesting() -> Result<(), Box<dyn std::error::Error>> {
        let metadata = standard_workspace()?;
        let company = metadata.object("company").ok_or("missing company")?;
        let err = order_by_from_json(&metadata, company, &json!({ "people": { "name": "AscNullsFirst" } }))
            .err()
            .map(|e| e.code);
        assert_eq!(err, Some(ErrorCode::InvalidOrderBy));
        Ok(())
    }

    #[test]
    fn test_pagination() -> ApiResult<()> {
        let cursor = Cursor::new(Uuid::now_v7());
        let pagination = pagination_from_json(&args(json!({ "last": 5, "before": cursor.encode() })))?;
        assert!(pagination.is_backward());
        assert_eq!(pagination.page_size(), 5);
        assert_eq!(pagination.before, Some(cursor));

        let err = pagination_from_json(&args(json!({ "first": 0 }))).err().map(|e| e.code);
        assert_eq!(err, Some(ErrorCode::InvalidInput));
        Ok(())
    }

    #[test]
    fn test_write_arguments() -> ApiResult<()> {
        let id = Uuid::now_v7();
        let parsed = args(json!({ "id": id.to_string(), "data": { "name": "Acme" } }));
        assert_eq!(id_from_json(&parsed)?, id);
        assert_eq!(data_from_json(&parsed)?.get("name"), Some(&json!("Acme")));

        let many = args(json!({ "data": [{ "name": "A" }, { "name": "B" }] }));
        assert_eq!(data_list_from_json(&many)?.len(), 2);
        assert!(data_list_from_json(&parsed).is_err());
        Ok(())
    }
}
