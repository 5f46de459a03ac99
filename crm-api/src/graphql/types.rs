//! GraphQL type generation
//!
//! Shared scalars, enums and filters are registered once per schema. Every
//! enabled object contributes its record type, edge and connection types,
//! filter and order-by inputs, create and update inputs, and one enum plus
//! enum filter per SELECT field.

use crate::graphql::resolvers::{relation, ResolverFactoryContext};
use crate::runner::sql::parse_timestamp;
use async_graphql::dynamic::{
    Enum, Field, FieldFuture, FieldValue, InputObject, InputValue, Object, Scalar, Type, TypeRef,
};
use async_graphql::{Name, Value};
use convert_case::{Case, Casing};
use crm_core::{
    FieldMetadata, FieldMetadataType, FilterOperator, NullCheck, ObjectMetadataItem,
    OrderByDirection, PageInfo, RecordConnection, RecordData, RecordEdge, ID_FIELD,
};
use uuid::Uuid;

pub const UUID_SCALAR: &str = "UUID";
pub const DATE_TIME_SCALAR: &str = "DateTime";
pub const JSON_SCALAR: &str = "JSON";
pub const PAGE_INFO: &str = "PageInfo";
pub const ORDER_BY_DIRECTION: &str = "OrderByDirection";
pub const FILTER_IS: &str = "FilterIs";
pub const QUERY_TYPE: &str = "Query";
pub const MUTATION_TYPE: &str = "Mutation";

/// Shared scalar filters and the field type whose operators they expose.
const SCALAR_FILTERS: [(&str, FieldMetadataType); 6] = [
    ("UUIDFilter", FieldMetadataType::Uuid),
    ("StringFilter", FieldMetadataType::Text),
    ("FloatFilter", FieldMetadataType::Number),
    ("BooleanFilter", FieldMetadataType::Boolean),
    ("DateFilter", FieldMetadataType::DateTime),
    ("RawJsonFilter", FieldMetadataType::RawJson),
];

// ============================================================================
// NAMING
// ============================================================================

pub fn type_name(object: &ObjectMetadataItem) -> String {
    object.name_singular.to_case(Case::Pascal)
}

pub fn edge_name(object: &ObjectMetadataItem) -> String {
    format!("{}Edge", type_name(object))
}

pub fn connection_name(object: &ObjectMetadataItem) -> String {
    format!("{}Connection", type_name(object))
}

pub fn filter_input_name(object: &ObjectMetadataItem) -> String {
    format!("{}FilterInput", type_name(object))
}

pub fn order_by_input_name(object: &ObjectMetadataItem) -> String {
    format!("{}OrderByInput", type_name(object))
}

pub fn create_input_name(object: &ObjectMetadataItem) -> String {
    format!("{}CreateInput", type_name(object))
}

pub fn update_input_name(object: &ObjectMetadataItem) -> String {
    format!("{}UpdateInput", type_name(object))
}

pub fn enum_name(object: &ObjectMetadataItem, field: &FieldMetadata) -> String {
    format!("{}{}Enum", type_name(object), field.name.to_case(Case::Pascal))
}

pub fn enum_filter_name(object: &ObjectMetadataItem, field: &FieldMetadata) -> String {
    format!("{}Filter", enum_name(object, field))
}

/// Names of the types registered once per schema.
pub fn shared_type_names() -> Vec<&'static str> {
    let mut names = vec![
        UUID_SCALAR,
        DATE_TIME_SCALAR,
        JSON_SCALAR,
        PAGE_INFO,
        ORDER_BY_DIRECTION,
        FILTER_IS,
        QUERY_TYPE,
        MUTATION_TYPE,
    ];
    names.extend(SCALAR_FILTERS.iter().map(|(name, _)| *name));
    names
}

/// Names of every type generated for `object`.
pub fn object_type_names(object: &ObjectMetadataItem) -> Vec<String> {
    let mut names = vec![
        type_name(object),
        edge_name(object),
        connection_name(object),
        filter_input_name(object),
        order_by_input_name(object),
        create_input_name(object),
        update_input_name(object),
    ];
    for field in select_fields(object) {
        names.push(enum_name(object, field));
        names.push(enum_filter_name(object, field));
    }
    names
}

fn select_fields(object: &ObjectMetadataItem) -> impl Iterator<Item = &FieldMetadata> {
    object
        .fields
        .iter()
        .filter(|f| f.field_type == FieldMetadataType::Select)
}

/// GraphQL type of a non-relation field's values.
fn value_type_name(object: &ObjectMetadataItem, field: &FieldMetadata) -> String {
    let name = match field.field_type {
        FieldMetadataType::Uuid => UUID_SCALAR,
        FieldMetadataType::Text | FieldMetadataType::Email | FieldMetadataType::Phone => {
            TypeRef::STRING
        }
        FieldMetadataType::Number | FieldMetadataType::Position => TypeRef::FLOAT,
        FieldMetadataType::Boolean => TypeRef::BOOLEAN,
        FieldMetadataType::DateTime => DATE_TIME_SCALAR,
        FieldMetadataType::RawJson => JSON_SCALAR,
        FieldMetadataType::Select => return enum_name(object, field),
        FieldMetadataType::Relation => TypeRef::STRING,
    };
    name.to_string()
}

fn filter_type_name(object: &ObjectMetadataItem, field: &FieldMetadata) -> Option<String> {
    if field.field_type == FieldMetadataType::Select {
        return Some(enum_filter_name(object, field));
    }
    let family = match field.field_type {
        FieldMetadataType::Email | FieldMetadataType::Phone => FieldMetadataType::Text,
        FieldMetadataType::Position => FieldMetadataType::Number,
        other => other,
    };
    SCALAR_FILTERS
        .iter()
        .find(|(_, field_type)| *field_type == family)
        .map(|(name, _)| name.to_string())
}

// ============================================================================
// SHARED TYPES
// ============================================================================

fn filter_input(name: &str, operators: &[FilterOperator], value_type: &str) -> InputObject {
    operators
        .iter()
        .fold(InputObject::new(name), |input, operator| {
            let type_ref = match operator {
                FilterOperator::In => TypeRef::named_nn_list(value_type),
                FilterOperator::Is => TypeRef::named(FILTER_IS),
                _ => TypeRef::named(value_type),
            };
            input.field(InputValue::new(operator.as_str(), type_ref))
        })
}

fn page_info_field(name: &str, type_ref: TypeRef, get: fn(&PageInfo) -> Value) -> Field {
    Field::new(name, type_ref, move |ctx| {
        FieldFuture::new(async move {
            let info = ctx.parent_value.try_downcast_ref::<PageInfo>()?;
            Ok(Some(FieldValue::value(get(info))))
        })
    })
}

fn optional_string(value: &Option<String>) -> Value {
    value.clone().map_or(Value::Null, Value::String)
}

/// Types every workspace schema registers once.
pub fn shared_types() -> Vec<Type> {
    let uuid = Scalar::new(UUID_SCALAR)
        .description("A UUID in hyphenated form")
        .validator(|value| matches!(value, Value::String(s) if Uuid::parse_str(s).is_ok()));
    let date_time = Scalar::new(DATE_TIME_SCALAR)
        .description("An ISO 8601 date-time")
        .validator(|value| matches!(value, Value::String(s) if parse_timestamp(s).is_some()));
    let json = Scalar::new(JSON_SCALAR).description("Arbitrary JSON");

    let page_info = Object::new(PAGE_INFO)
        .field(page_info_field(
            "hasNextPage",
            TypeRef::named_nn(TypeRef::BOOLEAN),
            |info| Value::Boolean(info.has_next_page),
        ))
        .field(page_info_field(
            "hasPreviousPage",
            TypeRef::named_nn(TypeRef::BOOLEAN),
            |info| Value::Boolean(info.has_previous_page),
        ))
        .field(page_info_field(
            "startCursor",
            TypeRef::named(TypeRef::STRING),
            |info| optional_string(&info.start_cursor),
        ))
        .field(page_info_field(
            "endCursor",
            TypeRef::named(TypeRef::STRING),
            |info| optional_string(&info.end_cursor),
        ));

    let direction = OrderByDirection::ALL
        .iter()
        .fold(Enum::new(ORDER_BY_DIRECTION), |e, d| e.item(d.as_str()));
    let filter_is = Enum::new(FILTER_IS)
        .item(NullCheck::Null.as_str())
        .item(NullCheck::NotNull.as_str());

    let mut types: Vec<Type> = vec![
        uuid.into(),
        date_time.into(),
        json.into(),
        page_info.into(),
        direction.into(),
        filter_is.into(),
    ];
    for (name, field_type) in SCALAR_FILTERS {
        let value_type = match field_type {
            FieldMetadataType::Uuid => UUID_SCALAR,
            FieldMetadataType::Number => TypeRef::FLOAT,
            FieldMetadataType::Boolean => TypeRef::BOOLEAN,
            FieldMetadataType::DateTime => DATE_TIME_SCALAR,
            FieldMetadataType::RawJson => JSON_SCALAR,
            _ => TypeRef::STRING,
        };
        types.push(filter_input(name, field_type.allowed_operators(), value_type).into());
    }
    types
}

// ============================================================================
// OBJECT TYPES
// ============================================================================

/// Converts a stored value to its GraphQL output form.
fn output_value(value: &serde_json::Value, is_enum: bool) -> Option<Value> {
    match value {
        serde_json::Value::Null => None,
        serde_json::Value::String(s) if is_enum => Some(Value::Enum(Name::new(s))),
        other => Value::from_json(other.clone()).ok(),
    }
}

fn column_field(object: &ObjectMetadataItem, field: &FieldMetadata) -> Field {
    let base = value_type_name(object, field);
    let type_ref = if field.is_nullable {
        TypeRef::named(base)
    } else {
        TypeRef::named_nn(base)
    };
    let name = field.name.clone();
    let is_enum = field.field_type == FieldMetadataType::Select;

    let output = Field::new(field.name.clone(), type_ref, move |ctx| {
        let name = name.clone();
        FieldFuture::new(async move {
            let record = ctx.parent_value.try_downcast_ref::<RecordData>()?;
            Ok(record
                .get(&name)
                .and_then(|value| output_value(value, is_enum))
                .map(|value| FieldValue::value(value)))
        })
    });
    match &field.description {
        Some(description) => output.description(description.clone()),
        None => output,
    }
}

fn record_type(context: &ResolverFactoryContext) -> Object {
    let object = &context.object;
    let mut record = Object::new(type_name(object));
    if let Some(description) = &object.description {
        record = record.description(description.clone());
    }
    for field in &object.fields {
        if field.is_relation() {
            if let Some(relation) = relation::relation_field(context, field) {
                record = record.field(relation);
            }
        } else {
            record = record.field(column_field(object, field));
        }
    }
    record
}

fn edge_type(object: &ObjectMetadataItem) -> Object {
    Object::new(edge_name(object))
        .field(Field::new(
            "node",
            TypeRef::named_nn(type_name(object)),
            |ctx| {
                FieldFuture::new(async move {
                    let edge = ctx.parent_value.try_downcast_ref::<RecordEdge>()?;
                    Ok(Some(FieldValue::borrowed_any(&edge.node)))
                })
            },
        ))
        .field(Field::new(
            "cursor",
            TypeRef::named_nn(TypeRef::STRING),
            |ctx| {
                FieldFuture::new(async move {
                    let edge = ctx.parent_value.try_downcast_ref::<RecordEdge>()?;
                    Ok(Some(FieldValue::value(edge.cursor.clone())))
                })
            },
        ))
}

fn connection_type(object: &ObjectMetadataItem) -> Object {
    Object::new(connection_name(object))
        .field(Field::new(
            "edges",
            TypeRef::named_nn_list_nn(edge_name(object)),
            |ctx| {
                FieldFuture::new(async move {
                    let connection = ctx.parent_value.try_downcast_ref::<RecordConnection>()?;
                    Ok(Some(FieldValue::list(
                        connection
                            .edges
                            .iter()
                            .map(|edge| FieldValue::borrowed_any(edge)),
                    )))
                })
            },
        ))
        .field(Field::new(
            "pageInfo",
            TypeRef::named_nn(PAGE_INFO),
            |ctx| {
                FieldFuture::new(async move {
                    let connection = ctx.parent_value.try_downcast_ref::<RecordConnection>()?;
                    Ok(Some(FieldValue::borrowed_any(&connection.page_info)))
                })
            },
        ))
        .field(Field::new(
            "totalCount",
            TypeRef::named_nn(TypeRef::INT),
            |ctx| {
                FieldFuture::new(async move {
                    let connection = ctx.parent_value.try_downcast_ref::<RecordConnection>()?;
                    Ok(Some(FieldValue::value(connection.total_count)))
                })
            },
        ))
}

fn filter_type(object: &ObjectMetadataItem) -> InputObject {
    let name = filter_input_name(object);
    let mut filter = InputObject::new(&name)
        .field(InputValue::new("and", TypeRef::named_nn_list(&name)))
        .field(InputValue::new("or", TypeRef::named_nn_list(&name)))
        .field(InputValue::new("not", TypeRef::named(&name)));
    for field in object.column_fields() {
        if let Some(type_name) = filter_type_name(object, field) {
            filter = filter.field(InputValue::new(&field.name, TypeRef::named(type_name)));
        }
    }
    filter
}

fn order_by_type(context: &ResolverFactoryContext) -> InputObject {
    let object = &context.object;
    let mut order_by = InputObject::new(order_by_input_name(object));
    for field in &object.fields {
        if !field.is_relation() {
            order_by = order_by.field(InputValue::new(&field.name, TypeRef::named(ORDER_BY_DIRECTION)));
            continue;
        }
        // Only the side holding the join column can order by the related record.
        let target = object
            .relation_for_field(&field.name)
            .filter(|link| link.owns_join_column)
            .and_then(|link| context.metadata.object(link.target_object))
            .filter(|target| context.metadata.is_object_enabled(target));
        if let Some(target) = target {
            order_by = order_by.field(InputValue::new(
                &field.name,
                TypeRef::named(order_by_input_name(target)),
            ));
        }
    }
    order_by
}

fn create_input_type(object: &ObjectMetadataItem) -> InputObject {
    object
        .column_fields()
        .filter(|f| !f.is_read_only())
        .fold(InputObject::new(create_input_name(object)), |input, field| {
            let base = value_type_name(object, field);
            let type_ref = if field.is_optional_on_create() {
                TypeRef::named(base)
            } else {
                TypeRef::named_nn(base)
            };
            input.field(InputValue::new(&field.name, type_ref))
        })
}

fn update_input_type(object: &ObjectMetadataItem) -> InputObject {
    object
        .column_fields()
        .filter(|f| !f.is_read_only() && f.name != ID_FIELD)
        .fold(InputObject::new(update_input_name(object)), |input, field| {
            input.field(InputValue::new(
                &field.name,
                TypeRef::named(value_type_name(object, field)),
            ))
        })
}

/// Every type generated for one enabled object.
pub fn object_types(context: &ResolverFactoryContext) -> Vec<Type> {
    let object = &context.object;
    let mut types: Vec<Type> = vec![
        record_type(context).into(),
        edge_type(object).into(),
        connection_type(object).into(),
        filter_type(object).into(),
        order_by_type(context).into(),
        create_input_type(object).into(),
        update_input_type(object).into(),
    ];
    for field in select_fields(object) {
        let name = enum_name(object, field);
        let options = field
            .options
            .iter()
            .fold(Enum::new(&name), |e, option| e.item(option.value.as_str()));
        types.push(options.into());
        types.push(
            filter_input(
                &enum_filter_name(object, field),
                FieldMetadataType::Select.allowed_operators(),
                &name,
            )
            .into(),
        );
    }
    types
}

#[cfg(test)]
mod tests {
    use super::*;
    use crm_core::standard_objects::{company, opportunity, workspace_member};

    #[test]
    fn test_type_names() {
        let member = workspace_member();
        assert_eq!(type_name(&member), "WorkspaceMember");
        assert_eq!(connection_name(&member), "WorkspaceMemberConnection");
        assert_eq!(filter_input_name(&member), "WorkspaceMemberFilterInput");

        let opportunity = opportunity();
        let stage = opportunity.field("stage").map(|f| enum_name(&opportunity, f));
        assert_eq!(stage.as_deref(), Some("OpportunityStageEnum"));
    }

    #[test]
    fn test_filter_type_per_field() {
        let company = company();
        let filter = |name: &str| company.field(name).and_then(|f| filter_type_name(&company, f));
        assert_eq!(filter("id").as_deref(), Some("UUIDFilter"));
        assert_eq!(filter("name").as_deref(), Some("StringFilter"));
        assert_eq!(filter("position").as_deref(), Some("FloatFilter"));
        assert_eq!(filter("idealCustomerProfile").as_deref(), Some("BooleanFilter"));
        assert_eq!(filter("createdAt").as_deref(), Some("DateFilter"));
    }

    #[test]
    fn test_object_type_names_include_select_enums() {
        let names = object_type_names(&opportunity());
        assert!(names.contains(&"OpportunityStageEnum".to_string()));
        assert!(names.contains(&"OpportunityStageEnumFilter".to_string()));
        assert_eq!(names.len(), 9);
    }

    #[test]
    fn test_output_values() {
        let stage = output_value(&serde_json::json!("NEW"), true);
        assert_eq!(stage, Some(Value::Enum(Name::new("NEW"))));
        assert_eq!(output_value(&serde_json::Value::Null, false), None);
        assert_eq!(
            output_value(&serde_json::json!("Acme"), false),
            Some(Value::String("Acme".to_string()))
        );
    }
}
