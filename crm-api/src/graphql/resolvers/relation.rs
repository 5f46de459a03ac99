//! Relation fields on record types
//!
//! Single-valued relations resolve through `find_one`, one-to-many
//! relations through `find_many` filtered on the inverse join column and
//! merged with the caller's own filter.

use super::{record_value, ResolverFactoryContext};
use crate::graphql::args::{args_json, query_args_from_json};
use crate::graphql::root::find_many_arguments;
use crate::graphql::types::{connection_name, type_name};
use async_graphql::dynamic::{Field, FieldFuture, FieldValue, TypeRef};
use crm_core::{
    FieldMetadata, FilterClause, FilterOperator, FilterValue, QueryArgs, RecordData, ID_FIELD,
};
use serde_json::Value;

fn equals(field: &str, id: &str) -> FilterClause {
    FilterClause::leaf(field, FilterOperator::Eq, FilterValue::text(id))
}

/// Filter selecting the records related to `record`, or `None` when the
/// record carries no key to follow.
fn related_filter(
    record: &RecordData,
    join_column: &str,
    owns_join_column: bool,
) -> Option<FilterClause> {
    if owns_join_column {
        record
            .get(join_column)
            .and_then(Value::as_str)
            .map(|id| equals(ID_FIELD, id))
    } else {
        record
            .get(ID_FIELD)
            .and_then(Value::as_str)
            .map(|id| equals(join_column, id))
    }
}

/// Output field for relation `field` of the context's object. `None` when
/// the field is not a relation or its target is disabled.
pub fn relation_field(context: &ResolverFactoryContext, field: &FieldMetadata) -> Option<Field> {
    let link = context.object.relation_for_field(&field.name)?;
    let target = context.for_object(link.target_object)?;
    let join_column = link.relation.join_column();
    let owns_join_column = link.owns_join_column;

    let relation = if link.is_single() {
        Field::new(
            field.name.clone(),
            TypeRef::named(type_name(&target.object)),
            move |ctx| {
                let target = target.clone();
                let join_column = join_column.clone();
                FieldFuture::new(async move {
                    let record = ctx.parent_value.try_downcast_ref::<RecordData>()?;
                    let Some(filter) = related_filter(record, &join_column, owns_join_column)
                    else {
                        return Ok(None);
                    };
                    let options = target.options(&ctx)?;
                    let related = target
                        .runner
                        .find_one(&options, QueryArgs::with_filter(Some(filter)))
                        .await?;
                    Ok(related.map(record_value))
                })
            },
        )
    } else {
        let arguments = find_many_arguments(&target.object);
        let connection = Field::new(
            field.name.clone(),
            TypeRef::named_nn(connection_name(&target.object)),
            move |ctx| {
                let target = target.clone();
                let join_column = join_column.clone();
                FieldFuture::new(async move {
                    let record = ctx.parent_value.try_downcast_ref::<RecordData>()?;
                    let Some(filter) = related_filter(record, &join_column, owns_join_column)
                    else {
                        return Ok(None);
                    };
                    let options = target.options(&ctx)?;
                    let mut args =
                        query_args_from_json(&target.metadata, &target.object, &args_json(&ctx)?)?;
                    args.filter = FilterClause::merge(Some(filter), args.filter);
                    let connection = target.runner.find_many(&options, args).await?;
                    Ok(Some(FieldValue::owned_any(connection)))
                })
            },
        );
        arguments
            .into_iter()
            .fold(connection, |connection, argument| connection.argument(argument))
    };

    Some(match &field.description {
        Some(description) => relation.description(description.clone()),
        None => relation,
    })
}
