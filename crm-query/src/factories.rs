//! Variables and query factories.
//!
//! Variables factories turn request parts into typed arguments; query
//! factories wrap those arguments into the [`WorkspaceQuery`] handed to the
//! query runner.

use crate::error::{QueryBuilderError, QueryBuilderResult};
use crate::fields::check_fields;
use crate::filter_input::FilterInputFactory;
use crate::inputs::{DepthInputFactory, LastCursorInputFactory, LimitInputFactory, QueryParams};
use crate::order_by_input::OrderByInputFactory;
use crm_core::{
    FilterClause, FilterOperator, FilterValue, ObjectMetadataItem, Pagination, QueryArgs,
    RecordData, WorkspaceQuery, ID_FIELD,
};
use serde_json::Value;
use uuid::Uuid;

// ============================================================================
// VARIABLES FACTORIES
// ============================================================================

/// Arguments of a read.
#[derive(Debug, Clone, Copy, Default)]
pub struct GetVariablesFactory {
    filter: FilterInputFactory,
    order_by: OrderByInputFactory,
    limit: LimitInputFactory,
    last_cursor: LastCursorInputFactory,
    depth: DepthInputFactory,
}

impl GetVariablesFactory {
    /// With an `id`, only `depth` is read from the query string.
    pub fn create(
        &self,
        id: Option<Uuid>,
        query: &QueryParams,
        object: &ObjectMetadataItem,
    ) -> QueryBuilderResult<QueryArgs> {
        let depth = self.depth.create(query)?;
        if let Some(id) = id {
            return Ok(QueryArgs {
                filter: Some(id_filter(id)),
                depth,
                ..QueryArgs::default()
            });
        }

        Ok(QueryArgs {
            filter: self.filter.create(query, object)?,
            order_by: self.order_by.create(query, object)?,
            pagination: Pagination {
                first: Some(self.limit.create(query)?),
                after: self.last_cursor.create(query)?,
                ..Pagination::default()
            },
            depth,
            ..QueryArgs::default()
        })
    }
}

pub fn id_filter(id: Uuid) -> FilterClause {
    FilterClause::leaf(ID_FIELD, FilterOperator::Eq, FilterValue::text(id.to_string()))
}

/// Record data of a create request.
#[derive(Debug, Clone, PartialEq)]
pub enum CreateVariables {
    One(RecordData),
    Many(Vec<RecordData>),
}

#[derive(Debug, Clone, Copy, Default)]
pub struct CreateVariablesFactory;

impl CreateVariablesFactory {
    /// An object body creates one record, an array body creates many.
    pub fn create(&self, body: Option<&Value>, object: &ObjectMetadataItem) -> QueryBuilderResult<CreateVariables> {
        match body {
            Some(Value::Object(data)) => Ok(CreateVariables::One(record_data(data, object)?)),
            Some(Value::Array(items)) => items
                .iter()
                .map(|item| match item {
                    Value::Object(data) => record_data(data, object),
                    _ => Err(QueryBuilderError::InvalidBody {
                        reason: "array items must be objects".to_string(),
                    }),
                })
                .collect::<QueryBuilderResult<Vec<_>>>()
                .map(CreateVariables::Many),
            _ => Err(QueryBuilderError::InvalidBody {
                reason: "expected a JSON object or an array of objects".to_string(),
            }),
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct UpdateVariablesFactory;

impl UpdateVariablesFactory {
    pub fn create(&self, body: Option<&Value>, object: &ObjectMetadataItem) -> QueryBuilderResult<RecordData> {
        match body {
            Some(Value::Object(data)) => record_data(data, object),
            _ => Err(QueryBuilderError::InvalidBody {
                reason: "expected a JSON object".to_string(),
            }),
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct DeleteVariablesFactory;

impl DeleteVariablesFactory {
    pub fn create(&self, id: Option<Uuid>) -> QueryBuilderResult<Uuid> {
        id.ok_or_else(|| QueryBuilderError::MissingId {
            method: "DELETE".to_string(),
        })
    }
}

fn record_data(data: &RecordData, object: &ObjectMetadataItem) -> QueryBuilderResult<RecordData> {
    check_fields(object, data.keys().map(String::as_str))?;
    Ok(data.clone())
}

// ============================================================================
// QUERY FACTORIES
// ============================================================================

#[derive(Debug, Clone, Copy, Default)]
pub struct FindManyQueryFactory;

impl FindManyQueryFactory {
    pub fn create(&self, args: QueryArgs) -> WorkspaceQuery {
        WorkspaceQuery::FindMany(args)
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct FindOneQueryFactory;

impl FindOneQueryFactory {
    pub fn create(&self, args: QueryArgs) -> WorkspaceQuery {
        WorkspaceQuery::FindOne(args)
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct CreateQueryFactory;

impl CreateQueryFactory {
    pub fn create(&self, variables: CreateVariables) -> WorkspaceQuery {
        match variables {
            CreateVariables::One(data) => WorkspaceQuery::CreateOne(data),
            CreateVariables::Many(data) => WorkspaceQuery::CreateMany(data),
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct UpdateQueryFactory;

impl UpdateQueryFactory {
    pub fn create(&self, id: Uuid, data: RecordData) -> WorkspaceQuery {
        WorkspaceQuery::UpdateOne { id, data }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct DeleteQueryFactory;

impl DeleteQueryFactory {
    pub fn create(&self, id: Uuid) -> WorkspaceQuery {
        WorkspaceQuery::DeleteOne { id }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crm_core::{standard_objects, Cursor, OrderBy, OrderByDirection};
    use serde_json::json;

    #[test]
    fn test_get_variables_for_collection() -> QueryBuilderResult<()> {
        let company = standard_objects::company();
        let cursor = Cursor::new(Uuid::now_v7());
        let query = QueryParams::from([
            ("filter".to_string(), "employees[gt]:5".to_string()),
            ("order_by".to_string(), "name[DescNullsLast]".to_string()),
            ("limit".to_string(), "20".to_string()),
            ("last_cursor".to_string(), cursor.encode()),
            ("depth".to_string(), "1".to_string()),
        ]);
        let args = GetVariablesFactory::default().create(None, &query, &company)?;
        assert_eq!(
            args.filter,
            Some(FilterClause::and(vec![FilterClause::leaf(
                "employees",
                FilterOperator::Gt,
                FilterValue::Number(5.0)
            )]))
        );
        assert_eq!(args.order_by, OrderBy::single("name", OrderByDirection::DescNullsLast));
        assert_eq!(args.pagination.first, Some(20));
        assert_eq!(args.pagination.after, Some(cursor));
        assert_eq!(args.depth, 1);
        Ok(())
    }

    #[test]
    fn test_get_variables_for_single_record_ignores_filter() -> QueryBuilderResult<()> {
        let company = standard_objects::company();
        let id = Uuid::now_v7();
        let query = QueryParams::from([("filter".to_string(), "garbage((".to_string())]);
        let args = GetVariablesFactory::default().create(Some(id), &query, &company)?;
        assert_eq!(args.filter, Some(id_filter(id)));
        assert_eq!(args.depth, 2);
        Ok(())
    }

    #[test]
    fn test_create_variables_object_and_array() -> QueryBuilderResult<()> {
        let company = standard_objects::company();
        let one = CreateVariablesFactory.create(Some(&json!({"name": "Acme"})), &company)?;
        assert!(matches!(one, CreateVariables::One(_)));

        let many = CreateVariablesFactory.create(
            Some(&json!([{"name": "Acme"}, {"name": "Globex", "employees": 10}])),
            &company,
        )?;
        assert!(matches!(many, CreateVariables::Many(ref items) if items.len() == 2));
        assert!(matches!(
            CreateQueryFactory.create(many),
            WorkspaceQuery::CreateMany(_)
        ));
        Ok(())
    }

    #[test]
    fn test_create_variables_rejects_unknown_fields_and_scalars() {
        let company = standard_objects::company();
        assert!(matches!(
            CreateVariablesFactory.create(Some(&json!({"revenue": 1})), &company),
            Err(QueryBuilderError::FieldNotFound { .. })
        ));
        assert!(matches!(
            CreateVariablesFactory.create(Some(&json!("Acme")), &company),
            Err(QueryBuilderError::InvalidBody { .. })
        ));
        assert!(matches!(
            CreateVariablesFactory.create(None, &company),
            Err(QueryBuilderError::InvalidBody { .. })
        ));
    }

    #[test]
    fn test_delete_requires_id() {
        assert!(DeleteVariablesFactory.create(None).is_err());
        let id = Uuid::now_v7();
        assert_eq!(DeleteVariablesFactory.create(Some(id)), Ok(id));
        assert_eq!(DeleteQueryFactory.create(id), WorkspaceQuery::DeleteOne { id });
    }
}
