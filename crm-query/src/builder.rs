//! Entry point turning a REST request into a [`WorkspaceQuery`].

use crate::error::{QueryBuilderError, QueryBuilderResult};
use crate::factories::{
    CreateQueryFactory, CreateVariablesFactory, DeleteQueryFactory, DeleteVariablesFactory,
    FindManyQueryFactory, FindOneQueryFactory, GetVariablesFactory, UpdateQueryFactory,
    UpdateVariablesFactory,
};
use crate::inputs::QueryParams;
use crate::path::{parse_record_id, parse_rest_path, resolve_object};
use crm_core::{ObjectMetadataItem, WorkspaceMetadata, WorkspaceQuery};
use serde_json::Value;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RestMethod {
    Get,
    Post,
    Patch,
    Put,
    Delete,
}

impl fmt::Display for RestMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RestMethod::Get => "GET",
            RestMethod::Post => "POST",
            RestMethod::Patch => "PATCH",
            RestMethod::Put => "PUT",
            RestMethod::Delete => "DELETE",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct RestRequest<'a> {
    pub method: RestMethod,
    pub path: &'a str,
    pub query: &'a QueryParams,
    pub body: Option<&'a Value>,
}

/// A structured call together with the object it targets.
#[derive(Debug, Clone, PartialEq)]
pub struct RestQuery {
    pub object: ObjectMetadataItem,
    pub query: WorkspaceQuery,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct RestQueryBuilder {
    get_variables: GetVariablesFactory,
    create_variables: CreateVariablesFactory,
    update_variables: UpdateVariablesFactory,
    delete_variables: DeleteVariablesFactory,
    find_many: FindManyQueryFactory,
    find_one: FindOneQueryFactory,
    create: CreateQueryFactory,
    update: UpdateQueryFactory,
    delete: DeleteQueryFactory,
}

impl RestQueryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn build(
        &self,
        metadata: &WorkspaceMetadata,
        request: &RestRequest<'_>,
    ) -> QueryBuilderResult<RestQuery> {
        let path = parse_rest_path(request.path)?;
        let object = resolve_object(metadata, &path.object_plural)?;
        let id = path.id.as_deref().map(parse_record_id).transpose()?;

        let query = match request.method {
            RestMethod::Get => {
                let args = self.get_variables.create(id, request.query, &object)?;
                if id.is_some() {
                    self.find_one.create(args)
                } else {
                    self.find_many.create(args)
                }
            }
            RestMethod::Post => {
                if id.is_some() {
                    return Err(QueryBuilderError::InvalidPath {
                        path: request.path.to_string(),
                    });
                }
                let variables = self.create_variables.create(request.body, &object)?;
                self.create.create(variables)
            }
            RestMethod::Patch | RestMethod::Put => {
                let id = id.ok_or_else(|| QueryBuilderError::MissingId {
                    method: request.method.to_string(),
                })?;
                let data = self.update_variables.create(request.body, &object)?;
                self.update.create(id, data)
            }
            RestMethod::Delete => {
                let id = self.delete_variables.create(id)?;
                self.delete.create(id)
            }
        };

        tracing::debug!(
            workspace_id = %metadata.workspace_id,
            object = %object.name_singular,
            method = %query.method(),
            "Built REST query"
        );
        Ok(RestQuery { object, query })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crm_core::{standard_objects, FilterClause, MetadataError};
    use serde_json::json;
    use uuid::Uuid;

    fn metadata() -> Result<WorkspaceMetadata, MetadataError> {
        standard_objects::standard_workspace(Uuid::nil(), [])
    }

    fn request<'a>(
        method: RestMethod,
        path: &'a str,
        query: &'a QueryParams,
        body: Option<&'a Value>,
    ) -> RestRequest<'a> {
        RestRequest {
            method,
            path,
            query,
            body,
        }
    }

    #[test]
    fn test_get_collection_builds_find_many() -> Result<(), Box<dyn std::error::Error>> {
        let metadata = metadata()?;
        let query = QueryParams::from([("filter".to_string(), "name[eq]:Acme".to_string())]);
        let built = RestQueryBuilder::new().build(
            &metadata,
            &request(RestMethod::Get, "/rest/companies", &query, None),
        )?;
        assert_eq!(built.object.name_singular, "company");
        match built.query {
            WorkspaceQuery::FindMany(args) => {
                assert!(matches!(args.filter, Some(FilterClause::Composite { .. })));
                assert_eq!(args.pagination.first, Some(60));
            }
            other => panic!("unexpected query {other:?}"),
        }
        Ok(())
    }

    #[test]
    fn test_get_record_builds_find_one() -> Result<(), Box<dyn std::error::Error>> {
        let metadata = metadata()?;
        let id = Uuid::now_v7();
        let path = format!("/rest/people/{id}");
        let query = QueryParams::new();
        let built =
            RestQueryBuilder::new().build(&metadata, &request(RestMethod::Get, &path, &query, None))?;
        assert!(matches!(built.query, WorkspaceQuery::FindOne(_)));
        Ok(())
    }

    #[test]
    fn test_mutations() -> Result<(), Box<dyn std::error::Error>> {
        let metadata = metadata()?;
        let query = QueryParams::new();
        let body = json!({"name": "Acme"});
        let builder = RestQueryBuilder::new();

        let created = builder.build(
            &metadata,
            &request(RestMethod::Post, "/rest/companies", &query, Some(&body)),
        )?;
        assert!(matches!(created.query, WorkspaceQuery::CreateOne(_)));

        let id = Uuid::now_v7();
        let path = format!("/rest/companies/{id}");
        let updated =
            builder.build(&metadata, &request(RestMethod::Patch, &path, &query, Some(&body)))?;
        assert!(matches!(updated.query, WorkspaceQuery::UpdateOne { id: got, .. } if got == id));

        let deleted = builder.build(&metadata, &request(RestMethod::Delete, &path, &query, None))?;
        assert_eq!(deleted.query, WorkspaceQuery::DeleteOne { id });
        Ok(())
    }

    #[test]
    fn test_mutations_without_id_fail() -> Result<(), Box<dyn std::error::Error>> {
        let metadata = metadata()?;
        let query = QueryParams::new();
        let body = json!({"name": "Acme"});
        let builder = RestQueryBuilder::new();

        assert!(matches!(
            builder.build(
                &metadata,
                &request(RestMethod::Patch, "/rest/companies", &query, Some(&body))
            ),
            Err(QueryBuilderError::MissingId { .. })
        ));
        assert!(matches!(
            builder.build(&metadata, &request(RestMethod::Delete, "/rest/companies", &query, None)),
            Err(QueryBuilderError::MissingId { .. })
        ));
        Ok(())
    }

    #[test]
    fn test_invalid_id_rejected() -> Result<(), Box<dyn std::error::Error>> {
        let metadata = metadata()?;
        let query = QueryParams::new();
        assert!(matches!(
            RestQueryBuilder::new().build(
                &metadata,
                &request(RestMethod::Get, "/rest/companies/42", &query, None)
            ),
            Err(QueryBuilderError::InvalidId { .. })
        ));
        Ok(())
    }
}
