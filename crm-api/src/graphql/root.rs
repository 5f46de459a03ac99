//! Query and Mutation root types
//!
//! For every enabled object and every requested method, one root field
//! named by [`ResolverMethod::root_field_name`] is added, with its
//! resolver created by the method's factory.

use crate::error::{ApiError, ApiResult};
use crate::graphql::resolvers::{ResolverFactories, ResolverFactoryContext};
use crate::graphql::types::{
    connection_name, create_input_name, filter_input_name, order_by_input_name, type_name,
    update_input_name, MUTATION_TYPE, QUERY_TYPE, UUID_SCALAR,
};
use async_graphql::dynamic::{Field, InputValue, Object, TypeRef};
use crm_core::{ObjectMetadataItem, ResolverMethod};
use std::collections::HashSet;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RootKind {
    Query,
    Mutation,
}

impl RootKind {
    pub fn type_name(&self) -> &'static str {
        match self {
            RootKind::Query => QUERY_TYPE,
            RootKind::Mutation => MUTATION_TYPE,
        }
    }

    /// Methods exposed on this root by default.
    pub fn methods(&self) -> &'static [ResolverMethod] {
        match self {
            RootKind::Query => &ResolverMethod::QUERIES,
            RootKind::Mutation => &ResolverMethod::MUTATIONS,
        }
    }

    fn accepts(&self, method: ResolverMethod) -> bool {
        method.is_query() == (*self == RootKind::Query)
    }
}

impl fmt::Display for RootKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.type_name())
    }
}

/// Arguments of `findMany` and of one-to-many relation fields.
pub fn find_many_arguments(object: &ObjectMetadataItem) -> Vec<InputValue> {
    vec![
        InputValue::new("filter", TypeRef::named(filter_input_name(object))),
        InputValue::new(
            "orderBy",
            TypeRef::named_nn_list(order_by_input_name(object)),
        ),
        InputValue::new("first", TypeRef::named(TypeRef::INT)),
        InputValue::new("last", TypeRef::named(TypeRef::INT)),
        InputValue::new("before", TypeRef::named(TypeRef::STRING)),
        InputValue::new("after", TypeRef::named(TypeRef::STRING)),
    ]
}

/// Output type and arguments of the root field for `method`.
fn signature(method: ResolverMethod, object: &ObjectMetadataItem) -> (TypeRef, Vec<InputValue>) {
    let record = type_name(object);
    let filter = || InputValue::new("filter", TypeRef::named_nn(filter_input_name(object)));
    let id = || InputValue::new("id", TypeRef::named_nn(UUID_SCALAR));
    let update = || InputValue::new("data", TypeRef::named_nn(update_input_name(object)));

    match method {
        ResolverMethod::FindMany => (
            TypeRef::named_nn(connection_name(object)),
            find_many_arguments(object),
        ),
        ResolverMethod::FindOne => (TypeRef::named(record), vec![filter()]),
        ResolverMethod::CreateMany => (
            TypeRef::named_nn_list_nn(record),
            vec![InputValue::new(
                "data",
                TypeRef::named_nn_list_nn(create_input_name(object)),
            )],
        ),
        ResolverMethod::CreateOne => (
            TypeRef::named_nn(record),
            vec![InputValue::new(
                "data",
                TypeRef::named_nn(create_input_name(object)),
            )],
        ),
        ResolverMethod::UpdateOne => (TypeRef::named(record), vec![id(), update()]),
        ResolverMethod::UpdateMany => (TypeRef::named_nn_list_nn(record), vec![filter(), update()]),
        ResolverMethod::DeleteOne => (TypeRef::named(record), vec![id()]),
        ResolverMethod::DeleteMany => (TypeRef::named_nn_list_nn(record), vec![filter()]),
    }
}

/// Builds a root type from the enabled objects of a workspace.
pub struct RootTypeFactory<'f> {
    factories: &'f ResolverFactories,
}

impl<'f> RootTypeFactory<'f> {
    pub fn new(factories: &'f ResolverFactories) -> Self {
        Self { factories }
    }

    /// `objects` are the resolver contexts of the enabled objects. Methods
    /// belonging to the other root kind, or without a registered factory,
    /// are skipped.
    pub fn create(
        &self,
        objects: &[ResolverFactoryContext],
        methods: &[ResolverMethod],
        kind: RootKind,
    ) -> ApiResult<Object> {
        let mut root = Object::new(kind.type_name());
        let mut names = HashSet::new();

        for context in objects {
            for &method in methods.iter().filter(|m| kind.accepts(**m)) {
                let Some(factory) = self.factories.get(method) else {
                    continue;
                };
                let name = method.root_field_name(&context.object);
                if !names.insert(name.clone()) {
                    return Err(ApiError::schema_build_failed(format!(
                        "Root field '{}' on {} is generated twice",
                        name, kind
                    )));
                }

                let (type_ref, arguments) = signature(method, &context.object);
                let resolver = factory.create(context.clone());
                let field = Field::new(name, type_ref, move |ctx| resolver(ctx));
                root = root.field(
                    arguments
                        .into_iter()
                        .fold(field, |field, argument| field.argument(argument)),
                );
            }
        }
        Ok(root)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crm_test_utils::fixtures::all_types_object;

    #[test]
    fn test_root_kinds_split_methods() {
        for method in ResolverMethod::ALL {
            assert_ne!(
                RootKind::Query.accepts(method),
                RootKind::Mutation.accepts(method)
            );
        }
        assert!(RootKind::Query.accepts(ResolverMethod::FindOne));
        assert!(RootKind::Mutation.accepts(ResolverMethod::DeleteMany));
    }

    #[test]
    fn test_signatures() {
        let object = all_types_object();
        let (find_many, args) = signature(ResolverMethod::FindMany, &object);
        assert_eq!(find_many.to_string(), "TestRecordConnection!");
        assert_eq!(args.len(), 6);

        let (create_many, _) = signature(ResolverMethod::CreateMany, &object);
        assert_eq!(create_many.to_string(), "[TestRecord!]!");

        let (delete_one, args) = signature(ResolverMethod::DeleteOne, &object);
        assert_eq!(delete_one.to_string(), "TestRecord");
        assert_eq!(args.len(), 1);
    }
}
