//! `findMany` and `findOne` resolvers

use super::{record_value, resolver, Resolver, ResolverFactory, ResolverFactoryContext};
use crate::graphql::args::{args_json, query_args_from_json, required_filter_from_json};
use async_graphql::dynamic::{FieldFuture, FieldValue};
use crm_core::{QueryArgs, ResolverMethod};

#[derive(Debug, Clone, Copy, Default)]
pub struct FindManyResolverFactory;

impl ResolverFactory for FindManyResolverFactory {
    fn method(&self) -> ResolverMethod {
        ResolverMethod::FindMany
    }

    fn create(&self, context: ResolverFactoryContext) -> Resolver {
        resolver(move |ctx| {
            let context = context.clone();
            FieldFuture::new(async move {
                let options = context.options(&ctx)?;
                let args = query_args_from_json(&context.metadata, &context.object, &args_json(&ctx)?)?;
                let connection = context.runner.find_many(&options, args).await?;
                Ok(Some(FieldValue::owned_any(connection)))
            })
        })
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct FindOneResolverFactory;

impl ResolverFactory for FindOneResolverFactory {
    fn method(&self) -> ResolverMethod {
        ResolverMethod::FindOne
    }

    fn create(&self, context: ResolverFactoryContext) -> Resolver {
        resolver(move |ctx| {
            let context = context.clone();
            FieldFuture::new(async move {
                let options = context.options(&ctx)?;
                let filter = required_filter_from_json(&context.object, &args_json(&ctx)?)?;
                let record = context
                    .runner
                    .find_one(&options, QueryArgs::with_filter(Some(filter)))
                    .await?;
                Ok(record.map(record_value))
            })
        })
    }
}
