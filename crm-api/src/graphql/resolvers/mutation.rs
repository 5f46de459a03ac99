//! Mutation resolvers

use super::{record_value, records_value, resolver, Resolver, ResolverFactory, ResolverFactoryContext};
use crate::graphql::args::{
    args_json, data_from_json, data_list_from_json, id_from_json, required_filter_from_json,
};
use async_graphql::dynamic::FieldFuture;
use crm_core::ResolverMethod;

#[derive(Debug, Clone, Copy, Default)]
pub struct CreateManyResolverFactory;

impl ResolverFactory for CreateManyResolverFactory {
    fn method(&self) -> ResolverMethod {
        ResolverMethod::CreateMany
    }

    fn create(&self, context: ResolverFactoryContext) -> Resolver {
        resolver(move |ctx| {
            let context = context.clone();
            FieldFuture::new(async move {
                let options = context.options(&ctx)?;
                let data = data_list_from_json(&args_json(&ctx)?)?;
                let created = context.runner.create_many(&options, data).await?;
                Ok(Some(records_value(created)))
            })
        })
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct CreateOneResolverFactory;

impl ResolverFactory for CreateOneResolverFactory {
    fn method(&self) -> ResolverMethod {
        ResolverMethod::CreateOne
    }

    fn create(&self, context: ResolverFactoryContext) -> Resolver {
        resolver(move |ctx| {
            let context = context.clone();
            FieldFuture::new(async move {
                let options = context.options(&ctx)?;
                let data = data_from_json(&args_json(&ctx)?)?;
                let created = context.runner.create_one(&options, data).await?;
                Ok(Some(record_value(created)))
            })
        })
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct UpdateOneResolverFactory;

impl ResolverFactory for UpdateOneResolverFactory {
    fn method(&self) -> ResolverMethod {
        ResolverMethod::UpdateOne
    }

    fn create(&self, context: ResolverFactoryContext) -> Resolver {
        resolver(move |ctx| {
            let context = context.clone();
            FieldFuture::new(async move {
                let options = context.options(&ctx)?;
                let args = args_json(&ctx)?;
                let id = id_from_json(&args)?;
                let data = data_from_json(&args)?;
                let updated = context.runner.update_one(&options, id, data).await?;
                Ok(Some(record_value(updated)))
            })
        })
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct UpdateManyResolverFactory;

impl ResolverFactory for UpdateManyResolverFactory {
    fn method(&self) -> ResolverMethod {
        ResolverMethod::UpdateMany
    }

    fn create(&self, context: ResolverFactoryContext) -> Resolver {
        resolver(move |ctx| {
            let context = context.clone();
            FieldFuture::new(async move {
                let options = context.options(&ctx)?;
                let args = args_json(&ctx)?;
                let filter = required_filter_from_json(&context.object, &args)?;
                let data = data_from_json(&args)?;
                let updated = context.runner.update_many(&options, filter, data).await?;
                Ok(Some(records_value(updated)))
            })
        })
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct DeleteOneResolverFactory;

impl ResolverFactory for DeleteOneResolverFactory {
    fn method(&self) -> ResolverMethod {
        ResolverMethod::DeleteOne
    }

    fn create(&self, context: ResolverFactoryContext) -> Resolver {
        resolver(move |ctx| {
            let context = context.clone();
            FieldFuture::new(async move {
                let options = context.options(&ctx)?;
                let id = id_from_json(&args_json(&ctx)?)?;
                let deleted = context.runner.delete_one(&options, id).await?;
                Ok(Some(record_value(deleted)))
            })
        })
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct DeleteManyResolverFactory;

impl ResolverFactory for DeleteManyResolverFactory {
    fn method(&self) -> ResolverMethod {
        ResolverMethod::DeleteMany
    }

    fn create(&self, context: ResolverFactoryContext) -> Resolver {
        resolver(move |ctx| {
            let context = context.clone();
            FieldFuture::new(async move {
                let options = context.options(&ctx)?;
                let filter = required_filter_from_json(&context.object, &args_json(&ctx)?)?;
                let deleted = context.runner.delete_many(&options, filter).await?;
                Ok(Some(records_value(deleted)))
            })
        })
    }
}
