//! Postgres-backed query runner
//!
//! Writes run inside a transaction. Deletes apply each dependent relation's
//! `onDelete` rule (cascade, set null, restrict) before removing the rows.

use crate::db::DbClient;
use crate::error::{ApiError, ApiResult, ErrorCode};
use crate::runner::record::{prepare_create, prepare_update};
use crate::runner::sql::{self, order_column, SqlStatement, RECORD_COLUMN};
use crate::runner::{WorkspaceQueryRunner, WorkspaceQueryRunnerOptions};
use crate::telemetry::metrics::with_metrics;
use async_trait::async_trait;
use crm_core::{
    Cursor, FilterClause, FilterOperator, FilterValue, ObjectMetadataItem, OnDeleteAction,
    PageInfo, QueryArgs, RecordConnection, RecordData, RecordEdge, ResolverMethod,
    WorkspaceMetadata, ID_FIELD,
};
use deadpool_postgres::Transaction;
use serde_json::Value;
use std::collections::{HashSet, VecDeque};
use std::future::Future;
use std::time::Instant;
use tokio_postgres::Row;
use tracing::{debug, warn};
use uuid::Uuid;

#[derive(Clone)]
pub struct PgWorkspaceQueryRunner {
    db: DbClient,
}

impl PgWorkspaceQueryRunner {
    pub fn new(db: DbClient) -> Self {
        Self { db }
    }
}

/// Times `operation` and records it under `method`.
async fn observe<T>(
    method: ResolverMethod,
    options: &WorkspaceQueryRunnerOptions,
    operation: impl Future<Output = ApiResult<T>>,
) -> ApiResult<T> {
    let start = Instant::now();
    let result = operation.await;
    let elapsed = start.elapsed();

    with_metrics(|metrics| {
        metrics.record_runner_operation(
            method.as_str(),
            options.object_name(),
            result.is_ok(),
            elapsed.as_secs_f64(),
        )
    });
    match &result {
        Ok(_) => debug!(
            method = %method,
            object = options.object_name(),
            workspace_id = %options.workspace_id,
            duration_ms = elapsed.as_millis(),
            "Runner operation completed"
        ),
        Err(e) => warn!(
            method = %method,
            object = options.object_name(),
            workspace_id = %options.workspace_id,
            code = %e.code,
            "Runner operation failed"
        ),
    }
    result
}

fn record_from_row(row: &Row) -> ApiResult<RecordData> {
    match row.try_get::<_, Value>(RECORD_COLUMN)? {
        Value::Object(record) => Ok(record),
        other => Err(ApiError::internal_error(format!(
            "Expected a JSON object row, got {}",
            other
        ))),
    }
}

fn records_from_rows(rows: &[Row]) -> ApiResult<Vec<RecordData>> {
    rows.iter().map(record_from_row).collect()
}

fn record_id(record: &RecordData) -> ApiResult<Uuid> {
    record
        .get(ID_FIELD)
        .and_then(Value::as_str)
        .and_then(|id| Uuid::parse_str(id).ok())
        .ok_or_else(|| ApiError::internal_error("Stored record has no valid id"))
}

fn id_filter(id: Uuid) -> FilterClause {
    FilterClause::leaf(ID_FIELD, FilterOperator::Eq, FilterValue::text(id.to_string()))
}

async fn fetch(tx: &Transaction<'_>, statement: &SqlStatement) -> ApiResult<Vec<Row>> {
    Ok(tx.query(statement.sql.as_str(), &statement.params()[..]).await?)
}

fn ids_from_rows(rows: &[Row]) -> ApiResult<Vec<Uuid>> {
    rows.iter()
        .map(|row| row.try_get::<_, Uuid>(0).map_err(ApiError::from))
        .collect()
}

/// Applies the `onDelete` rules of everything depending on `ids` of
/// `object`, then deletes the cascaded dependents. Cycles are cut by the
/// visited set.
async fn apply_delete_rules(
    tx: &Transaction<'_>,
    metadata: &WorkspaceMetadata,
    object: &ObjectMetadataItem,
    ids: &[Uuid],
) -> ApiResult<()> {
    let schema = sql::schema_name(metadata.workspace_id);
    let mut visited: HashSet<(String, Uuid)> = ids
        .iter()
        .map(|id| (object.name_singular.clone(), *id))
        .collect();
    let mut queue: VecDeque<(String, Vec<Uuid>)> = VecDeque::new();
    queue.push_back((object.name_singular.clone(), ids.to_vec()));
    let mut cascaded: Vec<(String, Vec<Uuid>)> = Vec::new();

    while let Some((name, parent_ids)) = queue.pop_front() {
        let parent = metadata
            .object(&name)
            .ok_or_else(|| ApiError::object_not_found(&name))?;

        for relation in parent.dependent_relations() {
            let dependent = metadata
                .object(&relation.to_object)
                .ok_or_else(|| ApiError::object_not_found(&relation.to_object))?;
            let join_column = relation.join_column();

            match relation.on_delete {
                OnDeleteAction::Restrict => {
                    let probe =
                        sql::select_dependents(&schema, dependent, &join_column, &parent_ids, Some(1));
                    if !fetch(tx, &probe).await?.is_empty() {
                        return Err(ApiError::relation_restricted(
                            &parent.name_singular,
                            &dependent.name_singular,
                        ));
                    }
                }
                OnDeleteAction::SetNull => {
                    let statement =
                        sql::clear_join_column(&schema, dependent, &join_column, &parent_ids);
                    tx.execute(statement.sql.as_str(), &statement.params()[..])
                        .await?;
                }
                OnDeleteAction::Cascade => {
                    let statement =
                        sql::select_dependents(&schema, dependent, &join_column, &parent_ids, None);
                    let children: Vec<Uuid> = ids_from_rows(&fetch(tx, &statement).await?)?
                        .into_iter()
                        .filter(|id| visited.insert((dependent.name_singular.clone(), *id)))
                        .collect();
                    if !children.is_empty() {
                        cascaded.push((dependent.name_singular.clone(), children.clone()));
                        queue.push_back((dependent.name_singular.clone(), children));
                    }
                }
            }
        }
    }

    // Deepest dependents first so join columns never dangle.
    for (name, ids) in cascaded.into_iter().rev() {
        let dependent = metadata
            .object(&name)
            .ok_or_else(|| ApiError::object_not_found(&name))?;
        let statement = sql::delete_by_ids(&schema, dependent, &ids);
        tx.execute(statement.sql.as_str(), &statement.params()[..])
            .await?;
        debug!(object = %name, count = ids.len(), "Cascaded delete");
    }
    Ok(())
}

impl PgWorkspaceQueryRunner {
    async fn delete_ids(
        &self,
        options: &WorkspaceQueryRunnerOptions,
        select: Option<SqlStatement>,
        ids: Vec<Uuid>,
    ) -> ApiResult<Vec<RecordData>> {
        let metadata = &options.object_metadata_collection;
        let object = metadata
            .object(options.object_name())
            .ok_or_else(|| ApiError::object_not_found(options.object_name()))?;

        let mut conn = self.db.get_conn().await?;
        let tx = conn.transaction().await?;
        let ids = match select {
            Some(statement) => ids_from_rows(&fetch(&tx, &statement).await?)?,
            None => ids,
        };
        if ids.is_empty() {
            tx.commit().await?;
            return Ok(Vec::new());
        }

        apply_delete_rules(&tx, metadata, object, &ids).await?;
        let statement = sql::delete_by_ids(&sql::schema_name(metadata.workspace_id), object, &ids);
        let deleted = records_from_rows(&fetch(&tx, &statement).await?)?;
        tx.commit().await?;
        Ok(deleted)
    }
}

#[async_trait]
impl WorkspaceQueryRunner for PgWorkspaceQueryRunner {
    async fn find_many(
        &self,
        options: &WorkspaceQueryRunnerOptions,
        args: QueryArgs,
    ) -> ApiResult<RecordConnection> {
        observe(ResolverMethod::FindMany, options, async {
            let statements = sql::find_many(
                &options.object_metadata_collection,
                &options.object_metadata_item,
                &args,
            )?;
            let conn = self.db.get_conn().await?;
            let rows = conn
                .query(statements.select.sql.as_str(), &statements.select.params()[..])
                .await?;
            let total_count: i64 = conn
                .query_one(statements.count.sql.as_str(), &statements.count.params()[..])
                .await?
                .try_get(0)?;

            let has_more = rows.len() > statements.limit as usize;
            let mut edges = Vec::with_capacity(rows.len().min(statements.limit as usize));
            for row in rows.iter().take(statements.limit as usize) {
                let node = record_from_row(row)?;
                let mut cursor = Cursor::new(record_id(&node)?);
                for (index, key) in statements.order_keys.iter().enumerate() {
                    let value: Value = row.try_get(order_column(index).as_str())?;
                    cursor.order_values.insert(key.clone(), value);
                }
                edges.push(RecordEdge {
                    node,
                    cursor: cursor.encode(),
                });
            }
            if statements.backward {
                edges.reverse();
            }

            let (has_next_page, has_previous_page) = if statements.backward {
                (args.pagination.before.is_some(), has_more)
            } else {
                (has_more, args.pagination.after.is_some())
            };
            let page_info = PageInfo {
                has_next_page,
                has_previous_page,
                start_cursor: edges.first().map(|e| e.cursor.clone()),
                end_cursor: edges.last().map(|e| e.cursor.clone()),
            };
            Ok(RecordConnection {
                edges,
                page_info,
                total_count,
            })
        })
        .await
    }

    async fn find_one(
        &self,
        options: &WorkspaceQueryRunnerOptions,
        args: QueryArgs,
    ) -> ApiResult<Option<RecordData>> {
        observe(ResolverMethod::FindOne, options, async {
            let statement = sql::find_one(
                &options.object_metadata_collection,
                &options.object_metadata_item,
                args.filter.as_ref(),
            )?;
            let conn = self.db.get_conn().await?;
            let row = conn
                .query_opt(statement.sql.as_str(), &statement.params()[..])
                .await?;
            row.as_ref().map(record_from_row).transpose()
        })
        .await
    }

    async fn create_many(
        &self,
        options: &WorkspaceQueryRunnerOptions,
        data: Vec<RecordData>,
    ) -> ApiResult<Vec<RecordData>> {
        observe(ResolverMethod::CreateMany, options, async {
            let object = &options.object_metadata_item;
            let statements = data
                .into_iter()
                .map(|record| {
                    let record = prepare_create(object, record)?;
                    sql::insert(&options.object_metadata_collection, object, &record)
                })
                .collect::<ApiResult<Vec<_>>>()?;

            let mut conn = self.db.get_conn().await?;
            let tx = conn.transaction().await?;
            let mut created = Vec::with_capacity(statements.len());
            for statement in &statements {
                created.extend(records_from_rows(&fetch(&tx, statement).await?)?);
            }
            tx.commit().await?;
            Ok(created)
        })
        .await
    }

    async fn create_one(
        &self,
        options: &WorkspaceQueryRunnerOptions,
        data: RecordData,
    ) -> ApiResult<RecordData> {
        let mut created = self.create_many(options, vec![data]).await?;
        created
            .pop()
            .ok_or_else(|| ApiError::internal_error("Insert returned no row"))
    }

    async fn update_one(
        &self,
        options: &WorkspaceQueryRunnerOptions,
        id: Uuid,
        data: RecordData,
    ) -> ApiResult<RecordData> {
        let mut updated = self.update_many(options, id_filter(id), data).await?;
        updated.pop().ok_or_else(|| {
            ApiError::new(
                ErrorCode::RecordNotFound,
                format!("Record '{}' of '{}' not found", id, options.object_name()),
            )
        })
    }

    async fn update_many(
        &self,
        options: &WorkspaceQueryRunnerOptions,
        filter: FilterClause,
        data: RecordData,
    ) -> ApiResult<Vec<RecordData>> {
        observe(ResolverMethod::UpdateMany, options, async {
            let object = &options.object_metadata_item;
            let data = prepare_update(object, data)?;
            let statement = sql::update(&options.object_metadata_collection, object, &filter, &data)?;

            let mut conn = self.db.get_conn().await?;
            let tx = conn.transaction().await?;
            let updated = records_from_rows(&fetch(&tx, &statement).await?)?;
            tx.commit().await?;
            Ok(updated)
        })
        .await
    }

    async fn delete_one(
        &self,
        options: &WorkspaceQueryRunnerOptions,
        id: Uuid,
    ) -> ApiResult<RecordData> {
        let mut deleted = observe(
            ResolverMethod::DeleteOne,
            options,
            self.delete_ids(options, None, vec![id]),
        )
        .await?;
        deleted.pop().ok_or_else(|| {
            ApiError::new(
                ErrorCode::RecordNotFound,
                format!("Record '{}' of '{}' not found", id, options.object_name()),
            )
        })
    }

    async fn delete_many(
        &self,
        options: &WorkspaceQueryRunnerOptions,
        filter: FilterClause,
    ) -> ApiResult<Vec<RecordData>> {
        observe(ResolverMethod::DeleteMany, options, async {
            let select = sql::select_ids(
                &options.object_metadata_collection,
                &options.object_metadata_item,
                &filter,
            )?;
            self.delete_ids(options, Some(select), Vec::new()).await
        })
        .await
    }
}
