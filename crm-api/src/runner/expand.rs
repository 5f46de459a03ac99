//! Relation embedding for REST reads
//!
//! `depth=1` embeds each record's direct relations, `depth=2` also embeds
//! the relations of those. Single-valued relations become an object or
//! null, one-to-many relations a list capped at the default page size.
//!
//! Reads are batched per level: every relation issues one `in` read over
//! the keys of all records at that level, paged until exhausted, and the
//! results are stitched back by key. Nested levels recurse once over all
//! fetched records of a relation.

use crate::error::ApiResult;
use crate::runner::{WorkspaceQueryRunner, WorkspaceQueryRunnerOptions};
use crm_core::{
    Cursor, FilterClause, FilterOperator, FilterValue, Pagination, QueryArgs, RecordData,
    DEFAULT_PAGE_SIZE, ID_FIELD, MAX_PAGE_SIZE,
};
use serde_json::Value;
use std::collections::{BTreeSet, HashMap};
use std::future::Future;
use std::pin::Pin;

type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

fn key_of<'r>(record: &'r RecordData, field: &str) -> Option<&'r str> {
    record.get(field).and_then(Value::as_str)
}

fn any_of(field: &str, keys: &[String]) -> FilterClause {
    FilterClause::leaf(
        field,
        FilterOperator::In,
        FilterValue::List(keys.iter().map(FilterValue::text).collect()),
    )
}

/// Every record of `target` whose `key_field` is one of `keys`. One-to-many
/// reads stop paging once each key holds a full list.
async fn fetch_related(
    runner: &dyn WorkspaceQueryRunner,
    target: &WorkspaceQueryRunnerOptions,
    key_field: &str,
    keys: &BTreeSet<String>,
    per_key_cap: Option<usize>,
) -> ApiResult<Vec<RecordData>> {
    let keys: Vec<String> = keys.iter().cloned().collect();
    let mut fetched = Vec::new();

    for chunk in keys.chunks(MAX_PAGE_SIZE as usize) {
        let mut counts: HashMap<String, usize> = HashMap::new();
        let mut after = None;
        loop {
            let args = QueryArgs {
                pagination: Pagination {
                    after,
                    ..Pagination::first(MAX_PAGE_SIZE)
                },
                ..QueryArgs::with_filter(Some(any_of(key_field, chunk)))
            };
            let connection = runner.find_many(target, args).await?;
            let has_next_page = connection.page_info.has_next_page;
            let end_cursor = connection.page_info.end_cursor.clone();

            for node in connection.into_nodes() {
                if let Some(key) = key_of(&node, key_field) {
                    *counts.entry(key.to_string()).or_default() += 1;
                }
                fetched.push(node);
            }

            let saturated = per_key_cap.is_some_and(|cap| {
                chunk
                    .iter()
                    .all(|key| counts.get(key).is_some_and(|n| *n >= cap))
            });
            match end_cursor {
                Some(cursor) if has_next_page && !saturated => {
                    after = Some(Cursor::decode(&cursor)?);
                }
                _ => break,
            }
        }
    }
    Ok(fetched)
}

/// Embeds relations of `records` up to `depth` levels.
pub fn expand_records<'a>(
    runner: &'a dyn WorkspaceQueryRunner,
    options: &'a WorkspaceQueryRunnerOptions,
    records: &'a mut [RecordData],
    depth: u8,
) -> BoxFuture<'a, ApiResult<()>> {
    Box::pin(async move {
        if depth == 0 || records.is_empty() {
            return Ok(());
        }
        let object = &options.object_metadata_item;

        for field in object.fields.iter().filter(|f| f.is_relation()) {
            let Some(link) = object.relation_for_field(&field.name) else {
                continue;
            };
            let target = options.for_object(link.target_object)?;
            let join_column = link.relation.join_column();

            // Many-to-one follows the join column to `id`; the inverse side
            // matches its own `id` against the target's join column.
            let (local_key, remote_key) = if link.owns_join_column {
                (join_column.as_str(), ID_FIELD)
            } else {
                (ID_FIELD, join_column.as_str())
            };
            let keys: BTreeSet<String> = records
                .iter()
                .filter_map(|record| key_of(record, local_key).map(str::to_string))
                .collect();

            let single = link.is_single();
            let cap = (!single).then_some(DEFAULT_PAGE_SIZE as usize);
            let mut related = if keys.is_empty() {
                Vec::new()
            } else {
                fetch_related(runner, &target, remote_key, &keys, cap).await?
            };
            if let Some(cap) = cap {
                let mut kept: HashMap<String, usize> = HashMap::new();
                related.retain(|node| {
                    let Some(key) = key_of(node, remote_key) else {
                        return false;
                    };
                    let count = kept.entry(key.to_string()).or_default();
                    *count += 1;
                    *count <= cap
                });
            }
            expand_records(runner, &target, &mut related, depth - 1).await?;

            let mut by_key: HashMap<String, Vec<RecordData>> = HashMap::new();
            for node in related {
                if let Some(key) = key_of(&node, remote_key).map(str::to_string) {
                    by_key.entry(key).or_default().push(node);
                }
            }

            for record in records.iter_mut() {
                let group = key_of(record, local_key).and_then(|key| by_key.get(key));
                let value = if single {
                    group
                        .and_then(|nodes| nodes.first())
                        .map_or(Value::Null, |node| Value::Object(node.clone()))
                } else if key_of(record, local_key).is_some() {
                    Value::Array(
                        group
                            .map(|nodes| nodes.iter().cloned().map(Value::Object).collect())
                            .unwrap_or_default(),
                    )
                } else {
                    continue;
                };
                record.insert(field.name.clone(), value);
            }
        }
        Ok(())
    })
}
