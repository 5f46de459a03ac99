//! In-memory query runner for route and resolver tests.
//!
//! Records live in per-object vectors. Filters understand `eq` and `in`
//! leaves and `and` composites; anything else matches every record. Every
//! call is logged so tests can assert on dispatch.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use crm_api::{ApiError, ApiResult, WorkspaceQueryRunner, WorkspaceQueryRunnerOptions};
use crm_core::{
    Conjunction, Cursor, FilterClause, FilterOperator, FilterValue, PageInfo, QueryArgs,
    RecordConnection, RecordData, RecordEdge, ResolverMethod, ID_FIELD,
};
use serde_json::Value;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq)]
pub struct RecordedCall {
    pub method: ResolverMethod,
    pub object: String,
    pub workspace_id: Uuid,
    pub user_id: Option<Uuid>,
    pub filter: Option<FilterClause>,
    pub field_name: Option<String>,
}

#[derive(Default)]
pub struct InMemoryRunner {
    records: Mutex<HashMap<String, Vec<RecordData>>>,
    calls: Mutex<Vec<RecordedCall>>,
}

fn value_matches(value: Option<&Value>, expected: &FilterValue) -> bool {
    match (value, expected) {
        (Some(Value::String(actual)), FilterValue::Text(expected)) => actual == expected,
        (Some(Value::Number(actual)), FilterValue::Number(expected)) => {
            actual.as_f64() == Some(*expected)
        }
        (Some(Value::Bool(actual)), FilterValue::Boolean(expected)) => actual == expected,
        _ => false,
    }
}

fn matches(record: &RecordData, filter: &FilterClause) -> bool {
    match filter {
        FilterClause::Leaf {
            field,
            operator: FilterOperator::Eq,
            value,
        } => value_matches(record.get(field), value),
        FilterClause::Leaf {
            field,
            operator: FilterOperator::In,
            value: FilterValue::List(values),
        } => values
            .iter()
            .any(|value| value_matches(record.get(field), value)),
        FilterClause::Leaf { .. } => true,
        FilterClause::Composite {
            conjunction: Conjunction::And,
            clauses,
        } => clauses.iter().all(|clause| matches(record, clause)),
        FilterClause::Composite { .. } => true,
    }
}

fn not_found(options: &WorkspaceQueryRunnerOptions, id: Uuid) -> ApiError {
    ApiError::record_not_found(options.object_name(), id)
}

impl InMemoryRunner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_records(self, object: &str, records: Vec<Value>) -> Self {
        let records = records
            .into_iter()
            .filter_map(|value| match value {
                Value::Object(map) => Some(map),
                _ => None,
            })
            .collect();
        if let Ok(mut guard) = self.records.lock() {
            guard.insert(object.to_string(), records);
        }
        self
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().map(|calls| calls.clone()).unwrap_or_default()
    }

    pub fn records(&self, object: &str) -> Vec<RecordData> {
        self.records
            .lock()
            .ok()
            .and_then(|guard| guard.get(object).cloned())
            .unwrap_or_default()
    }

    fn record_call(
        &self,
        method: ResolverMethod,
        options: &WorkspaceQueryRunnerOptions,
        filter: Option<&FilterClause>,
    ) {
        let call = RecordedCall {
            method,
            object: options.object_name().to_string(),
            workspace_id: options.workspace_id,
            user_id: options.user_id,
            filter: filter.cloned(),
            field_name: options.info.as_ref().map(|info| info.field_name.clone()),
        };
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(call);
        }
    }

    fn matching(&self, object: &str, filter: Option<&FilterClause>) -> Vec<RecordData> {
        self.records(object)
            .into_iter()
            .filter(|record| filter.map_or(true, |f| matches(record, f)))
            .collect()
    }

    fn with_table<T>(&self, object: &str, f: impl FnOnce(&mut Vec<RecordData>) -> T) -> ApiResult<T> {
        let mut guard = self
            .records
            .lock()
            .map_err(|_| ApiError::internal_error("runner lock poisoned"))?;
        Ok(f(guard.entry(object.to_string()).or_default()))
    }

    fn insert(
        &self,
        options: &WorkspaceQueryRunnerOptions,
        data: Vec<RecordData>,
    ) -> ApiResult<Vec<RecordData>> {
        let created: Vec<RecordData> = data
            .into_iter()
            .map(|mut record| {
                if !record.contains_key(ID_FIELD) {
                    record.insert(ID_FIELD.to_string(), Value::String(Uuid::now_v7().to_string()));
                }
                record
            })
            .collect();
        let stored = created.clone();
        self.with_table(options.object_name(), move |table| table.extend(stored))?;
        Ok(created)
    }
}

#[async_trait]
impl WorkspaceQueryRunner for InMemoryRunner {
    async fn find_many(
        &self,
        options: &WorkspaceQueryRunnerOptions,
        args: QueryArgs,
    ) -> ApiResult<RecordConnection> {
        self.record_call(ResolverMethod::FindMany, options, args.filter.as_ref());
        let matching = self.matching(options.object_name(), args.filter.as_ref());
        let total_count = matching.len() as i64;
        let page_size = args.pagination.page_size() as usize;
        let start = args.pagination.after.as_ref().map_or(0, |cursor| {
            matching
                .iter()
                .position(|node| node.get(ID_FIELD) == Some(&Value::String(cursor.id.to_string())))
                .map_or(matching.len(), |index| index + 1)
        });
        let remaining = matching.len().saturating_sub(start);
        let edges: Vec<RecordEdge> = matching
            .into_iter()
            .skip(start)
            .take(page_size)
            .map(|node| {
                let id = node
                    .get(ID_FIELD)
                    .and_then(Value::as_str)
                    .and_then(|id| Uuid::parse_str(id).ok())
                    .unwrap_or_default();
                RecordEdge {
                    cursor: Cursor::new(id).encode(),
                    node,
                }
            })
            .collect();
        let page_info = PageInfo {
            has_next_page: edges.len() < remaining,
            has_previous_page: start > 0,
            start_cursor: edges.first().map(|edge| edge.cursor.clone()),
            end_cursor: edges.last().map(|edge| edge.cursor.clone()),
        };
        Ok(RecordConnection {
            edges,
            page_info,
            total_count,
        })
    }

    async fn find_one(
        &self,
        options: &WorkspaceQueryRunnerOptions,
        args: QueryArgs,
    ) -> ApiResult<Option<RecordData>> {
        self.record_call(ResolverMethod::FindOne, options, args.filter.as_ref());
        Ok(self
            .matching(options.object_name(), args.filter.as_ref())
            .into_iter()
            .next())
    }

    async fn create_many(
        &self,
        options: &WorkspaceQueryRunnerOptions,
        data: Vec<RecordData>,
    ) -> ApiResult<Vec<RecordData>> {
        self.record_call(ResolverMethod::CreateMany, options, None);
        self.insert(options, data)
    }

    async fn create_one(
        &self,
        options: &WorkspaceQueryRunnerOptions,
        data: RecordData,
    ) -> ApiResult<RecordData> {
        self.record_call(ResolverMethod::CreateOne, options, None);
        self.insert(options, vec![data])?
            .pop()
            .ok_or_else(|| ApiError::internal_error("create returned no record"))
    }

    async fn update_one(
        &self,
        options: &WorkspaceQueryRunnerOptions,
        id: Uuid,
        data: RecordData,
    ) -> ApiResult<RecordData> {
        let filter = FilterClause::leaf(ID_FIELD, FilterOperator::Eq, FilterValue::text(id.to_string()));
        self.record_call(ResolverMethod::UpdateOne, options, Some(&filter));
        self.with_table(options.object_name(), |table| {
            table
                .iter_mut()
                .find(|record| matches(record, &filter))
                .map(|record| {
                    record.extend(data);
                    record.clone()
                })
        })?
        .ok_or_else(|| not_found(options, id))
    }

    async fn update_many(
        &self,
        options: &WorkspaceQueryRunnerOptions,
        filter: FilterClause,
        data: RecordData,
    ) -> ApiResult<Vec<RecordData>> {
        self.record_call(ResolverMethod::UpdateMany, options, Some(&filter));
        self.with_table(options.object_name(), |table| {
            table
                .iter_mut()
                .filter(|record| matches(record, &filter))
                .map(|record| {
                    record.extend(data.clone());
                    record.clone()
                })
                .collect()
        })
    }

    async fn delete_one(
        &self,
        options: &WorkspaceQueryRunnerOptions,
        id: Uuid,
    ) -> ApiResult<RecordData> {
        let filter = FilterClause::leaf(ID_FIELD, FilterOperator::Eq, FilterValue::text(id.to_string()));
        self.record_call(ResolverMethod::DeleteOne, options, Some(&filter));
        self.with_table(options.object_name(), |table| {
            table
                .iter()
                .position(|record| matches(record, &filter))
                .map(|index| table.remove(index))
        })?
        .ok_or_else(|| not_found(options, id))
    }

    async fn delete_many(
        &self,
        options: &WorkspaceQueryRunnerOptions,
        filter: FilterClause,
    ) -> ApiResult<Vec<RecordData>> {
        self.record_call(ResolverMethod::DeleteMany, options, Some(&filter));
        self.with_table(options.object_name(), |table| {
            let (deleted, kept): (Vec<RecordData>, Vec<RecordData>) =
                table.drain(..).partition(|record| matches(record, &filter));
            *table = kept;
            deleted
        })
    }
}
