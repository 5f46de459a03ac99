//! Per-workspace schema cache
//!
//! Schemas are keyed by workspace id and tagged with the metadata version
//! they were built from. A lookup with a newer version rebuilds. Builds for
//! one workspace are serialized; different workspaces build in parallel.

use crate::error::ApiResult;
use crate::graphql::schema::WorkspaceSchemaBuilder;
use crate::metadata_store::MetadataEvent;
use crate::telemetry::metrics::with_metrics;
use async_graphql::dynamic::Schema;
use crm_core::WorkspaceMetadata;
use dashmap::DashMap;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{broadcast, Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

#[derive(Clone)]
struct CachedSchema {
    version: u64,
    schema: Schema,
    built_at: Instant,
}

pub struct WorkspaceSchemaCache {
    builder: WorkspaceSchemaBuilder,
    inner: RwLock<HashMap<Uuid, CachedSchema>>,
    build_locks: DashMap<Uuid, Arc<Mutex<()>>>,
    capacity: usize,
}

impl WorkspaceSchemaCache {
    pub fn new(builder: WorkspaceSchemaBuilder, capacity: usize) -> Self {
        Self {
            builder,
            inner: RwLock::default(),
            build_locks: DashMap::new(),
            capacity: capacity.max(1),
        }
    }

    async fn cached(&self, workspace_id: Uuid, version: u64) -> Option<Schema> {
        let guard = self.inner.read().await;
        guard
            .get(&workspace_id)
            .filter(|cached| cached.version >= version)
            .map(|cached| cached.schema.clone())
    }

    /// Schema for the given snapshot, built on a miss.
    pub async fn get_or_build(&self, metadata: Arc<WorkspaceMetadata>) -> ApiResult<Schema> {
        let workspace_id = metadata.workspace_id;
        let version = metadata.version;

        if let Some(schema) = self.cached(workspace_id, version).await {
            with_metrics(|m| m.record_schema_cache_lookup(true));
            return Ok(schema);
        }
        with_metrics(|m| m.record_schema_cache_lookup(false));

        let lock = Arc::clone(self.build_locks.entry(workspace_id).or_default().value());
        let building = lock.lock().await;

        // Another request may have built it while we waited.
        if let Some(schema) = self.cached(workspace_id, version).await {
            return Ok(schema);
        }

        let started = Instant::now();
        let built = self.builder.build(metadata);
        let elapsed = started.elapsed().as_secs_f64();
        with_metrics(|m| m.record_schema_build(built.is_ok(), elapsed));
        let schema = match built {
            Ok(schema) => schema,
            Err(err) => {
                drop(building);
                drop(lock);
                self.release_build_lock(workspace_id);
                return Err(err);
            }
        };

        let mut guard = self.inner.write().await;
        if guard.len() >= self.capacity && !guard.contains_key(&workspace_id) {
            let oldest = guard
                .iter()
                .min_by_key(|(_, cached)| cached.built_at)
                .map(|(id, _)| *id);
            if let Some(oldest) = oldest {
                guard.remove(&oldest);
                self.release_build_lock(oldest);
                debug!(workspace_id = %oldest, "Evicted workspace schema");
            }
        }
        guard.insert(
            workspace_id,
            CachedSchema {
                version,
                schema: schema.clone(),
                built_at: Instant::now(),
            },
        );
        info!(%workspace_id, version, elapsed_secs = elapsed, "Cached workspace schema");
        Ok(schema)
    }

    /// Drops the build lock of a workspace nobody is building or waiting on.
    fn release_build_lock(&self, workspace_id: Uuid) {
        self.build_locks
            .remove_if(&workspace_id, |_, lock| Arc::strong_count(lock) == 1);
    }

    pub async fn invalidate(&self, workspace_id: Uuid) {
        if self.inner.write().await.remove(&workspace_id).is_some() {
            debug!(%workspace_id, "Invalidated workspace schema");
        }
        self.release_build_lock(workspace_id);
    }

    pub async fn clear(&self) {
        self.inner.write().await.clear();
        self.build_locks
            .retain(|_, lock| Arc::strong_count(lock) > 1);
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.read().await.is_empty()
    }

    /// Drops cached schemas as metadata events arrive. A lagging receiver
    /// has missed events and clears everything.
    pub fn spawn_invalidation_listener(
        self: Arc<Self>,
        mut events: broadcast::Receiver<MetadataEvent>,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(event) => self.invalidate(event.workspace_id).await,
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(skipped, "Metadata events lagged, clearing schema cache");
                        self.clear().await;
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{DbClient, DbConfig};
    use crate::runner::PgWorkspaceQueryRunner;
    use crm_core::standard_objects::{standard_workspace, standard_workspace_builder};
    use crm_core::ObjectMetadataBuilder;

    // Building a schema never touches the database; the pool stays lazy.
    fn cache(capacity: usize) -> ApiResult<WorkspaceSchemaCache> {
        let db = DbClient::from_config(&DbConfig::default())?;
        let builder = WorkspaceSchemaBuilder::new(Arc::new(PgWorkspaceQueryRunner::new(db)));
        Ok(WorkspaceSchemaCache::new(builder, capacity))
    }

    #[tokio::test]
    async fn test_eviction_releases_build_lock() -> ApiResult<()> {
        let cache = cache(1)?;
        for _ in 0..5 {
            let metadata = standard_workspace(Uuid::now_v7(), [])?;
            cache.get_or_build(Arc::new(metadata)).await?;
        }
        assert_eq!(cache.len().await, 1);
        assert_eq!(cache.build_locks.len(), 1);
        Ok(())
    }

    #[tokio::test]
    async fn test_failed_build_and_invalidation_release_build_lock() -> ApiResult<()> {
        let cache = cache(8)?;
        let broken = standard_workspace_builder(Uuid::now_v7())
            .object(ObjectMetadataBuilder::new("pageInfo", "pageInfos").custom().build())
            .build()?;
        assert!(cache.get_or_build(Arc::new(broken)).await.is_err());
        assert!(cache.build_locks.is_empty());

        let metadata = standard_workspace(Uuid::now_v7(), [])?;
        let workspace_id = metadata.workspace_id;
        cache.get_or_build(Arc::new(metadata)).await?;
        assert_eq!(cache.build_locks.len(), 1);
        cache.invalidate(workspace_id).await;
        assert!(cache.build_locks.is_empty());
        assert!(cache.is_empty().await);
        Ok(())
    }
}
