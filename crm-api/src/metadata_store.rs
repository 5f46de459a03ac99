//! Workspace Metadata Store
//!
//! Holds one immutable [`WorkspaceMetadata`] snapshot per workspace. Every
//! change swaps in a new snapshot with a bumped version and is announced on
//! a broadcast channel so derived state (cached GraphQL schemas) can be
//! dropped.

use crate::error::{ApiError, ApiResult};
use async_trait::async_trait;
use crm_core::standard_objects::{standard_workspace, standard_workspace_builder};
use crm_core::{
    FeatureFlagKey, ObjectDefinition, RelationDefinition, WorkspaceMetadata,
    WorkspaceMetadataBuilder,
};
use dashmap::{mapref::entry::Entry, DashMap};
use serde::Deserialize;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, info};
use uuid::Uuid;

const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Emitted whenever a workspace snapshot is replaced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MetadataEvent {
    pub workspace_id: Uuid,
    pub version: u64,
}

/// Source of workspace metadata snapshots.
#[async_trait]
pub trait MetadataStore: Send + Sync {
    /// Current snapshot of a workspace.
    async fn workspace(&self, workspace_id: Uuid) -> ApiResult<Arc<WorkspaceMetadata>>;

    /// All known workspaces.
    async fn workspaces(&self) -> Vec<Arc<WorkspaceMetadata>>;

    /// Registers a custom object and its relations.
    async fn register_object(
        &self,
        workspace_id: Uuid,
        definition: ObjectDefinition,
        relations: Vec<RelationDefinition>,
    ) -> ApiResult<Arc<WorkspaceMetadata>>;

    /// Switches a feature flag on or off.
    async fn set_feature_flag(
        &self,
        workspace_id: Uuid,
        flag: FeatureFlagKey,
        enabled: bool,
    ) -> ApiResult<Arc<WorkspaceMetadata>>;

    /// Stream of snapshot replacements.
    fn subscribe(&self) -> broadcast::Receiver<MetadataEvent>;
}

// ============================================================================
// IN-MEMORY STORE
// ============================================================================

/// Process-local store backed by a concurrent map.
pub struct InMemoryMetadataStore {
    workspaces: DashMap<Uuid, Arc<WorkspaceMetadata>>,
    events: broadcast::Sender<MetadataEvent>,
    /// Unknown workspaces get the standard objects on first access.
    auto_provision: bool,
}

impl InMemoryMetadataStore {
    pub fn new(auto_provision: bool) -> Self {
        let (events, _rx) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            workspaces: DashMap::new(),
            events,
            auto_provision,
        }
    }

    /// Builds a store from a YAML workspace manifest.
    pub fn from_manifest_str(manifest: &str, auto_provision: bool) -> ApiResult<Self> {
        let manifest: WorkspaceManifest = serde_yaml::from_str(manifest)?;
        let store = Self::new(auto_provision);
        for workspace in manifest.workspaces {
            store.insert(workspace.into_metadata()?);
        }
        Ok(store)
    }

    /// Loads a YAML workspace manifest from disk.
    pub fn load(path: &Path, auto_provision: bool) -> ApiResult<Self> {
        let manifest = std::fs::read_to_string(path).map_err(|e| {
            ApiError::invalid_input(format!(
                "Failed to read workspace manifest {}: {}",
                path.display(),
                e
            ))
        })?;
        let store = Self::from_manifest_str(&manifest, auto_provision)?;
        info!(
            path = %path.display(),
            workspaces = store.workspaces.len(),
            "Workspace manifest loaded"
        );
        Ok(store)
    }

    /// Replaces a workspace snapshot wholesale.
    pub fn insert(&self, metadata: WorkspaceMetadata) -> Arc<WorkspaceMetadata> {
        let metadata = Arc::new(metadata);
        self.workspaces
            .insert(metadata.workspace_id, Arc::clone(&metadata));
        self.publish(&metadata);
        metadata
    }

    fn provision(&self, workspace_id: Uuid) -> ApiResult<WorkspaceMetadata> {
        if !self.auto_provision {
            return Err(ApiError::workspace_not_found(workspace_id));
        }
        info!(workspace_id = %workspace_id, "Provisioning standard workspace");
        Ok(standard_workspace(workspace_id, [])?)
    }

    fn publish(&self, metadata: &WorkspaceMetadata) {
        let event = MetadataEvent {
            workspace_id: metadata.workspace_id,
            version: metadata.version,
        };
        if self.events.send(event).is_err() {
            debug!(workspace_id = %event.workspace_id, "No metadata subscribers");
        }
    }

    /// Applies `change` to the current snapshot under the shard lock.
    /// Subscribers are notified only when the version moves.
    fn update(
        &self,
        workspace_id: Uuid,
        change: impl FnOnce(&WorkspaceMetadata) -> ApiResult<WorkspaceMetadata>,
    ) -> ApiResult<Arc<WorkspaceMetadata>> {
        let next = match self.workspaces.entry(workspace_id) {
            Entry::Occupied(mut entry) => {
                let next = change(entry.get())?;
                if next.version == entry.get().version {
                    return Ok(Arc::clone(entry.get()));
                }
                let next = Arc::new(next);
                entry.insert(Arc::clone(&next));
                next
            }
            Entry::Vacant(entry) => {
                let base = self.provision(workspace_id)?;
                let next = Arc::new(change(&base)?);
                entry.insert(Arc::clone(&next));
                next
            }
        };
        self.publish(&next);
        Ok(next)
    }
}

#[async_trait]
impl MetadataStore for InMemoryMetadataStore {
    async fn workspace(&self, workspace_id: Uuid) -> ApiResult<Arc<WorkspaceMetadata>> {
        if let Some(metadata) = self.workspaces.get(&workspace_id) {
            return Ok(Arc::clone(metadata.value()));
        }
        let metadata = match self.workspaces.entry(workspace_id) {
            Entry::Occupied(entry) => return Ok(Arc::clone(entry.get())),
            Entry::Vacant(entry) => {
                let metadata = Arc::new(self.provision(workspace_id)?);
                entry.insert(Arc::clone(&metadata));
                metadata
            }
        };
        self.publish(&metadata);
        Ok(metadata)
    }

    async fn workspaces(&self) -> Vec<Arc<WorkspaceMetadata>> {
        self.workspaces
            .iter()
            .map(|entry| Arc::clone(entry.value()))
            .collect()
    }

    async fn register_object(
        &self,
        workspace_id: Uuid,
        definition: ObjectDefinition,
        relations: Vec<RelationDefinition>,
    ) -> ApiResult<Arc<WorkspaceMetadata>> {
        let name = definition.name_singular.clone();
        let metadata = self.update(workspace_id, |current| {
            Ok(current.with_custom_object(definition, relations)?)
        })?;
        info!(
            workspace_id = %workspace_id,
            object = %name,
            version = metadata.version,
            "Custom object registered"
        );
        Ok(metadata)
    }

    async fn set_feature_flag(
        &self,
        workspace_id: Uuid,
        flag: FeatureFlagKey,
        enabled: bool,
    ) -> ApiResult<Arc<WorkspaceMetadata>> {
        let metadata = self.update(workspace_id, |current| {
            Ok(current.with_feature_flag(flag, enabled))
        })?;
        info!(
            workspace_id = %workspace_id,
            flag = %flag,
            enabled,
            version = metadata.version,
            "Feature flag updated"
        );
        Ok(metadata)
    }

    fn subscribe(&self) -> broadcast::Receiver<MetadataEvent> {
        self.events.subscribe()
    }
}

// ============================================================================
// MANIFEST
// ============================================================================

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct WorkspaceManifest {
    #[serde(default)]
    workspaces: Vec<WorkspaceEntry>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct WorkspaceEntry {
    id: Uuid,
    #[serde(default = "default_true")]
    include_standard_objects: bool,
    #[serde(default)]
    feature_flags: Vec<FeatureFlagKey>,
    #[serde(default)]
    objects: Vec<ObjectDefinition>,
    #[serde(default)]
    relations: Vec<RelationDefinition>,
}

fn default_true() -> bool {
    true
}

impl WorkspaceEntry {
    fn into_metadata(self) -> ApiResult<WorkspaceMetadata> {
        let builder = if self.include_standard_objects {
            standard_workspace_builder(self.id)
        } else {
            WorkspaceMetadataBuilder::new(self.id)
        };
        let builder = self
            .objects
            .into_iter()
            .fold(builder, |b, definition| b.object(definition.into_metadata(true)));
        let builder = self
            .relations
            .into_iter()
            .fold(builder, |b, relation| b.relation(relation));
        Ok(builder.feature_flags(self.feature_flags).build()?)
    }
}
