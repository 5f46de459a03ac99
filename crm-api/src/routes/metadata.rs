//! Metadata Routes
//!
//! Read the caller's workspace objects, register custom objects and toggle
//! feature flags. Every change bumps the workspace metadata version, which
//! retires the cached GraphQL schema.

use axum::{
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    routing::{get, put},
    Json, Router,
};
use crm_core::{FeatureFlagKey, ObjectDefinition, ObjectMetadataItem, RelationDefinition, WorkspaceMetadata};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{ApiError, ApiResult};
use crate::middleware::WorkspaceExtractor;
use crate::state::AppState;

// ============================================================================
// TYPES
// ============================================================================

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectsResponse {
    pub workspace_id: Uuid,
    pub version: u64,
    pub feature_flags: Vec<FeatureFlagKey>,
    /// Enabled objects, projected to their enabled fields.
    pub objects: Vec<ObjectMetadataItem>,
}

impl ObjectsResponse {
    fn from_metadata(metadata: &WorkspaceMetadata) -> Self {
        Self {
            workspace_id: metadata.workspace_id,
            version: metadata.version,
            feature_flags: metadata.feature_flags.iter().copied().collect(),
            objects: metadata
                .enabled_objects()
                .map(|object| metadata.visible_object(object))
                .collect(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct RegisterObjectRequest {
    pub object: ObjectDefinition,
    #[serde(default)]
    pub relations: Vec<RelationDefinition>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct FeatureFlagRequest {
    pub flag: FeatureFlagKey,
    pub enabled: bool,
}

// ============================================================================
// HANDLERS
// ============================================================================

/// GET /metadata/objects
pub async fn list_objects(
    State(state): State<AppState>,
    WorkspaceExtractor(workspace): WorkspaceExtractor,
) -> ApiResult<Json<ObjectsResponse>> {
    let metadata = state.workspace(workspace.workspace_id).await?;
    Ok(Json(ObjectsResponse::from_metadata(&metadata)))
}

/// POST /metadata/objects
pub async fn register_object(
    State(state): State<AppState>,
    WorkspaceExtractor(workspace): WorkspaceExtractor,
    Json(request): Json<RegisterObjectRequest>,
) -> ApiResult<impl IntoResponse> {
    let name = request.object.name_singular.clone();
    let metadata = state
        .metadata
        .register_object(workspace.workspace_id, request.object, request.relations)
        .await?;
    state.sync_storage(&metadata).await?;

    let object = metadata
        .object(&name)
        .map(|object| metadata.visible_object(object))
        .ok_or_else(|| ApiError::object_not_found(&name))?;
    Ok((StatusCode::CREATED, Json(object)))
}

/// PUT /metadata/feature-flags
pub async fn set_feature_flag(
    State(state): State<AppState>,
    WorkspaceExtractor(workspace): WorkspaceExtractor,
    Json(request): Json<FeatureFlagRequest>,
) -> ApiResult<Json<ObjectsResponse>> {
    let metadata = state
        .metadata
        .set_feature_flag(workspace.workspace_id, request.flag, request.enabled)
        .await?;
    state.sync_storage(&metadata).await?;
    Ok(Json(ObjectsResponse::from_metadata(&metadata)))
}

/// Create the metadata router.
pub fn create_router() -> Router<AppState> {
    Router::new()
        .route("/objects", get(list_objects).post(register_object))
        .route("/feature-flags", put(set_feature_flag))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crm_test_utils::fixtures::standard_workspace;

    #[test]
    fn test_objects_response_hides_gated_objects() -> ApiResult<()> {
        let metadata = standard_workspace()?;
        let response = ObjectsResponse::from_metadata(&metadata);
        assert!(response.objects.iter().any(|o| o.name_singular == "company"));
        assert!(response
            .objects
            .iter()
            .all(|o| o.name_singular != "calendarChannel"));
        assert!(response.feature_flags.is_empty());
        Ok(())
    }

    #[test]
    fn test_feature_flag_request_shape() -> ApiResult<()> {
        let request: FeatureFlagRequest =
            serde_json::from_str(r#"{"flag":"IS_CALENDAR_ENABLED","enabled":true}"#)?;
        assert_eq!(request.flag, FeatureFlagKey::IsCalendarEnabled);
        assert!(request.enabled);
        Ok(())
    }
}
