//! Axum Middleware for Workspace Context
//!
//! Authentication happens upstream. The gateway forwards the caller's
//! workspace and user as headers; this middleware validates them and injects
//! a [`WorkspaceContext`] into request extensions.
//!
//! - `X-Workspace-Id` (required): missing or malformed returns 401
//! - `X-User-Id` (optional): malformed returns 400

use crate::error::ApiError;
use axum::{
    async_trait,
    extract::{FromRequestParts, Request},
    http::{request::Parts, HeaderMap},
    middleware::Next,
    response::Response,
};
use uuid::Uuid;

pub const WORKSPACE_ID_HEADER: &str = "x-workspace-id";
pub const USER_ID_HEADER: &str = "x-user-id";

/// Tenant and caller of the current request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkspaceContext {
    pub workspace_id: Uuid,
    pub user_id: Option<Uuid>,
}

impl WorkspaceContext {
    /// Reads the context headers.
    pub fn from_headers(headers: &HeaderMap) -> Result<Self, ApiError> {
        let workspace_id = headers
            .get(WORKSPACE_ID_HEADER)
            .and_then(|h| h.to_str().ok())
            .map(str::trim)
            .filter(|h| !h.is_empty())
            .ok_or_else(|| ApiError::unauthorized("Workspace context required: provide X-Workspace-Id"))?;
        let workspace_id = Uuid::parse_str(workspace_id)
            .map_err(|_| ApiError::unauthorized("X-Workspace-Id must be a UUID"))?;

        let user_id = match headers.get(USER_ID_HEADER).and_then(|h| h.to_str().ok()) {
            None => None,
            Some(raw) if raw.trim().is_empty() => None,
            Some(raw) => Some(
                Uuid::parse_str(raw.trim())
                    .map_err(|_| ApiError::invalid_format("X-User-Id", "a UUID"))?,
            ),
        };

        Ok(Self {
            workspace_id,
            user_id,
        })
    }
}

// ============================================================================
// MIDDLEWARE FUNCTION
// ============================================================================

/// Rejects requests without a workspace and injects [`WorkspaceContext`].
///
/// ```ignore
/// let app = Router::new()
///     .route("/rest/*path", get(handler))
///     .layer(axum::middleware::from_fn(workspace_context_middleware));
/// ```
pub async fn workspace_context_middleware(
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let context = WorkspaceContext::from_headers(request.headers())?;
    tracing::Span::current().record("workspace_id", tracing::field::display(context.workspace_id));
    request.extensions_mut().insert(context);
    Ok(next.run(request).await)
}

// ============================================================================
// TYPED EXTRACTOR
// ============================================================================

/// Handler argument giving access to the [`WorkspaceContext`].
///
/// Requires `workspace_context_middleware` on the route; without it the
/// extractor fails with 500.
#[derive(Debug, Clone, Copy)]
pub struct WorkspaceExtractor(pub WorkspaceContext);

#[async_trait]
impl<S> FromRequestParts<S> for WorkspaceExtractor
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<WorkspaceContext>()
            .copied()
            .map(WorkspaceExtractor)
            .ok_or_else(|| {
                ApiError::internal_error(
                    "WorkspaceContext not found in request extensions. \
                     Ensure workspace_context_middleware is applied to this route.",
                )
            })
    }
}

impl std::ops::Deref for WorkspaceExtractor {
    type Target = WorkspaceContext;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}
