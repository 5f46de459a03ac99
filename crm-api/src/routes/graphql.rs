//! GraphQL API Routes
//!
//! Each workspace gets its own schema, generated from its metadata and
//! cached until the metadata changes.
//!
//! Endpoints:
//! - POST /graphql - Execute queries and mutations
//! - GET /graphql/schema - SDL of the caller's workspace schema
//! - GET /graphql/playground - GraphiQL playground

use async_graphql_axum::{GraphQLRequest, GraphQLResponse};
use axum::{
    extract::State,
    response::{Html, IntoResponse},
    routing::{get, post},
    Router,
};

use crate::error::ApiResult;
use crate::middleware::WorkspaceExtractor;
use crate::state::AppState;

/// Handler for GraphQL requests.
pub async fn graphql_handler(
    State(state): State<AppState>,
    WorkspaceExtractor(workspace): WorkspaceExtractor,
    req: GraphQLRequest,
) -> ApiResult<GraphQLResponse> {
    let metadata = state.workspace(workspace.workspace_id).await?;
    let schema = state.schemas.get_or_build(metadata).await?;
    // Resolvers read the workspace and user from request data.
    let request = req.into_inner().data(workspace);
    Ok(schema.execute(request).await.into())
}

/// Handler returning the workspace schema as SDL.
pub async fn sdl_handler(
    State(state): State<AppState>,
    WorkspaceExtractor(workspace): WorkspaceExtractor,
) -> ApiResult<String> {
    let metadata = state.workspace(workspace.workspace_id).await?;
    let schema = state.schemas.get_or_build(metadata).await?;
    Ok(schema.sdl())
}

/// Handler for GraphiQL playground.
pub async fn graphiql_handler() -> impl IntoResponse {
    Html(
        async_graphql::http::GraphiQLSource::build()
            .endpoint("/graphql")
            .finish(),
    )
}

/// Create the GraphQL routes router. Paths are absolute so the router can
/// be merged next to the public playground.
pub fn create_router() -> Router<AppState> {
    Router::new()
        .route("/graphql", post(graphql_handler))
        .route("/graphql/schema", get(sdl_handler))
}

/// Playground is served without workspace headers.
pub fn create_playground_router() -> Router<AppState> {
    Router::new().route("/graphql/playground", get(graphiql_handler))
}
