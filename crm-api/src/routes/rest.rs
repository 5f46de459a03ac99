//! REST Record Routes
//!
//! `/rest/{objectPlural}` and `/rest/{objectPlural}/{id}` for every enabled
//! object of the caller's workspace. Query parameters (`filter`,
//! `order_by`, `limit`, `depth`, `last_cursor`) and bodies are turned into a
//! structured query and handed to the workspace query runner.

use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::{Method, StatusCode},
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use crm_query::{QueryParams, RestMethod, RestRequest};
use serde_json::Value;

use crate::error::{ApiError, ApiResult};
use crate::middleware::WorkspaceExtractor;
use crate::runner::{execute_rest, WorkspaceQueryRunnerOptions};
use crate::state::AppState;

fn rest_method(method: &Method) -> ApiResult<RestMethod> {
    match *method {
        Method::GET => Ok(RestMethod::Get),
        Method::POST => Ok(RestMethod::Post),
        Method::PATCH => Ok(RestMethod::Patch),
        Method::PUT => Ok(RestMethod::Put),
        Method::DELETE => Ok(RestMethod::Delete),
        _ => Err(ApiError::invalid_input(format!(
            "Method {} is not supported on REST records",
            method
        ))),
    }
}

fn parse_body(body: &Bytes) -> ApiResult<Option<Value>> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(None);
    }
    Ok(Some(serde_json::from_slice(body)?))
}

/// Any method on `/rest/*path`.
pub async fn handle_record_request(
    State(state): State<AppState>,
    WorkspaceExtractor(workspace): WorkspaceExtractor,
    method: Method,
    Path(path): Path<String>,
    Query(query): Query<QueryParams>,
    body: Bytes,
) -> ApiResult<impl IntoResponse> {
    let method = rest_method(&method)?;
    let body = parse_body(&body)?;
    let metadata = state.workspace(workspace.workspace_id).await?;

    let request = RestRequest {
        method,
        path: &path,
        query: &query,
        body: body.as_ref(),
    };
    let rest_query = state.rest.build(&metadata, &request)?;
    tracing::debug!(
        workspace_id = %workspace.workspace_id,
        object = %rest_query.object.name_singular,
        method = %rest_query.query.method(),
        "REST query built"
    );

    let options = WorkspaceQueryRunnerOptions::new(
        Arc::new(rest_query.object),
        metadata,
        workspace.user_id,
    );
    let response = execute_rest(state.runner.as_ref(), rest_query.query, &options).await?;

    let status = if method == RestMethod::Post {
        StatusCode::CREATED
    } else {
        StatusCode::OK
    };
    Ok((status, Json(response)))
}

/// Create the REST records router.
pub fn create_router() -> Router<AppState> {
    Router::new().route(
        "/*path",
        get(handle_record_request)
            .post(handle_record_request)
            .patch(handle_record_request)
            .put(handle_record_request)
            .delete(handle_record_request),
    )
}
