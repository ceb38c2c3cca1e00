//! Item handlers: forward record operations to the tenant's data backend.
//!
//! The backend is chosen once per request from the resolved descriptor; the
//! handlers themselves never branch on the resource kind.

use std::collections::HashMap;
use std::sync::Arc;

use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use portico_core::{BackendScope, ItemsBackend, RequestContext};
use serde_json::{Map, Value, json};

use super::auth::{API_KEY_HEADER, PROJECT_ID_QUERY};
use super::error::GatewayError;
use crate::context::AppState;

/// Standard success envelope.
pub fn envelope(status: StatusCode, description: &str, data: Value) -> Response {
    let label = status
        .canonical_reason()
        .unwrap_or("OK")
        .to_uppercase()
        .replace(' ', "_");
    (
        status,
        Json(json!({
            "status": label,
            "description": description,
            "data": data,
        })),
    )
        .into_response()
}

fn backend_for(
    state: &AppState,
    ctx: &RequestContext,
) -> Result<(Arc<dyn ItemsBackend>, BackendScope), GatewayError> {
    let bundle = state
        .registry
        .resolve(&ctx.resource, state.shared_namespace())?;
    Ok((bundle.items_for(&ctx.resource), BackendScope::from(&ctx.resource)))
}

/// Query-string filters for list calls, minus the gateway's own parameters.
fn list_query(params: HashMap<String, String>) -> Value {
    let map: Map<String, Value> = params
        .into_iter()
        .filter(|(k, _)| k != PROJECT_ID_QUERY && k != API_KEY_HEADER)
        .map(|(k, v)| (k, Value::String(v)))
        .collect();
    Value::Object(map)
}

pub async fn list(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Path(collection): Path<String>,
    Query(params): Query<HashMap<String, String>>,
) -> Result<Response, GatewayError> {
    let (backend, scope) = backend_for(&state, &ctx)?;
    let data = backend.list(&scope, &collection, list_query(params)).await?;
    Ok(envelope(StatusCode::OK, "items listed", data))
}

pub async fn get_one(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Path((collection, id)): Path<(String, String)>,
) -> Result<Response, GatewayError> {
    let (backend, scope) = backend_for(&state, &ctx)?;
    let data = backend.get(&scope, &collection, &id).await?;
    Ok(envelope(StatusCode::OK, "item found", data))
}

pub async fn create(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Path(collection): Path<String>,
    Json(body): Json<Value>,
) -> Result<Response, GatewayError> {
    let (backend, scope) = backend_for(&state, &ctx)?;
    let data = backend.create(&scope, &collection, body).await?;
    tracing::debug!(collection = %collection, project_id = %ctx.project_id, "item created");
    Ok(envelope(StatusCode::CREATED, "item created", data))
}

/// Bulk or filter update (`PUT /v2/items/{collection}`).
pub async fn update(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Path(collection): Path<String>,
    Json(body): Json<Value>,
) -> Result<Response, GatewayError> {
    let (backend, scope) = backend_for(&state, &ctx)?;
    let data = backend.update(&scope, &collection, None, body).await?;
    Ok(envelope(StatusCode::OK, "items updated", data))
}

pub async fn update_one(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Path((collection, id)): Path<(String, String)>,
    Json(body): Json<Value>,
) -> Result<Response, GatewayError> {
    let (backend, scope) = backend_for(&state, &ctx)?;
    let data = backend.update(&scope, &collection, Some(&id), body).await?;
    Ok(envelope(StatusCode::OK, "item updated", data))
}

pub async fn delete(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Path((collection, id)): Path<(String, String)>,
) -> Result<Response, GatewayError> {
    let (backend, scope) = backend_for(&state, &ctx)?;
    let data = backend.delete(&scope, &collection, &id).await?;
    tracing::debug!(collection = %collection, id = %id, project_id = %ctx.project_id, "item deleted");
    Ok(envelope(StatusCode::OK, "item deleted", data))
}
