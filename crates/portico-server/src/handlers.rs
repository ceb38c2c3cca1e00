use axum::{
    Extension, Json,
    extract::{Path, State},
    http::{HeaderMap, StatusCode, header::CONTENT_TYPE},
    response::{IntoResponse, Response},
};
use portico_cache::StoreScope;
use portico_core::{RequestContext, SendCode};
use serde_json::{Value, json};

use crate::context::AppState;
use crate::gateway::auth::ENVIRONMENT_ID_HEADER;
use crate::gateway::items::envelope;
use crate::gateway::GatewayError;
use crate::metrics;

pub async fn healthz() -> impl IntoResponse {
    (StatusCode::OK, Json(json!({"status": "ok"})))
}

/// Ready while not shutting down and the shared distributed tier answers.
pub async fn readyz(State(state): State<AppState>) -> impl IntoResponse {
    let stats = state.cache.stats();
    let cache_ok = state.cache.is_distributed_available(&StoreScope::Shared).await;
    let ready = cache_ok && !state.is_shutting_down();

    let status = if ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (
        status,
        Json(json!({
            "status": if ready { "ready" } else { "not_ready" },
            "cache": {
                "mode": stats.mode,
                "available": cache_ok,
                "local_entries": stats.local_entries,
                "dedicated_stores": stats.dedicated_stores,
            },
            "tenants": state.registry.len(),
        })),
    )
}

pub async fn prometheus_metrics() -> Response {
    match metrics::render_metrics() {
        Some(body) => (
            StatusCode::OK,
            [(CONTENT_TYPE, "text/plain; version=0.0.4")],
            body,
        )
            .into_response(),
        None => (StatusCode::SERVICE_UNAVAILABLE, "metrics not initialized").into_response(),
    }
}

/// `POST /v1/invoke_function/{*path}`
pub async fn invoke_function(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Path(path): Path<String>,
    Json(body): Json<Value>,
) -> Result<Response, GatewayError> {
    let bundle = state
        .registry
        .resolve(&ctx.resource, state.shared_namespace())?;
    let payload = json!({
        "project_id": ctx.project_id,
        "environment_id": ctx.environment_id,
        "data": body,
    });

    let data = bundle.functions().invoke(&path, payload).await?;
    tracing::debug!(function = %path, project_id = %ctx.project_id, "function invoked");
    Ok(envelope(StatusCode::OK, "function invoked", data))
}

/// `POST /v2/send-code`: one-time code delivery, limited per recipient.
pub async fn send_code(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<SendCode>,
) -> Result<Response, GatewayError> {
    let environment_id = headers
        .get(ENVIRONMENT_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .ok_or_else(|| GatewayError::BadRequest("Environment-Id header is required".into()))?
        .to_string();

    if request.recipient.trim().is_empty() {
        return Err(GatewayError::BadRequest("recipient is required".into()));
    }
    if !matches!(request.channel.as_str(), "EMAIL" | "PHONE") {
        return Err(GatewayError::BadRequest(format!(
            "type must be EMAIL or PHONE, got '{}'",
            request.channel
        )));
    }

    if !state.limiter.allow_send_code(&request.recipient).await {
        metrics::record_rate_limited("send_code");
        return Err(GatewayError::TooManyRequests(
            "too many codes sent to this recipient".into(),
        ));
    }

    let resource = state.auth.resolve_environment(&environment_id).await?;
    let bundle = state
        .registry
        .resolve(&resource, state.shared_namespace())?;
    let data = bundle.notifications().send_code(request).await?;
    Ok(envelope(StatusCode::OK, "code sent", data))
}
