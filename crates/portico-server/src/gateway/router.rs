//! Redirect surface: `/x-api/{*path}`.
//!
//! Authenticates with the `x-api-key` query parameter, rewrites the path with
//! the tenant's rules and dispatches the rewritten request exactly once
//! through the inner router. The inner router has no `/x-api` route, so a
//! rewrite can never be rewritten again.

use std::convert::Infallible;

use axum::{
    Extension, Router,
    body::Body,
    extract::State,
    http::{Request, Uri},
    response::Response,
};
use tower::ServiceExt;

use super::auth::{API_KEY_HEADER, Credentials, RequestHints, query_param};
use super::error::GatewayError;
use crate::context::AppState;

/// Router that receives rewritten requests.
#[derive(Clone)]
pub struct InnerRouter(pub Router);

/// Marks a request that already went through the redirect surface. Carried
/// next to the resolved `RequestContext`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Redirected {
    pub from: String,
}

pub async fn x_api(
    State(state): State<AppState>,
    Extension(InnerRouter(inner)): Extension<InnerRouter>,
    req: Request<Body>,
) -> Result<Response, GatewayError> {
    let api_key = query_param(req.uri(), API_KEY_HEADER).ok_or_else(|| {
        GatewayError::Unauthorized("x-api-key query parameter is required".into())
    })?;

    let hints = RequestHints::from_parts(req.method(), req.uri(), req.headers());
    let ctx = state
        .auth
        .resolve(&Credentials::ApiKey(api_key), &hints)
        .await?;

    let from = req.uri().path().to_string();
    let to = state
        .redirector
        .rewrite(&ctx, &from)
        .await?
        .ok_or_else(|| GatewayError::NotFound(format!("no redirect rule matches '{from}'")))?;

    let (mut parts, body) = req.into_parts();
    parts.uri = rewritten_uri(&parts.uri, &to)?;
    parts.extensions.insert(ctx);
    parts.extensions.insert(Redirected { from });

    let response = inner.oneshot(Request::from_parts(parts, body)).await;
    Ok(unwrap_infallible(response))
}

/// `to` with the original query string.
fn rewritten_uri(original: &Uri, to: &str) -> Result<Uri, GatewayError> {
    let path_and_query = match original.query() {
        Some(query) => format!("{to}?{query}"),
        None => to.to_string(),
    };
    Uri::builder()
        .path_and_query(path_and_query)
        .build()
        .map_err(|e| GatewayError::BadRequest(format!("rewritten path '{to}' is not a valid uri: {e}")))
}

fn unwrap_infallible<T>(result: Result<T, Infallible>) -> T {
    match result {
        Ok(value) => value,
        Err(never) => match never {},
    }
}
