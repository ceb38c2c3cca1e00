use std::time::Instant;

use axum::{
    body::Body,
    extract::State,
    http::{HeaderName, HeaderValue, Request},
    middleware::Next,
    response::{IntoResponse, Response},
};
use portico_core::RequestContext;
use uuid::Uuid;

use crate::context::AppState;
use crate::gateway::{Credentials, Redirected, RequestHints};
use crate::metrics;

// Ensures each request has an X-Request-Id and mirrors it on the response
pub async fn request_id(mut req: Request<Body>, next: Next) -> Response {
    let header_name = HeaderName::from_static("x-request-id");

    let req_id_value = req
        .headers()
        .get(&header_name)
        .cloned()
        .unwrap_or_else(|| {
            HeaderValue::from_str(&Uuid::new_v4().to_string())
                .unwrap_or_else(|_| HeaderValue::from_static("unknown"))
        });

    // Downstream spans read it from extensions
    req.extensions_mut().insert(req_id_value.clone());

    let mut res = next.run(req).await;
    res.headers_mut().insert(header_name, req_id_value);
    res
}

pub async fn http_metrics(req: Request<Body>, next: Next) -> Response {
    let method = req.method().clone();
    let path = req.uri().path().to_string();
    let start = Instant::now();

    let res = next.run(req).await;

    metrics::record_http_request(method.as_str(), &path, res.status().as_u16(), start.elapsed());
    res
}

/// Resolves the caller's credentials into a `RequestContext` extension.
///
/// Requests re-dispatched by the redirect surface already carry one and are
/// passed through untouched.
pub async fn authenticate(
    State(state): State<AppState>,
    mut req: Request<Body>,
    next: Next,
) -> Response {
    if should_skip_authentication(&req) {
        return next.run(req).await;
    }

    let credentials = match Credentials::from_headers(req.headers()) {
        Ok(credentials) => credentials,
        Err(e) => return e.into_response(),
    };
    let hints = RequestHints::from_parts(req.method(), req.uri(), req.headers());

    match state.auth.resolve(&credentials, &hints).await {
        Ok(ctx) => {
            req.extensions_mut().insert(ctx);
            next.run(req).await
        }
        Err(e) => {
            tracing::debug!(scheme = credentials.scheme(), error = %e, "authentication failed");
            e.into_response()
        }
    }
}

fn should_skip_authentication(req: &Request<Body>) -> bool {
    let extensions = req.extensions();
    extensions.get::<Redirected>().is_some() && extensions.get::<RequestContext>().is_some()
}
