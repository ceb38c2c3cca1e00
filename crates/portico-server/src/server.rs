use std::net::SocketAddr;

use axum::{
    Extension, Router,
    middleware,
    routing::{any, get, post},
};
use tower_http::{
    compression::CompressionLayer, cors::CorsLayer, timeout::TimeoutLayer, trace::TraceLayer,
};

use crate::{
    bootstrap,
    config::AppConfig,
    context::AppState,
    gateway::{InnerRouter, items, ratelimit, router},
    handlers, middleware as app_middleware,
};

pub struct PorticoServer {
    addr: SocketAddr,
    app: Router,
    state: AppState,
}

pub fn build_app(state: AppState) -> Router {
    let body_limit = state.config.server.body_limit_bytes;
    let request_timeout = state.config.server.request_timeout();

    // Authenticated routes. Also the target of redirect re-dispatch, which is
    // why it has no /x-api route of its own.
    let api = Router::new()
        .route(
            "/v2/items/{collection}",
            get(items::list).post(items::create).put(items::update),
        )
        .route(
            "/v2/items/{collection}/{id}",
            get(items::get_one)
                .put(items::update_one)
                .delete(items::delete),
        )
        .route("/v1/invoke_function/{*path}", post(handlers::invoke_function))
        // route_layer order: authenticate runs first, then the project limit
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            ratelimit::project_limit,
        ))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            app_middleware::authenticate,
        ))
        .route("/v2/send-code", post(handlers::send_code))
        .with_state(state.clone());

    let redirect = Router::new()
        .route("/x-api/{*path}", any(router::x_api))
        .layer(Extension(InnerRouter(api.clone())))
        .with_state(state.clone());

    Router::new()
        .route("/healthz", get(handlers::healthz))
        .route("/readyz", get(handlers::readyz))
        .route("/metrics", get(handlers::prometheus_metrics))
        .with_state(state)
        .merge(api)
        .merge(redirect)
        .layer(middleware::from_fn(app_middleware::http_metrics))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(|req: &axum::http::Request<_>| {
                    use tracing::field::Empty;
                    let req_id = req
                        .extensions()
                        .get::<axum::http::HeaderValue>()
                        .and_then(|v| v.to_str().ok())
                        .unwrap_or("")
                        .to_string();
                    tracing::info_span!(
                        "http.request",
                        http.method = %req.method(),
                        http.target = %req.uri(),
                        http.status_code = Empty,
                        request_id = %req_id
                    )
                })
                .on_response(
                    |res: &axum::http::Response<_>,
                     latency: std::time::Duration,
                     span: &tracing::Span| {
                        span.record(
                            "http.status_code",
                            tracing::field::display(res.status().as_u16()),
                        );
                        tracing::info!(
                            http.status = %res.status().as_u16(),
                            elapsed_ms = %latency.as_millis(),
                            "request handled"
                        );
                    },
                ),
        )
        .layer(CompressionLayer::new())
        .layer(CorsLayer::permissive())
        // Dropping the handler future also cancels any cache wait it is in.
        .layer(TimeoutLayer::new(request_timeout))
        .layer(axum::extract::DefaultBodyLimit::max(body_limit))
        .layer(middleware::from_fn(app_middleware::request_id))
}

pub struct ServerBuilder {
    addr: SocketAddr,
    config: AppConfig,
}

impl Default for ServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ServerBuilder {
    pub fn new() -> Self {
        let cfg = AppConfig::default();
        Self {
            addr: cfg.addr(),
            config: cfg,
        }
    }

    pub fn with_addr(mut self, addr: SocketAddr) -> Self {
        self.addr = addr;
        self
    }

    pub fn with_config(mut self, cfg: AppConfig) -> Self {
        self.addr = cfg.addr();
        self.config = cfg;
        self
    }

    /// Connects the cache tiers, registers tenant bundles and builds the
    /// router.
    pub async fn build(self) -> anyhow::Result<PorticoServer> {
        crate::metrics::init_metrics();
        let state = bootstrap::build_context(self.config).await?;
        let app = build_app(state.clone());

        Ok(PorticoServer {
            addr: self.addr,
            app,
            state,
        })
    }
}

impl PorticoServer {
    pub fn state(&self) -> &AppState {
        &self.state
    }

    pub async fn run(self) -> anyhow::Result<()> {
        let listener = tokio::net::TcpListener::bind(self.addr).await?;
        tracing::info!("listening on {}", self.addr);

        let token = self.state.shutdown_token();
        axum::serve(listener, self.app)
            .with_graceful_shutdown(async move {
                shutdown_signal().await;
                // Cancel in-flight cache waits before draining.
                token.cancel();
            })
            .await?;

        self.state.shutdown();
        Ok(())
    }
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    tracing::info!("shutdown signal received");
}
