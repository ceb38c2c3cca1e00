pub mod bootstrap;
pub mod clients;
pub mod config;
pub mod context;
pub mod gateway;
pub mod handlers;
pub mod metrics;
pub mod middleware;
pub mod observability;
pub mod server;

pub use config::AppConfig;
pub use context::{AppState, GatewayContext};
pub use observability::{init_tracing, shutdown_tracing};
pub use server::{PorticoServer, ServerBuilder, build_app};
