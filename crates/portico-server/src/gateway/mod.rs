//! Request routing: authentication, tenant resolution, path redirection,
//! rate limiting and the item handlers built on them.

pub mod auth;
pub mod error;
pub mod items;
pub mod ratelimit;
pub mod redirect;
pub mod router;

pub use auth::{AuthResolver, Credentials, RequestHints};
pub use error::GatewayError;
pub use ratelimit::RateLimiter;
pub use redirect::{CompiledRule, MalformedRule, PathRedirector};
pub use router::{InnerRouter, Redirected};

use portico_cache::StoreScope;
use portico_core::{ResourceDescriptor, TenantTier};

/// Distributed cache instance for a resolved resource.
pub fn store_scope(descriptor: &ResourceDescriptor) -> StoreScope {
    match descriptor.tier() {
        TenantTier::Dedicated => StoreScope::dedicated(descriptor.project_id.clone()),
        TenantTier::Shared => StoreScope::Shared,
    }
}
