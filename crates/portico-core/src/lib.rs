//! Core types for the Portico gateway.
//!
//! This crate holds everything the routing layer needs to talk about tenants
//! without knowing how the backends are reached:
//!
//! - [`TenantKey`] and [`ResourceDescriptor`]: who a request belongs to
//! - [`RequestContext`]: the per-request result of authentication
//! - capability traits for the backend collaborators ([`services`])
//! - [`ServiceBundle`] and the [`TenantRegistry`] that owns them

pub mod bundle;
pub mod context;
pub mod error;
pub mod registry;
pub mod services;
pub mod tenant;

pub use bundle::{ServiceBundle, ServiceBundleBuilder};
pub use context::{Principal, RequestContext};
pub use error::{RegistryError, ServiceError};
pub use registry::TenantRegistry;
pub use services::{
    AccessCheck, AccessGrant, ApiKeyGrant, BackendScope, FunctionService, IdentityService,
    ItemsBackend, NotificationService, RedirectRule, SendCode, TenantService,
};
pub use tenant::{
    DedicatedProject, NodeType, ResourceDescriptor, ResourceKind, ServiceEndpoints, TenantKey,
    TenantTier,
};
