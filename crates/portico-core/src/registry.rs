//! Tenant registry: tenant key -> service bundle.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::bundle::ServiceBundle;
use crate::error::RegistryError;
use crate::tenant::{ResourceDescriptor, TenantKey};

/// Concurrency-safe map of tenants to their backend bundles.
///
/// Every operation is a single map access under one mutex. The lock is never
/// held across an `.await`, so bundles are built before `add` is called and
/// used after `get` returns.
#[derive(Default)]
pub struct TenantRegistry {
    bundles: Mutex<HashMap<TenantKey, Arc<ServiceBundle>>>,
}

impl TenantRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, tenant: &TenantKey) -> Result<Arc<ServiceBundle>, RegistryError> {
        self.bundles
            .lock()
            .get(tenant)
            .cloned()
            .ok_or_else(|| RegistryError::NotFound(tenant.clone()))
    }

    /// Registers a bundle. An existing registration is never replaced.
    pub fn add(&self, bundle: ServiceBundle, tenant: TenantKey) -> Result<(), RegistryError> {
        let mut bundles = self.bundles.lock();
        if bundles.contains_key(&tenant) {
            return Err(RegistryError::Conflict(tenant));
        }
        tracing::debug!(tenant = %tenant, "service bundle registered");
        bundles.insert(tenant, Arc::new(bundle));
        Ok(())
    }

    pub fn remove(&self, tenant: &TenantKey) -> Result<(), RegistryError> {
        match self.bundles.lock().remove(tenant) {
            Some(_) => {
                tracing::debug!(tenant = %tenant, "service bundle removed");
                Ok(())
            }
            None => Err(RegistryError::NotFound(tenant.clone())),
        }
    }

    /// Looks up the bundle serving a resolved resource.
    pub fn resolve(
        &self,
        descriptor: &ResourceDescriptor,
        shared_namespace: &str,
    ) -> Result<Arc<ServiceBundle>, RegistryError> {
        self.get(&descriptor.tenant_key(shared_namespace))
    }

    pub fn contains(&self, tenant: &TenantKey) -> bool {
        self.bundles.lock().contains_key(tenant)
    }

    pub fn len(&self) -> usize {
        self.bundles.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.bundles.lock().is_empty()
    }

    pub fn tenants(&self) -> Vec<TenantKey> {
        let mut keys: Vec<_> = self.bundles.lock().keys().cloned().collect();
        keys.sort();
        keys
    }

    /// Drops every registration.
    pub fn clear(&self) {
        self.bundles.lock().clear();
    }
}
