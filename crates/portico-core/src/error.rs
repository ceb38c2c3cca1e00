use thiserror::Error;

use crate::tenant::TenantKey;

/// Errors returned by the [`TenantRegistry`](crate::TenantRegistry).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    #[error("no service bundle registered for tenant '{0}'")]
    NotFound(TenantKey),

    #[error("a service bundle is already registered for tenant '{0}'")]
    Conflict(TenantKey),
}

/// Errors returned by backend collaborators.
///
/// The variants mirror the status classes the gateway cares about when it
/// turns an upstream failure into a client response.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ServiceError {
    #[error("authentication required: {0}")]
    Unauthenticated(String),

    #[error("permission denied: {0}")]
    PermissionDenied(String),

    #[error("credentials expired: {0}")]
    Expired(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("invalid request: {0}")]
    Invalid(String),

    #[error("upstream unavailable: {0}")]
    Unavailable(String),

    #[error("failed to decode upstream response: {0}")]
    Decode(String),
}

impl ServiceError {
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::Unavailable(message.into())
    }

    pub fn decode(message: impl Into<String>) -> Self {
        Self::Decode(message.into())
    }

    /// Whether the failure was caused by the caller rather than the upstream.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::Unauthenticated(_)
                | Self::PermissionDenied(_)
                | Self::Expired(_)
                | Self::NotFound(_)
                | Self::Invalid(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_error_display() {
        let err = RegistryError::NotFound(TenantKey::new("p-1"));
        assert_eq!(
            err.to_string(),
            "no service bundle registered for tenant 'p-1'"
        );
    }

    #[test]
    fn test_client_error_classification() {
        assert!(ServiceError::PermissionDenied("x".into()).is_client_error());
        assert!(ServiceError::Expired("x".into()).is_client_error());
        assert!(!ServiceError::unavailable("down").is_client_error());
        assert!(!ServiceError::decode("bad json").is_client_error());
    }
}
