//! Gateway error type and its HTTP mapping.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use portico_cache::GuardError;
use portico_core::{RegistryError, ServiceError};
use serde_json::json;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum GatewayError {
    /// Missing, malformed or rejected credentials (401).
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Valid credentials without access, or expired ones (403).
    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Not found: {0}")]
    NotFound(String),

    /// No service bundle is registered for the resolved tenant (503).
    #[error("Tenant unavailable: {0}")]
    TenantUnavailable(String),

    #[error("Too many requests: {0}")]
    TooManyRequests(String),

    /// An upstream collaborator failed or answered garbage (502).
    #[error("Bad gateway: {0}")]
    BadGateway(String),

    /// The gateway is shutting down.
    #[error("Service unavailable: {0}")]
    ServiceUnavailable(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl GatewayError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::TenantUnavailable(_) | Self::ServiceUnavailable(_) => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            Self::TooManyRequests(_) => StatusCode::TOO_MANY_REQUESTS,
            Self::BadGateway(_) => StatusCode::BAD_GATEWAY,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Short label used for metrics.
    pub fn class(&self) -> &'static str {
        match self {
            Self::Unauthorized(_) => "unauthorized",
            Self::Forbidden(_) => "forbidden",
            Self::BadRequest(_) => "bad_request",
            Self::NotFound(_) => "not_found",
            Self::TenantUnavailable(_) => "tenant_unavailable",
            Self::TooManyRequests(_) => "too_many_requests",
            Self::BadGateway(_) => "bad_gateway",
            Self::ServiceUnavailable(_) => "service_unavailable",
            Self::Internal(_) => "internal",
        }
    }
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::warn!(error = %self, "request failed");
        }

        let body = json!({
            "status": status.canonical_reason().unwrap_or("ERROR").to_uppercase().replace(' ', "_"),
            "description": self.to_string(),
            "data": null,
        });

        (status, Json(body)).into_response()
    }
}

impl From<ServiceError> for GatewayError {
    fn from(e: ServiceError) -> Self {
        match e {
            ServiceError::Unauthenticated(_) => Self::Unauthorized(e.to_string()),
            ServiceError::PermissionDenied(_) | ServiceError::Expired(_) => {
                Self::Forbidden(e.to_string())
            }
            ServiceError::Invalid(_) => Self::BadRequest(e.to_string()),
            ServiceError::NotFound(_) => Self::NotFound(e.to_string()),
            ServiceError::Unavailable(_) | ServiceError::Decode(_) => {
                Self::BadGateway(e.to_string())
            }
        }
    }
}

impl From<GuardError<ServiceError>> for GatewayError {
    fn from(e: GuardError<ServiceError>) -> Self {
        match e {
            GuardError::Upstream(e) => e.into(),
            GuardError::Cancelled => Self::ServiceUnavailable("gateway is shutting down".into()),
        }
    }
}

impl From<RegistryError> for GatewayError {
    fn from(e: RegistryError) -> Self {
        Self::TenantUnavailable(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use portico_core::TenantKey;

    #[test]
    fn test_service_errors_map_to_status() {
        let cases = [
            (ServiceError::Unauthenticated("x".into()), StatusCode::UNAUTHORIZED),
            (ServiceError::PermissionDenied("x".into()), StatusCode::FORBIDDEN),
            (ServiceError::Expired("x".into()), StatusCode::FORBIDDEN),
            (ServiceError::Invalid("x".into()), StatusCode::BAD_REQUEST),
            (ServiceError::NotFound("x".into()), StatusCode::NOT_FOUND),
            (ServiceError::unavailable("x"), StatusCode::BAD_GATEWAY),
            (ServiceError::decode("x"), StatusCode::BAD_GATEWAY),
        ];
        for (err, status) in cases {
            assert_eq!(GatewayError::from(err).status(), status);
        }
    }

    #[test]
    fn test_missing_bundle_is_503() {
        let err = GatewayError::from(RegistryError::NotFound(TenantKey::new("p-1")));
        assert_eq!(err.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(err.class(), "tenant_unavailable");
    }

    #[tokio::test]
    async fn test_response_body_shape() {
        let response = GatewayError::TooManyRequests("slow down".into()).into_response();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);

        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["status"], "TOO_MANY_REQUESTS");
        assert_eq!(body["description"], "Too many requests: slow down");
        assert!(body["data"].is_null());
    }
}
