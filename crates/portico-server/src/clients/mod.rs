//! HTTP clients for the platform collaborators.
//!
//! Every client wraps a [`ServiceClient`]: one shared `reqwest::Client`
//! (connection pool and per-call timeout) plus the collaborator's base URL.
//! Upstream statuses are folded into [`ServiceError`] here so the rest of the
//! gateway never sees transport details.

pub mod document;
pub mod function;
pub mod identity;
pub mod notification;
pub mod relational;
pub mod tenant;

use std::sync::Arc;

use portico_core::{ServiceBundle, ServiceEndpoints, ServiceError};
use reqwest::{RequestBuilder, StatusCode};
use serde::Serialize;
use serde::de::DeserializeOwned;
use url::Url;

pub use document::DocumentClient;
pub use function::FunctionClient;
pub use identity::IdentityClient;
pub use notification::NotificationClient;
pub use relational::RelationalClient;
pub use tenant::TenantClient;

/// Base URL plus the shared HTTP client.
#[derive(Debug, Clone)]
pub struct ServiceClient {
    name: &'static str,
    http: reqwest::Client,
    base: Url,
}

impl ServiceClient {
    pub fn new(name: &'static str, http: reqwest::Client, base: &str) -> Result<Self, String> {
        let base = Url::parse(base).map_err(|e| format!("invalid {name} url '{base}': {e}"))?;
        if base.cannot_be_a_base() {
            return Err(format!("invalid {name} url '{base}': not a base url"));
        }
        Ok(Self { name, http, base })
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Base URL with `segments` appended, each one percent-encoded.
    pub fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.base.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    pub fn http(&self) -> &reqwest::Client {
        &self.http
    }

    pub async fn get_json<T: DeserializeOwned>(&self, url: Url) -> Result<T, ServiceError> {
        self.send(self.http.get(url)).await
    }

    pub async fn post_json<B, T>(&self, url: Url, body: &B) -> Result<T, ServiceError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        self.send(self.http.post(url).json(body)).await
    }

    /// Sends a request and decodes a JSON success body. An empty body
    /// decodes as `null`.
    pub async fn send<T: DeserializeOwned>(
        &self,
        request: RequestBuilder,
    ) -> Result<T, ServiceError> {
        let response = request.send().await.map_err(|e| {
            tracing::debug!(service = self.name, error = %e, "request failed");
            ServiceError::unavailable(format!("{}: {e}", self.name))
        })?;

        let status = response.status();
        let bytes = response
            .bytes()
            .await
            .map_err(|e| ServiceError::unavailable(format!("{}: {e}", self.name)))?;

        if !status.is_success() {
            return Err(error_from_response(self.name, status, &bytes));
        }

        let body: &[u8] = if bytes.is_empty() { b"null" } else { &bytes };
        serde_json::from_slice(body)
            .map_err(|e| ServiceError::decode(format!("{}: {e}", self.name)))
    }
}

/// Error body shape shared by the platform services.
#[derive(Debug, Default, serde::Deserialize)]
struct ErrorBody {
    #[serde(default)]
    code: String,
    #[serde(default)]
    message: String,
}

fn error_from_response(service: &str, status: StatusCode, body: &[u8]) -> ServiceError {
    let parsed: ErrorBody = serde_json::from_slice(body).unwrap_or_default();
    let message = if !parsed.message.is_empty() {
        format!("{service}: {}", parsed.message)
    } else {
        let text = String::from_utf8_lossy(body);
        let text = text.trim();
        if text.is_empty() {
            format!("{service}: {status}")
        } else {
            format!("{service}: {text}")
        }
    };

    if parsed.code.eq_ignore_ascii_case("EXPIRED") {
        return ServiceError::Expired(message);
    }

    match status {
        StatusCode::UNAUTHORIZED => ServiceError::Unauthenticated(message),
        StatusCode::FORBIDDEN => ServiceError::PermissionDenied(message),
        StatusCode::NOT_FOUND => ServiceError::NotFound(message),
        StatusCode::BAD_REQUEST | StatusCode::UNPROCESSABLE_ENTITY => {
            ServiceError::Invalid(message)
        }
        _ => ServiceError::Unavailable(message),
    }
}

/// Builds a full bundle of HTTP clients for one tenant.
pub fn http_bundle(
    http: &reqwest::Client,
    endpoints: &ServiceEndpoints,
) -> Result<ServiceBundle, String> {
    let client = |name, url: &str| ServiceClient::new(name, http.clone(), url);

    let mut builder = ServiceBundle::builder()
        .identity(Arc::new(IdentityClient::new(client(
            "identity",
            &endpoints.identity_url,
        )?)))
        .tenants(Arc::new(TenantClient::new(client(
            "tenant",
            &endpoints.tenant_url,
        )?)))
        .document(Arc::new(DocumentClient::new(client(
            "document",
            &endpoints.document_url,
        )?)))
        .relational(Arc::new(RelationalClient::new(client(
            "relational",
            &endpoints.relational_url,
        )?)))
        .notifications(Arc::new(NotificationClient::new(client(
            "notification",
            &endpoints.notification_url,
        )?)))
        .functions(Arc::new(FunctionClient::new(client(
            "function",
            &endpoints.function_url,
        )?)));

    if !endpoints.document_high_url.trim().is_empty() {
        builder = builder.document_high(Arc::new(DocumentClient::new(client(
            "document-high",
            &endpoints.document_high_url,
        )?)));
    }

    builder.build()
}
