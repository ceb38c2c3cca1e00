//! Credential resolution.
//!
//! Bearer tokens are checked live against the identity service on every
//! request. API keys go through two stampede-guarded lookups: key to
//! environment binding (class `appid`), then environment to resource
//! descriptor (class `resource`).

use std::sync::Arc;

use axum::http::{HeaderMap, Method, Uri, header::AUTHORIZATION};
use portico_cache::{StampedeGuard, StoreScope};
use portico_core::{
    AccessCheck, ApiKeyGrant, IdentityService, Principal, RequestContext, ResourceDescriptor,
    ServiceError, TenantService,
};
use tokio_util::sync::CancellationToken;

use super::error::GatewayError;
use crate::metrics;

/// Key class of API key bindings.
pub const CLASS_APP_ID: &str = "appid";
/// Key class of resource descriptors.
pub const CLASS_RESOURCE: &str = "resource";

pub const API_KEY_HEADER: &str = "x-api-key";
pub const RESOURCE_ID_HEADER: &str = "resource-id";
pub const ENVIRONMENT_ID_HEADER: &str = "environment-id";
pub const PROJECT_ID_QUERY: &str = "project-id";

/// Credentials presented with a request.
#[derive(Clone, PartialEq, Eq)]
pub enum Credentials {
    Bearer(String),
    ApiKey(String),
}

impl Credentials {
    /// Reads `Authorization: Bearer <token>`, or `Authorization: API-KEY`
    /// together with `X-API-KEY: <key>`.
    pub fn from_headers(headers: &HeaderMap) -> Result<Self, GatewayError> {
        let authorization = headers
            .get(AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .ok_or_else(|| GatewayError::Unauthorized("missing Authorization header".into()))?;

        let (scheme, rest) = authorization
            .split_once(' ')
            .map(|(scheme, rest)| (scheme, rest.trim()))
            .unwrap_or((authorization, ""));

        if scheme.eq_ignore_ascii_case("bearer") {
            if rest.is_empty() {
                return Err(GatewayError::Unauthorized("empty bearer token".into()));
            }
            return Ok(Self::Bearer(rest.to_string()));
        }

        if scheme.eq_ignore_ascii_case("api-key") {
            let key = headers
                .get(API_KEY_HEADER)
                .and_then(|v| v.to_str().ok())
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .ok_or_else(|| GatewayError::Unauthorized("missing X-API-KEY header".into()))?;
            return Ok(Self::ApiKey(key.to_string()));
        }

        Err(GatewayError::Unauthorized(format!(
            "unsupported authorization scheme '{scheme}'"
        )))
    }

    pub fn scheme(&self) -> &'static str {
        match self {
            Self::Bearer(_) => "bearer",
            Self::ApiKey(_) => "api-key",
        }
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Credentials::{}(***)", self.scheme())
    }
}

/// Routing hints sent along with the credentials.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestHints {
    pub resource_id: Option<String>,
    pub environment_id: Option<String>,
    pub project_id: Option<String>,
    pub table_slug: Option<String>,
    pub path: String,
    pub method: String,
}

impl RequestHints {
    pub fn from_parts(method: &Method, uri: &Uri, headers: &HeaderMap) -> Self {
        let header = |name: &str| {
            headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .map(str::to_string)
        };

        Self {
            resource_id: header(RESOURCE_ID_HEADER),
            environment_id: header(ENVIRONMENT_ID_HEADER),
            project_id: query_param(uri, PROJECT_ID_QUERY),
            table_slug: table_slug(uri.path()),
            path: uri.path().to_string(),
            method: method.as_str().to_string(),
        }
    }
}

/// First value of a query parameter, percent-decoded.
pub fn query_param(uri: &Uri, name: &str) -> Option<String> {
    let query = uri.query()?;
    url::form_urlencoded::parse(query.as_bytes())
        .find(|(k, _)| k == name)
        .map(|(_, v)| v.into_owned())
        .filter(|v| !v.is_empty())
}

/// Collection name for item routes (`/v2/items/{collection}[/...]`).
fn table_slug(path: &str) -> Option<String> {
    let mut segments = path.split('/').filter(|s| !s.is_empty());
    while let Some(segment) = segments.next() {
        if segment == "items" {
            return segments.next().map(str::to_string);
        }
    }
    None
}

/// Turns credentials into a [`RequestContext`].
pub struct AuthResolver {
    identity: Arc<dyn IdentityService>,
    tenants: Arc<dyn TenantService>,
    guard: Arc<StampedeGuard>,
    shutdown: CancellationToken,
}

impl AuthResolver {
    /// Cache key of an API key's environment binding.
    ///
    /// Every data key starts with its class, so no caller-supplied value can
    /// land on another class's key or on a `WAIT-` sentinel.
    pub fn app_id_key(api_key: &str) -> String {
        format!("{CLASS_APP_ID}:{api_key}")
    }

    /// Cache key of the resource descriptor reached through an API key.
    pub fn key_resource_key(api_key: &str) -> String {
        format!("{CLASS_RESOURCE}:key:{api_key}")
    }

    /// Cache key of an environment's resource descriptor.
    pub fn environment_resource_key(environment_id: &str) -> String {
        format!("{CLASS_RESOURCE}:env:{environment_id}")
    }

    pub fn new(
        identity: Arc<dyn IdentityService>,
        tenants: Arc<dyn TenantService>,
        guard: Arc<StampedeGuard>,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            identity,
            tenants,
            guard,
            shutdown,
        }
    }

    pub async fn resolve(
        &self,
        credentials: &Credentials,
        hints: &RequestHints,
    ) -> Result<RequestContext, GatewayError> {
        let result = match credentials {
            Credentials::Bearer(token) => self.resolve_bearer(token, hints).await,
            Credentials::ApiKey(key) => self.resolve_api_key(key).await,
        };

        match &result {
            Ok(ctx) => {
                tracing::debug!(
                    scheme = credentials.scheme(),
                    project_id = %ctx.project_id,
                    environment_id = %ctx.environment_id,
                    resource_kind = %ctx.resource.kind,
                    "request authenticated"
                );
                metrics::record_auth(credentials.scheme(), "ok");
            }
            Err(e) => metrics::record_auth(credentials.scheme(), e.class()),
        }
        result
    }

    /// Live token check; never cached. Ids bound by the token take
    /// precedence over the request hints.
    pub async fn resolve_bearer(
        &self,
        token: &str,
        hints: &RequestHints,
    ) -> Result<RequestContext, GatewayError> {
        let check = AccessCheck {
            access_token: token.to_string(),
            path: hints.path.clone(),
            method: hints.method.clone(),
            project_id: hints.project_id.clone(),
            environment_id: hints.environment_id.clone(),
            resource_id: hints.resource_id.clone(),
            table_slug: hints.table_slug.clone(),
        };
        let grant = self.identity.check_access(check).await?;

        let environment_id = non_empty(grant.environment_id)
            .or_else(|| hints.environment_id.clone())
            .ok_or_else(|| GatewayError::BadRequest("Environment-Id header is required".into()))?;

        let resource = self.resolve_environment(&environment_id).await?;
        let project_id = non_empty(grant.project_id)
            .or_else(|| hints.project_id.clone())
            .unwrap_or_else(|| resource.project_id.clone());

        Ok(RequestContext {
            project_id,
            environment_id,
            resource,
            principal: Principal::User {
                user_id: grant.user_id,
                role_id: grant.role_id,
                client_type_id: grant.client_type_id,
                token: token.to_string(),
            },
        })
    }

    pub async fn resolve_api_key(&self, api_key: &str) -> Result<RequestContext, GatewayError> {
        let identity = Arc::clone(&self.identity);
        let grant: ApiKeyGrant = self
            .guard
            .get_or_populate_cancellable(
                CLASS_APP_ID,
                &Self::app_id_key(api_key),
                &StoreScope::Shared,
                &self.shutdown,
                || async move { identity.api_key(api_key).await },
            )
            .await
            .map_err(|e| match e {
                portico_cache::GuardError::Upstream(ServiceError::NotFound(_)) => {
                    GatewayError::Unauthorized("unknown api key".into())
                }
                other => other.into(),
            })?;

        let tenants = Arc::clone(&self.tenants);
        let environment_id = grant.environment_id.clone();
        let resource: ResourceDescriptor = self
            .guard
            .get_or_populate_cancellable(
                CLASS_RESOURCE,
                &Self::key_resource_key(api_key),
                &StoreScope::Shared,
                &self.shutdown,
                || async move { tenants.resource_by_environment(&environment_id).await },
            )
            .await?;

        let project_id = if grant.project_id.is_empty() {
            resource.project_id.clone()
        } else {
            grant.project_id
        };

        Ok(RequestContext {
            project_id,
            environment_id: grant.environment_id,
            resource,
            principal: Principal::ApiKey {
                app_id: grant.app_id,
                role_id: grant.role_id,
                client_type_id: grant.client_type_id,
            },
        })
    }

    /// Resource descriptor of an environment, cached under class `resource`.
    pub async fn resolve_environment(
        &self,
        environment_id: &str,
    ) -> Result<ResourceDescriptor, GatewayError> {
        let tenants = Arc::clone(&self.tenants);
        let descriptor = self
            .guard
            .get_or_populate_cancellable(
                CLASS_RESOURCE,
                &Self::environment_resource_key(environment_id),
                &StoreScope::Shared,
                &self.shutdown,
                || async move { tenants.resource_by_environment(environment_id).await },
            )
            .await?;
        Ok(descriptor)
    }
}

impl std::fmt::Debug for AuthResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthResolver").finish_non_exhaustive()
    }
}

fn non_empty(s: String) -> Option<String> {
    (!s.is_empty()).then_some(s)
}
