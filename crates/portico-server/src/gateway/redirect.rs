//! Tenant-scoped path rewriting.
//!
//! Rules are `{from, to}` templates. `from` is matched segment by segment
//! against the request path: `{name}` segments capture anything, literal
//! segments must match exactly, and segment counts must be equal. The first
//! matching rule wins and its captures are substituted into `to`. A rewrite
//! that yields the input path is not a match, so a rule set can never loop.

use std::collections::HashMap;
use std::sync::Arc;

use portico_cache::StampedeGuard;
use portico_core::{RedirectRule, RequestContext, TenantRegistry};
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use super::error::GatewayError;
use super::store_scope;
use crate::metrics;

/// Key class of cached rule sets.
pub const CLASS_REDIRECT: &str = "redirect";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MalformedRule {
    #[error("template '{0}' must start with '/'")]
    NotAbsolute(String),

    #[error("bad placeholder in '{0}'")]
    BadPlaceholder(String),

    #[error("placeholder '{{{0}}}' is not captured by the from template")]
    UnboundPlaceholder(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Capture(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Piece {
    Text(String),
    Var(String),
}

/// A rule parsed once and matched many times.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompiledRule {
    from: Vec<Segment>,
    to: Vec<Piece>,
}

impl CompiledRule {
    pub fn compile(rule: &RedirectRule) -> Result<Self, MalformedRule> {
        if !rule.from.starts_with('/') {
            return Err(MalformedRule::NotAbsolute(rule.from.clone()));
        }
        if !rule.to.starts_with('/') {
            return Err(MalformedRule::NotAbsolute(rule.to.clone()));
        }

        let from = rule
            .from
            .split('/')
            .map(|segment| parse_segment(segment, &rule.from))
            .collect::<Result<Vec<_>, _>>()?;
        let to = parse_pieces(&rule.to)?;

        for piece in &to {
            if let Piece::Var(name) = piece {
                let bound = from
                    .iter()
                    .any(|s| matches!(s, Segment::Capture(c) if c == name));
                if !bound {
                    return Err(MalformedRule::UnboundPlaceholder(name.clone()));
                }
            }
        }

        Ok(Self { from, to })
    }

    /// Rewritten path if `path` matches this rule.
    pub fn apply(&self, path: &str) -> Option<String> {
        let parts: Vec<&str> = path.split('/').collect();
        if parts.len() != self.from.len() {
            return None;
        }

        let mut captures = HashMap::new();
        for (segment, part) in self.from.iter().zip(&parts) {
            match segment {
                Segment::Literal(literal) if literal == part => {}
                Segment::Literal(_) => return None,
                Segment::Capture(name) => {
                    captures.insert(name.as_str(), *part);
                }
            }
        }

        let mut out = String::with_capacity(path.len());
        for piece in &self.to {
            match piece {
                Piece::Text(text) => out.push_str(text),
                Piece::Var(name) => out.push_str(captures.get(name.as_str()).copied().unwrap_or("")),
            }
        }
        Some(out)
    }
}

fn parse_segment(segment: &str, template: &str) -> Result<Segment, MalformedRule> {
    if let Some(inner) = segment.strip_prefix('{') {
        let name = inner
            .strip_suffix('}')
            .filter(|name| valid_name(name))
            .ok_or_else(|| MalformedRule::BadPlaceholder(template.to_string()))?;
        return Ok(Segment::Capture(name.to_string()));
    }
    if segment.contains(['{', '}']) {
        return Err(MalformedRule::BadPlaceholder(template.to_string()));
    }
    Ok(Segment::Literal(segment.to_string()))
}

fn parse_pieces(template: &str) -> Result<Vec<Piece>, MalformedRule> {
    let bad = || MalformedRule::BadPlaceholder(template.to_string());
    let mut pieces = Vec::new();
    let mut rest = template;

    while let Some(open) = rest.find(['{', '}']) {
        if rest[open..].starts_with('}') {
            return Err(bad());
        }
        let close = rest[open..].find('}').ok_or_else(bad)? + open;
        let name = &rest[open + 1..close];
        if !valid_name(name) {
            return Err(bad());
        }
        if open > 0 {
            pieces.push(Piece::Text(rest[..open].to_string()));
        }
        pieces.push(Piece::Var(name.to_string()));
        rest = &rest[close + 1..];
    }
    if !rest.is_empty() {
        pieces.push(Piece::Text(rest.to_string()));
    }
    Ok(pieces)
}

fn valid_name(name: &str) -> bool {
    !name.is_empty() && !name.contains(['{', '}', '/'])
}

/// Compiles a rule set, skipping (and logging) malformed rules.
pub fn compile_rules(rules: &[RedirectRule]) -> Vec<CompiledRule> {
    rules
        .iter()
        .filter_map(|rule| match CompiledRule::compile(rule) {
            Ok(compiled) => Some(compiled),
            Err(e) => {
                tracing::warn!(from = %rule.from, to = %rule.to, error = %e, "skipping malformed redirect rule");
                None
            }
        })
        .collect()
}

/// First matching rule's rewrite of `path`. `None` when nothing matches or
/// the rewrite would leave the path unchanged.
pub fn match_path(rules: &[CompiledRule], path: &str) -> Option<String> {
    let rewritten = rules.iter().find_map(|rule| rule.apply(path))?;
    (rewritten != path).then_some(rewritten)
}

/// Loads per-environment rule sets through the stampede guard and rewrites
/// request paths with them.
pub struct PathRedirector {
    guard: Arc<StampedeGuard>,
    registry: Arc<TenantRegistry>,
    shared_namespace: String,
    shutdown: CancellationToken,
}

impl PathRedirector {
    pub fn new(
        guard: Arc<StampedeGuard>,
        registry: Arc<TenantRegistry>,
        shared_namespace: impl Into<String>,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            guard,
            registry,
            shared_namespace: shared_namespace.into(),
            shutdown,
        }
    }

    pub fn rules_key(project_id: &str, environment_id: &str) -> String {
        format!("redirect:{project_id}:{environment_id}")
    }

    /// The tenant's rule set, served from cache for up to the data TTL.
    pub async fn rules(&self, ctx: &RequestContext) -> Result<Vec<RedirectRule>, GatewayError> {
        let bundle = self.registry.resolve(&ctx.resource, &self.shared_namespace)?;
        let tenants = Arc::clone(bundle.tenants());
        let key = Self::rules_key(&ctx.project_id, &ctx.environment_id);
        let scope = store_scope(&ctx.resource);

        let rules = self
            .guard
            .get_or_populate_cancellable(CLASS_REDIRECT, &key, &scope, &self.shutdown, || async move {
                tenants
                    .redirect_rules(&ctx.project_id, &ctx.environment_id)
                    .await
            })
            .await
            .map_err(GatewayError::from)?;
        Ok(rules)
    }

    pub async fn rewrite(
        &self,
        ctx: &RequestContext,
        path: &str,
    ) -> Result<Option<String>, GatewayError> {
        let rules = match self.rules(ctx).await {
            Ok(rules) => rules,
            Err(e) => {
                metrics::record_redirect("error");
                return Err(e);
            }
        };

        let rewritten = match_path(&compile_rules(&rules), path);
        match &rewritten {
            Some(to) => {
                tracing::debug!(from = %path, to = %to, project_id = %ctx.project_id, "path rewritten");
                metrics::record_redirect("rewritten");
            }
            None => metrics::record_redirect("no_match"),
        }
        Ok(rewritten)
    }
}

impl std::fmt::Debug for PathRedirector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PathRedirector")
            .field("shared_namespace", &self.shared_namespace)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rules(pairs: &[(&str, &str)]) -> Vec<CompiledRule> {
        let raw: Vec<_> = pairs
            .iter()
            .map(|(from, to)| RedirectRule::new(*from, *to))
            .collect();
        compile_rules(&raw)
    }

    #[test]
    fn test_rewrite_is_idempotent_on_its_output() {
        let rules = rules(&[("/a/{id}", "/b/{id}")]);
        assert_eq!(match_path(&rules, "/a/42").as_deref(), Some("/b/42"));
        assert_eq!(match_path(&rules, "/b/42"), None);
    }

    #[test]
    fn test_x_api_rewrite() {
        let rules = rules(&[("/x-api/{res}/{id}", "/v2/items/{res}/{id}")]);
        assert_eq!(
            match_path(&rules, "/x-api/orders/7").as_deref(),
            Some("/v2/items/orders/7")
        );
        assert_eq!(match_path(&rules, "/x-api/orders"), None);
        assert_eq!(match_path(&rules, "/x-api/orders/7/extra"), None);
    }

    #[test]
    fn test_first_match_wins() {
        let rules = rules(&[
            ("/x/{a}", "/first/{a}"),
            ("/x/{b}", "/second/{b}"),
        ]);
        assert_eq!(match_path(&rules, "/x/1").as_deref(), Some("/first/1"));
    }

    #[test]
    fn test_identity_rewrite_is_no_match() {
        let rules = rules(&[("/same/{id}", "/same/{id}"), ("/same/{id}", "/other/{id}")]);
        assert_eq!(match_path(&rules, "/same/1"), None);
    }

    #[test]
    fn test_literal_segments_must_match() {
        let rules = rules(&[("/v1/{slug}/list", "/v2/items/{slug}")]);
        assert_eq!(
            match_path(&rules, "/v1/orders/list").as_deref(),
            Some("/v2/items/orders")
        );
        assert_eq!(match_path(&rules, "/v1/orders/show"), None);
    }

    #[test]
    fn test_placeholder_inside_to_segment() {
        let rules = rules(&[("/legacy/{name}", "/v2/items/{name}-archive")]);
        assert_eq!(
            match_path(&rules, "/legacy/orders").as_deref(),
            Some("/v2/items/orders-archive")
        );
    }

    #[test]
    fn test_malformed_rules_are_skipped() {
        let raw = vec![
            RedirectRule::new("no-slash/{id}", "/b/{id}"),
            RedirectRule::new("/a/{id", "/b/{id}"),
            RedirectRule::new("/a/{}", "/b"),
            RedirectRule::new("/a/{id}", "/b/{other}"),
            RedirectRule::new("/a/{id}", "/b/{id"),
            RedirectRule::new("/a/{id}", "/c/{id}"),
        ];
        let compiled = compile_rules(&raw);
        assert_eq!(compiled.len(), 1);
        assert_eq!(match_path(&compiled, "/a/1").as_deref(), Some("/c/1"));
    }

    #[test]
    fn test_compile_errors() {
        assert_eq!(
            CompiledRule::compile(&RedirectRule::new("a", "/b")).unwrap_err(),
            MalformedRule::NotAbsolute("a".into())
        );
        assert_eq!(
            CompiledRule::compile(&RedirectRule::new("/a/{x}", "/b/{y}")).unwrap_err(),
            MalformedRule::UnboundPlaceholder("y".into())
        );
        assert!(matches!(
            CompiledRule::compile(&RedirectRule::new("/a/x}", "/b")),
            Err(MalformedRule::BadPlaceholder(_))
        ));
    }
}
