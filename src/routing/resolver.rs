//! Internal address resolution.
//!
//! # Responsibilities
//! - Turn `{namespace, service, path}` into a cluster-local service URL
//! - Turn `{namespace, broker}` into a broker ingress URL
//! - Normalize path separators so the join point always has exactly one `/`
//!
//! # Design Decisions
//! - Resolvers are built and probed at startup; a bad cluster domain or
//!   ingress URL fails construction instead of the first request
//! - Resolution at request time returns a typed error, never panics

use serde::Deserialize;
use thiserror::Error;
use url::Url;

use crate::config::{EventingConfig, UpstreamConfig};

/// Scheme used for in-cluster service calls.
const SERVICE_SCHEME: &str = "http";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ResolveError {
    #[error("{kind} must not be empty")]
    EmptyLabel { kind: &'static str },

    #[error("{kind} '{value}' is not a valid DNS label")]
    InvalidLabel { kind: &'static str, value: String },

    #[error("cannot build URL '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },
}

/// Target of a service call, taken from the request path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteParams {
    pub namespace: String,
    pub service_name: String,
    /// Remainder of the inbound path, still percent-encoded.
    pub path: String,
}

impl RouteParams {
    pub fn new(
        namespace: impl Into<String>,
        service_name: impl Into<String>,
        path: impl Into<String>,
    ) -> Self {
        Self {
            namespace: namespace.into(),
            service_name: service_name.into(),
            path: path.into(),
        }
    }
}

/// Target broker of a publish call.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct BrokerParams {
    #[serde(rename = "ns")]
    pub namespace: String,
    pub broker: String,
}

/// Drop the first `count` segments of a raw request path.
///
/// `strip_segments("/ns/svc/a/b", 2)` is `"/a/b"`. The remainder keeps its
/// percent-encoding, so an encoded `?` or `/` is forwarded as sent.
pub fn strip_segments(path: &str, count: usize) -> &str {
    let mut rest = path;
    for _ in 0..count {
        rest = rest.trim_start_matches('/');
        match rest.find('/') {
            Some(i) => rest = &rest[i..],
            None => return "",
        }
    }
    rest
}

/// Collapse separator runs in `path` and drop leading ones.
///
/// A single trailing separator survives so `/dir/` and `/dir` stay distinct
/// for the upstream.
pub fn normalize_path(path: &str) -> String {
    let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
    let mut normalized = segments.join("/");
    if !segments.is_empty() && path.ends_with('/') {
        normalized.push('/');
    }
    normalized
}

/// Join a base (scheme + authority, optionally with a path prefix) and a path
/// with exactly one separator between them.
pub fn join_path(base: &str, path: &str) -> String {
    format!("{}/{}", base.trim_end_matches('/'), normalize_path(path))
}

fn validate_label(kind: &'static str, value: &str) -> Result<(), ResolveError> {
    if value.is_empty() {
        return Err(ResolveError::EmptyLabel { kind });
    }
    if !value.chars().all(|c| c.is_ascii_alphanumeric() || c == '-') {
        return Err(ResolveError::InvalidLabel {
            kind,
            value: value.to_string(),
        });
    }
    Ok(())
}

fn parse_url(raw: String) -> Result<Url, ResolveError> {
    Url::parse(&raw).map_err(|e| ResolveError::InvalidUrl {
        url: raw,
        reason: e.to_string(),
    })
}

/// Resolves cluster-local service addresses.
#[derive(Debug, Clone)]
pub struct AddressResolver {
    cluster_domain: String,
    port: Option<u16>,
}

impl AddressResolver {
    /// Build a resolver and verify it produces a valid URL.
    pub fn new(config: &UpstreamConfig) -> Result<Self, ResolveError> {
        let resolver = Self {
            cluster_domain: config.cluster_domain.trim_matches('.').to_string(),
            port: config.port,
        };
        resolver.resolve(&RouteParams::new("default", "probe", "/"))?;
        Ok(resolver)
    }

    /// Host name of a service, e.g. `echo.default.svc.cluster.local`.
    pub fn host(&self, params: &RouteParams) -> String {
        format!(
            "{}.{}.{}",
            params.service_name, params.namespace, self.cluster_domain
        )
    }

    /// `http://{service}.{namespace}.{cluster_domain}/{path}`.
    pub fn resolve(&self, params: &RouteParams) -> Result<Url, ResolveError> {
        validate_label("namespace", &params.namespace)?;
        validate_label("service name", &params.service_name)?;

        let authority = match self.port {
            Some(port) => format!("{}:{}", self.host(params), port),
            None => self.host(params),
        };
        let base = format!("{}://{}", SERVICE_SCHEME, authority);
        parse_url(join_path(&base, &params.path))
    }
}

/// Resolves broker ingress addresses.
#[derive(Debug, Clone)]
pub struct BrokerResolver {
    ingress: String,
}

impl BrokerResolver {
    pub fn new(config: &EventingConfig) -> Result<Self, ResolveError> {
        let resolver = Self {
            ingress: config.broker_ingress.clone(),
        };
        resolver.resolve(&BrokerParams {
            namespace: "default".into(),
            broker: "default".into(),
        })?;
        Ok(resolver)
    }

    /// `{ingress}/{namespace}/{broker}`.
    pub fn resolve(&self, params: &BrokerParams) -> Result<Url, ResolveError> {
        validate_label("namespace", &params.namespace)?;
        validate_label("broker", &params.broker)?;
        let path = format!("{}/{}", params.namespace, params.broker);
        parse_url(join_path(&self.ingress, &path))
    }
}
