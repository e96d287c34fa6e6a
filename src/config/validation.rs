//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (timeouts > 0, limits > 0)
//! - Validate addresses, URLs and metric names before they reach a constructor
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: GatewayConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::net::{IpAddr, SocketAddr};

use url::Url;

use crate::config::schema::GatewayConfig;
use crate::observability::metrics::is_valid_metric_name;

/// A single semantic problem in the configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// Dotted path of the offending field.
    pub field: String,
    pub message: String,
}

impl ValidationError {
    fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Validate a parsed configuration.
pub fn validate_config(config: &GatewayConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::new(
            "listener.bind_address",
            format!("'{}' is not a socket address", config.listener.bind_address),
        ));
    }

    let domain = config.upstream.cluster_domain.trim_matches('.');
    if domain.is_empty() {
        errors.push(ValidationError::new("upstream.cluster_domain", "must not be empty"));
    }

    if config.upstream.port == Some(0) {
        errors.push(ValidationError::new("upstream.port", "must be greater than 0"));
    }

    for (host, ip) in &config.upstream.resolve {
        if ip.parse::<IpAddr>().is_err() {
            errors.push(ValidationError::new(
                format!("upstream.resolve.{}", host),
                format!("'{}' is not an IP address", ip),
            ));
        }
    }

    match Url::parse(&config.eventing.broker_ingress) {
        Ok(url) if matches!(url.scheme(), "http" | "https") && url.host().is_some() => {}
        Ok(_) => errors.push(ValidationError::new(
            "eventing.broker_ingress",
            "must be an http(s) URL with a host",
        )),
        Err(e) => errors.push(ValidationError::new("eventing.broker_ingress", e.to_string())),
    }

    let timeouts = [
        ("timeouts.connect_secs", config.timeouts.connect_secs),
        ("timeouts.request_secs", config.timeouts.request_secs),
        ("timeouts.async_forward_secs", config.timeouts.async_forward_secs),
    ];
    for (field, value) in timeouts {
        if value == 0 {
            errors.push(ValidationError::new(field, "must be greater than 0"));
        }
    }

    if config.limits.max_body_bytes == 0 {
        errors.push(ValidationError::new("limits.max_body_bytes", "must be greater than 0"));
    }

    let observability = &config.observability;
    if observability.metrics_enabled && observability.metrics_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::new(
            "observability.metrics_address",
            format!("'{}' is not a socket address", observability.metrics_address),
        ));
    }
    if !is_valid_metric_name(&observability.metrics_prefix) {
        errors.push(ValidationError::new(
            "observability.metrics_prefix",
            format!("'{}' is not a valid metric name prefix", observability.metrics_prefix),
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
