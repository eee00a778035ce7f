//! Configuration validation.
//!
//! Semantic checks on top of serde's syntactic parsing. All violations
//! are collected and reported together, not just the first.

use std::net::SocketAddr;

use url::Url;

use crate::config::schema::GateConfig;

#[derive(Debug)]
pub enum ValidationError {
    InvalidBindAddress(String),
    InvalidUpstreamAddress(String),
    ZeroTimeout(&'static str),
    ZeroBodyLimit,
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ValidationError::InvalidBindAddress(addr) => {
                write!(f, "invalid bind address '{}'", addr)
            }
            ValidationError::InvalidUpstreamAddress(addr) => {
                write!(f, "invalid upstream address '{}'", addr)
            }
            ValidationError::ZeroTimeout(field) => {
                write!(f, "timeout '{}' must be greater than zero", field)
            }
            ValidationError::ZeroBodyLimit => write!(f, "max_body_size must be greater than zero"),
        }
    }
}

pub fn validate_config(config: &GateConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::InvalidBindAddress(
            config.listener.bind_address.clone(),
        ));
    }

    // The upstream is host:port; hostnames are fine, schemes are not.
    if Url::parse(&format!("http://{}", config.upstream.address)).is_err()
        || config.upstream.address.contains("://")
    {
        errors.push(ValidationError::InvalidUpstreamAddress(
            config.upstream.address.clone(),
        ));
    }

    if config.timeouts.request_secs == 0 {
        errors.push(ValidationError::ZeroTimeout("request_secs"));
    }

    if config.security.max_body_size == 0 {
        errors.push(ValidationError::ZeroBodyLimit);
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
