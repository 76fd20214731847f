//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Check route keys have the `"METHOD /path"` shape
//! - Validate value ranges (status codes, limits, addresses)
//! - Check configured headers are valid HTTP header names and values
//! - Require request values in command templates to be double-quoted
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: GatewayConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::collections::BTreeMap;
use std::net::SocketAddr;

use axum::http::{HeaderName, HeaderValue};
use thiserror::Error;

use crate::command::template;
use crate::command::translator::REQUEST_ID_PARAM;
use crate::config::schema::{GatewayConfig, RouteConfig, StatusConfig};
use crate::observability::logging::LogFormat;

/// Methods accepted in route keys.
pub const ROUTE_METHODS: &[&str] = &["GET", "HEAD", "POST", "PUT", "DELETE", "PATCH", "OPTIONS"];

/// A single semantic problem in the configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("invalid bind address `{0}`")]
    BindAddress(String),

    #[error("invalid metrics address `{0}`")]
    MetricsAddress(String),

    #[error("route key `{0}` must look like \"METHOD /path\"")]
    RouteKey(String),

    #[error("route `{route}`: unsupported method `{method}`")]
    RouteMethod { route: String, method: String },

    #[error("route `{route}`: status {status} is not a valid HTTP status")]
    Status { route: String, status: u16 },

    #[error("route `{route}`: exit code key `{key}` is not an integer")]
    ExitCode { route: String, key: String },

    #[error("route `{route}`: placeholder `{placeholder}` must sit inside double quotes")]
    UnquotedPlaceholder { route: String, placeholder: String },

    #[error("{scope}: invalid header `{name}`")]
    Header { scope: String, name: String },

    #[error("command.path_prefix `{0}` must start with '/'")]
    PathPrefix(String),

    #[error("command.program must not be empty")]
    EmptyProgram,

    #[error("uploads.max_files must be greater than zero")]
    MaxFiles,

    #[error("limits.max_body_bytes must be greater than zero")]
    MaxBodyBytes,

    #[error("unknown log format `{0}` (expected \"pretty\" or \"json\")")]
    LogFormat(String),
}

/// Validate a parsed configuration, collecting every problem found.
pub fn validate_config(config: &GatewayConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::BindAddress(config.listener.bind_address.clone()));
    }

    if config.observability.metrics_enabled
        && config.observability.metrics_address.parse::<SocketAddr>().is_err()
    {
        errors.push(ValidationError::MetricsAddress(
            config.observability.metrics_address.clone(),
        ));
    }

    if LogFormat::parse(&config.observability.log_format).is_none() {
        errors.push(ValidationError::LogFormat(config.observability.log_format.clone()));
    }

    if config.command.program.trim().is_empty() {
        errors.push(ValidationError::EmptyProgram);
    }

    if let Some(prefix) = &config.command.path_prefix {
        if !prefix.starts_with('/') {
            errors.push(ValidationError::PathPrefix(prefix.clone()));
        }
    }

    if config.uploads.max_files == Some(0) {
        errors.push(ValidationError::MaxFiles);
    }

    if config.limits.max_body_bytes == 0 {
        errors.push(ValidationError::MaxBodyBytes);
    }

    validate_headers("response.headers", &config.response.headers, &mut errors);

    for (key, route) in &config.api {
        validate_route(key, route, &mut errors);
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn validate_route(key: &str, route: &RouteConfig, errors: &mut Vec<ValidationError>) {
    match key.split_once(' ') {
        Some((method, path)) if path.starts_with('/') && !path.contains(' ') => {
            if !ROUTE_METHODS.contains(&method) {
                errors.push(ValidationError::RouteMethod {
                    route: key.to_string(),
                    method: method.to_string(),
                });
            }
        }
        _ => errors.push(ValidationError::RouteKey(key.to_string())),
    }

    match &route.response.status {
        Some(StatusConfig::Code(status)) => check_status(key, *status, errors),
        Some(StatusConfig::Map(map)) => {
            for (exit_code, status) in map {
                if exit_code.trim().parse::<i32>().is_err() {
                    errors.push(ValidationError::ExitCode {
                        route: key.to_string(),
                        key: exit_code.clone(),
                    });
                }
                check_status(key, *status, errors);
            }
        }
        None => {}
    }

    if let Some(command) = &route.command {
        for placeholder in template::unquoted(command) {
            // Request ids are generated UUIDs.
            if placeholder.root == REQUEST_ID_PARAM {
                continue;
            }
            errors.push(ValidationError::UnquotedPlaceholder {
                route: key.to_string(),
                placeholder: command[placeholder.span].to_string(),
            });
        }
    }

    validate_headers(&format!("route `{}`", key), &route.response.headers, errors);
}

fn check_status(route: &str, status: u16, errors: &mut Vec<ValidationError>) {
    if !(100..=599).contains(&status) {
        errors.push(ValidationError::Status {
            route: route.to_string(),
            status,
        });
    }
}

fn validate_headers(
    scope: &str,
    headers: &BTreeMap<String, String>,
    errors: &mut Vec<ValidationError>,
) {
    for (name, value) in headers {
        if HeaderName::from_bytes(name.as_bytes()).is_err() || HeaderValue::from_str(value).is_err()
        {
            errors.push(ValidationError::Header {
                scope: scope.to_string(),
                name: name.clone(),
            });
        }
    }
}
