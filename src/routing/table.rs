//! Immutable route table.
//!
//! # Responsibilities
//! - Look up per-route overrides by exact `"METHOD /path"` key
//! - Decide whether a path is a command invocation (prefix scoping)
//! - Strip the configured prefix before translation

use std::collections::HashMap;

use axum::http::Method;

use crate::config::{GatewayConfig, RouteConfig};

/// Route overrides compiled from configuration.
#[derive(Debug, Default)]
pub struct RouteTable {
    routes: HashMap<String, RouteConfig>,
    prefix: Option<String>,
    empty: RouteConfig,
}

impl RouteTable {
    /// Build the table from the `[api]` section and `command.path_prefix`.
    pub fn from_config(config: &GatewayConfig) -> Self {
        let prefix = config
            .command
            .path_prefix
            .as_deref()
            .map(|p| p.trim_end_matches('/').to_string())
            .filter(|p| !p.is_empty());

        Self {
            routes: config.api.clone().into_iter().collect(),
            prefix,
            empty: RouteConfig::default(),
        }
    }

    /// Overrides for `method` + `path`, or an empty config when none are set.
    pub fn lookup(&self, method: &Method, path: &str) -> &RouteConfig {
        self.routes
            .get(&route_key(method, path))
            .unwrap_or(&self.empty)
    }

    /// The part of `path` to translate, or `None` if it is outside the prefix.
    pub fn command_path<'a>(&self, path: &'a str) -> Option<&'a str> {
        match &self.prefix {
            None => Some(path),
            Some(prefix) => {
                let rest = path.strip_prefix(prefix.as_str())?;
                if rest.is_empty() || rest.starts_with('/') {
                    Some(rest)
                } else {
                    None
                }
            }
        }
    }

    /// Number of configured routes.
    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}

/// Lookup key for a request.
pub fn route_key(method: &Method, path: &str) -> String {
    format!("{} {}", method.as_str(), path)
}
