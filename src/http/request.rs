//! Request-scoped context.
//!
//! # Responsibilities
//! - Give every request a fresh UUID for its scratch directory
//! - Carry the correlation id (`x-request-id`) for logging
//! - Extract the negotiation headers the response assembler needs
//!
//! # Design Decisions
//! - The scratch-directory id is always generated here, never taken from the
//!   client, so directory names cannot collide or escape the root
//! - Context is an explicit value passed down the call chain

use std::path::{Path, PathBuf};

use axum::http::{header, HeaderMap, HeaderName};
use uuid::Uuid;

/// Header carrying the correlation id.
pub const X_REQUEST_ID: HeaderName = HeaderName::from_static("x-request-id");

/// Everything one request's handling needs to know about itself.
#[derive(Debug, Clone)]
pub struct RequestContext {
    /// Fresh per request; names the scratch directory.
    pub id: Uuid,
    /// Correlation id from `x-request-id`, falling back to `id`.
    pub correlation_id: String,
    pub tmp_dir: PathBuf,
    pub accept: Option<String>,
    pub accept_encoding: Option<String>,
}

impl RequestContext {
    pub fn new(id: Uuid, tmp_dir: &Path, headers: &HeaderMap) -> Self {
        let header_str = |name: &HeaderName| {
            headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string)
        };

        Self {
            id,
            correlation_id: header_str(&X_REQUEST_ID).unwrap_or_else(|| id.to_string()),
            tmp_dir: tmp_dir.to_path_buf(),
            accept: header_str(&header::ACCEPT),
            accept_encoding: header_str(&header::ACCEPT_ENCODING),
        }
    }
}
