//! Errors surfaced at the HTTP boundary.
//!
//! Subsystems keep their own error enums; the handler converts them into
//! [`GatewayError`], which knows the status code and renders a JSON body.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use http_body_util::LengthLimitError;
use serde_json::json;
use thiserror::Error;

use crate::command::{ExecutionError, TranslateError};
use crate::http::response::AssembleError;
use crate::http::upload::UploadError;
use crate::http::view::ViewError;

/// A request that failed before a command outcome could be returned.
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    PayloadTooLarge(String),

    #[error("{0}")]
    Timeout(String),

    #[error("{0}")]
    Internal(String),
}

impl GatewayError {
    pub fn status(&self) -> StatusCode {
        match self {
            GatewayError::BadRequest(_) => StatusCode::BAD_REQUEST,
            GatewayError::NotFound(_) => StatusCode::NOT_FOUND,
            GatewayError::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            GatewayError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
            GatewayError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(status = status.as_u16(), error = %self, "Request failed");
        } else {
            tracing::debug!(status = status.as_u16(), error = %self, "Request rejected");
        }
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}

impl From<TranslateError> for GatewayError {
    fn from(e: TranslateError) -> Self {
        GatewayError::BadRequest(e.to_string())
    }
}

impl From<UploadError> for GatewayError {
    fn from(e: UploadError) -> Self {
        match e {
            UploadError::TooManyFiles { .. } | UploadError::TooLarge(_) => {
                GatewayError::PayloadTooLarge(e.to_string())
            }
            UploadError::Parse(_) | UploadError::FileName(_) => {
                GatewayError::BadRequest(e.to_string())
            }
            UploadError::Io(_) => GatewayError::Internal(e.to_string()),
        }
    }
}

impl From<AssembleError> for GatewayError {
    fn from(e: AssembleError) -> Self {
        GatewayError::Internal(e.to_string())
    }
}

impl From<ViewError> for GatewayError {
    fn from(e: ViewError) -> Self {
        GatewayError::Internal(e.to_string())
    }
}

impl From<std::io::Error> for GatewayError {
    fn from(e: std::io::Error) -> Self {
        GatewayError::Internal(e.to_string())
    }
}

/// Exits and spawn failures become command outcomes and never reach here.
impl From<ExecutionError> for GatewayError {
    fn from(e: ExecutionError) -> Self {
        match e {
            ExecutionError::Timeout(_) => GatewayError::Timeout(e.to_string()),
            ExecutionError::Input(ref source) if exceeds_length_limit(source) => {
                GatewayError::PayloadTooLarge(e.to_string())
            }
            ExecutionError::Input(_) => GatewayError::BadRequest(e.to_string()),
            other => GatewayError::Internal(other.to_string()),
        }
    }
}

/// Whether a body read failed because the request outgrew the body limit.
fn exceeds_length_limit(error: &std::io::Error) -> bool {
    let mut current = error
        .get_ref()
        .map(|inner| inner as &(dyn std::error::Error + 'static));
    while let Some(err) = current {
        if err.is::<LengthLimitError>() {
            return true;
        }
        current = err.source();
    }
    false
}
