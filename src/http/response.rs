//! Response assembly for command results.
//!
//! # Responsibilities
//! - Map the command's exit code to an HTTP status
//! - Negotiate the content type (Accept, global headers, route headers)
//! - Apply base64 output decoding and base64 transport encoding
//!
//! # Design Decisions
//! - Header application is layered: global headers may only set the content
//!   type when negotiation produced `*/*` or nothing; route headers always win
//! - Exit codes missing from every map fall back to 500
//! - Success sends stdout, failure sends stderr

use std::collections::BTreeMap;

use axum::body::{Body, Bytes};
use axum::http::{header, HeaderMap, HeaderName, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use base64::alphabet;
use base64::engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig};
use base64::Engine as _;
use thiserror::Error;

use crate::command::ExecutionOutput;
use crate::config::{RouteConfig, StatusConfig};
use crate::http::request::RequestContext;

/// Content type used when negotiation leaves nothing specific.
pub const DEFAULT_CONTENT_TYPE: &str = "application/json";

/// Lenient decoder for command output: padding optional.
const LENIENT_BASE64: GeneralPurpose = GeneralPurpose::new(
    &alphabet::STANDARD,
    GeneralPurposeConfig::new().with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

/// Errors from [`assemble`].
#[derive(Debug, Error)]
pub enum AssembleError {
    #[error("command output is not valid base64: {0}")]
    Base64(#[from] base64::DecodeError),
}

/// What a command run produced, as far as the response is concerned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutcome {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
    pub succeeded: bool,
}

impl CommandOutcome {
    pub fn success(output: ExecutionOutput) -> Self {
        Self {
            exit_code: output.exit_code,
            stdout: output.stdout,
            stderr: output.stderr,
            succeeded: true,
        }
    }

    pub fn failure(exit_code: i32, stdout: String, stderr: String) -> Self {
        Self {
            exit_code,
            stdout,
            stderr,
            succeeded: false,
        }
    }

    /// Text sent to the client: stdout on success, stderr otherwise.
    pub fn body(&self) -> &str {
        if self.succeeded {
            &self.stdout
        } else {
            &self.stderr
        }
    }
}

/// Exit code to HTTP status mapping.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusMap {
    codes: BTreeMap<i32, u16>,
}

impl Default for StatusMap {
    fn default() -> Self {
        Self::with_success(200)
    }
}

impl StatusMap {
    fn with_success(success: u16) -> Self {
        Self {
            codes: BTreeMap::from([(0, success), (1, 500), (126, 403), (127, 404)]),
        }
    }

    /// Build the map for a route's `response.status` setting.
    ///
    /// A single code replaces the success status; a map overlays the defaults.
    pub fn from_config(status: Option<&StatusConfig>) -> Self {
        match status {
            None => Self::default(),
            Some(StatusConfig::Code(code)) => Self::with_success(*code),
            Some(StatusConfig::Map(overrides)) => {
                let mut map = Self::default();
                for (exit_code, status) in overrides {
                    if let Ok(exit_code) = exit_code.trim().parse::<i32>() {
                        map.codes.insert(exit_code, *status);
                    }
                }
                map
            }
        }
    }

    /// Status for `exit_code`, 500 when unmapped.
    pub fn status_for(&self, exit_code: i32) -> StatusCode {
        self.codes
            .get(&exit_code)
            .and_then(|code| StatusCode::from_u16(*code).ok())
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
    }
}

/// A fully assembled command response.
#[derive(Debug, Clone)]
pub struct AssembledResponse {
    pub status: StatusCode,
    pub content_type: String,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl IntoResponse for AssembledResponse {
    fn into_response(self) -> Response {
        let mut response = Response::new(Body::from(self.body));
        *response.status_mut() = self.status;
        *response.headers_mut() = self.headers;
        let content_type = HeaderValue::from_str(&self.content_type)
            .unwrap_or_else(|_| HeaderValue::from_static(DEFAULT_CONTENT_TYPE));
        response
            .headers_mut()
            .insert(header::CONTENT_TYPE, content_type);
        response
    }
}

/// Pick the preferred media range from an `Accept` header.
///
/// Highest `q` wins; ties go to the first listed. Ranges with `q=0` are
/// never chosen.
pub fn negotiate(accept: Option<&str>) -> Option<String> {
    let accept = accept?;
    let mut best: Option<(f32, &str)> = None;
    for item in accept.split(',') {
        let mut parts = item.split(';');
        let media = parts.next().unwrap_or("").trim();
        if media.is_empty() {
            continue;
        }
        let q = parts
            .filter_map(|p| p.trim().strip_prefix("q="))
            .find_map(|q| q.trim().parse::<f32>().ok())
            .unwrap_or(1.0);
        if q <= 0.0 {
            continue;
        }
        if best.map(|(best_q, _)| q > best_q).unwrap_or(true) {
            best = Some((q, media));
        }
    }
    best.map(|(_, media)| media.to_string())
}

fn is_wildcard(content_type: &Option<String>) -> bool {
    content_type.as_deref().map(|ct| ct == "*/*").unwrap_or(true)
}

/// True if `Accept-Encoding` lists `base64`.
pub fn accepts_base64(accept_encoding: Option<&str>) -> bool {
    accept_encoding
        .map(|value| {
            value.split(',').any(|item| {
                item.split(';')
                    .next()
                    .map(|coding| coding.trim().eq_ignore_ascii_case("base64"))
                    .unwrap_or(false)
            })
        })
        .unwrap_or(false)
}

/// Decode base64 command output, ignoring whitespace such as a trailing newline.
pub fn decode_base64_output(output: &str) -> Result<Vec<u8>, base64::DecodeError> {
    let compact: String = output.chars().filter(|c| !c.is_ascii_whitespace()).collect();
    LENIENT_BASE64.decode(compact)
}

fn insert_header(headers: &mut HeaderMap, name: &str, value: &str) {
    match (
        HeaderName::from_bytes(name.as_bytes()),
        HeaderValue::from_str(value),
    ) {
        (Ok(name), Ok(value)) => {
            headers.insert(name, value);
        }
        _ => tracing::warn!(header = %name, "Skipping invalid configured header"),
    }
}

/// Build the HTTP response for a command outcome.
pub fn assemble(
    outcome: &CommandOutcome,
    route: &RouteConfig,
    global_headers: &BTreeMap<String, String>,
    ctx: &RequestContext,
) -> Result<AssembledResponse, AssembleError> {
    let mut headers = HeaderMap::new();
    let mut content_type = negotiate(ctx.accept.as_deref());

    for (name, value) in global_headers {
        if name.eq_ignore_ascii_case(header::CONTENT_TYPE.as_str()) {
            if is_wildcard(&content_type) {
                content_type = Some(value.clone());
            }
        } else {
            insert_header(&mut headers, name, value);
        }
    }

    if is_wildcard(&content_type) {
        content_type = Some(DEFAULT_CONTENT_TYPE.to_string());
    }

    for (name, value) in &route.response.headers {
        if name.eq_ignore_ascii_case(header::CONTENT_TYPE.as_str()) {
            content_type = Some(value.clone());
        } else {
            insert_header(&mut headers, name, value);
        }
    }

    let mut body = if route.output.base64 && outcome.succeeded {
        decode_base64_output(&outcome.stdout)?
    } else {
        outcome.body().as_bytes().to_vec()
    };

    if accepts_base64(ctx.accept_encoding.as_deref()) {
        body = base64::engine::general_purpose::STANDARD
            .encode(&body)
            .into_bytes();
        headers.insert(header::CONTENT_ENCODING, HeaderValue::from_static("base64"));
    }

    let status = StatusMap::from_config(route.response.status.as_ref()).status_for(outcome.exit_code);

    Ok(AssembledResponse {
        status,
        content_type: content_type.unwrap_or_else(|| DEFAULT_CONTENT_TYPE.to_string()),
        headers,
        body: Bytes::from(body),
    })
}
