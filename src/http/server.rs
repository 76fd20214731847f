//! HTTP server setup and the command handler.
//!
//! # Responsibilities
//! - Build the Axum router with the middleware stack
//! - Turn every request into one command invocation
//! - Tie the request's scratch directory to the response body
//! - Serve until the shutdown signal fires

use std::io;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::body::{Body, Bytes, HttpBody};
use axum::extract::{DefaultBodyLimit, FromRequest, Multipart, Request, State};
use axum::http::{header, HeaderValue};
use axum::response::{Html, IntoResponse, Response};
use axum::routing::any;
use axum::Router;
use futures_util::StreamExt;
use serde_json::{Map, Value};
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer};
use tracing::Level;
use uuid::Uuid;

use crate::command::template;
use crate::command::translator::{self, escape_double_quoted, REQUEST_ID_PARAM, TMP_DIR_ARG};
use crate::command::{self, CommandInput, ExecOptions, ExecutionError};
use crate::config::{CorsConfig, GatewayConfig, RouteConfig};
use crate::error::GatewayError;
use crate::http::request::{RequestContext, X_REQUEST_ID};
use crate::http::response::{self, CommandOutcome};
use crate::http::tmpdir::{TmpDir, TmpDirs};
use crate::http::upload;
use crate::http::view::{view_data, TemplateViews, ViewRenderer};
use crate::observability::metrics;
use crate::routing::RouteTable;

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<GatewayConfig>,
    pub routes: Arc<RouteTable>,
    pub tmp_dirs: TmpDirs,
    pub exec: Arc<ExecOptions>,
    pub views: Option<Arc<dyn ViewRenderer>>,
}

impl AppState {
    /// Build state from configuration, loading views from `views.dir` if present.
    pub fn new(config: GatewayConfig) -> io::Result<Self> {
        let tmp_dirs = TmpDirs::new(config.uploads.tmp_root.clone())?;
        let exec = ExecOptions {
            shell: config.command.shell.clone(),
            working_dir: config.command.working_dir.clone(),
            env: config.command.env.clone(),
            detached: config.command.detached,
            timeout: config.command.timeout_secs.map(Duration::from_secs),
        };
        let views = TemplateViews::from_config(&config.views)
            .map(|views| Arc::new(views) as Arc<dyn ViewRenderer>);
        if views.is_none() {
            tracing::debug!(dir = %config.views.dir.display(), "Views directory not found, views disabled");
        }

        Ok(Self {
            routes: Arc::new(RouteTable::from_config(&config)),
            config: Arc::new(config),
            tmp_dirs,
            exec: Arc::new(exec),
            views,
        })
    }

    /// Replace the view renderer.
    pub fn with_views(mut self, views: Option<Arc<dyn ViewRenderer>>) -> Self {
        self.views = views;
        self
    }
}

/// HTTP server for the gateway.
pub struct GatewayServer {
    router: Router,
    config: Arc<GatewayConfig>,
}

impl GatewayServer {
    /// Create a server for `config`.
    pub fn new(config: GatewayConfig) -> io::Result<Self> {
        Ok(Self::from_state(AppState::new(config)?))
    }

    pub fn from_state(state: AppState) -> Self {
        let config = state.config.clone();
        let router = Self::build_router(&config, state);
        Self { router, config }
    }

    /// Build the Axum router with all middleware layers.
    fn build_router(config: &GatewayConfig, state: AppState) -> Router {
        let limit = config.limits.max_body_bytes;
        let router = Router::new()
            .route("/", any(command_handler))
            .route("/{*path}", any(command_handler))
            .with_state(state)
            .layer(DefaultBodyLimit::max(limit))
            .layer(RequestBodyLimitLayer::new(limit))
            .layer(CatchPanicLayer::new())
            .layer(PropagateRequestIdLayer::new(X_REQUEST_ID))
            .layer(
                TraceLayer::new_for_http()
                    .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                    .on_response(DefaultOnResponse::new().level(Level::INFO)),
            )
            .layer(SetRequestIdLayer::new(X_REQUEST_ID, MakeRequestUuid));

        if config.cors.enabled {
            router.layer(cors_layer(&config.cors))
        } else {
            router
        }
    }

    /// The configured router, for serving or driving directly in tests.
    pub fn router(&self) -> Router {
        self.router.clone()
    }

    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    /// Serve on `listener` until `shutdown` fires.
    pub async fn run(
        self,
        listener: TcpListener,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(
            address = %addr,
            routes = self.config.api.len(),
            program = %self.config.command.program,
            "HTTP server starting"
        );

        axum::serve(listener, self.router)
            .with_graceful_shutdown(async move {
                let _ = shutdown.recv().await;
                tracing::info!("Shutdown signal received, draining connections");
            })
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }
}

fn cors_layer(config: &CorsConfig) -> CorsLayer {
    let layer = CorsLayer::new().allow_methods(Any).allow_headers(Any);
    if config.allowed_origins.iter().any(|o| o == "*") {
        return layer.allow_origin(Any);
    }

    let origins: Vec<HeaderValue> = config
        .allowed_origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!(origin = %origin, "Skipping invalid CORS origin");
                None
            }
        })
        .collect();
    layer.allow_origin(AllowOrigin::list(origins))
}

/// Main handler: one request, one command.
async fn command_handler(State(state): State<AppState>, request: Request) -> Response {
    let started = Instant::now();
    let method = request.method().clone();

    let id = Uuid::new_v4();
    let tmp_dir = match state.tmp_dirs.allocate(&id) {
        Ok(dir) => dir,
        Err(e) => {
            tracing::error!(error = %e, "Failed to create scratch directory");
            let response = GatewayError::from(e).into_response();
            metrics::record_request(method.as_str(), response.status().as_u16(), started);
            return response;
        }
    };
    let ctx = RequestContext::new(id, tmp_dir.path(), request.headers());

    let response = match handle(&state, request, &ctx).await {
        Ok(response) => response,
        Err(e) => e.into_response(),
    };

    metrics::record_request(method.as_str(), response.status().as_u16(), started);
    attach_tmp_dir(response, tmp_dir)
}

async fn handle(
    state: &AppState,
    request: Request,
    ctx: &RequestContext,
) -> Result<Response, GatewayError> {
    let method = request.method().clone();
    let path = request.uri().path().to_string();
    let query = translator::parse_query(request.uri().query());

    let command_path = state
        .routes
        .command_path(&path)
        .ok_or_else(|| GatewayError::NotFound(format!("no command at {}", path)))?;
    let route = state.routes.lookup(&method, &path);

    let (body_params, input) =
        read_body(request, &ctx.tmp_dir, state.config.uploads.max_files).await?;

    let line = translator::translate(command_path, &query, &ctx.tmp_dir)?;
    let command_line = build_command_line(state, route, &line, &query, body_params, ctx);

    tracing::info!(
        request_id = %ctx.correlation_id,
        method = %method,
        path = %path,
        command = %command_line,
        "Executing command"
    );

    let exec_started = Instant::now();
    let outcome = match command::execute(&command_line, input, &state.exec).await {
        Ok(output) => CommandOutcome::success(output),
        Err(ExecutionError::Exited(failure)) => {
            CommandOutcome::failure(failure.exit_code, failure.stdout, failure.stderr)
        }
        Err(e @ ExecutionError::Spawn { .. }) => {
            tracing::error!(error = %e, "Command could not be started");
            CommandOutcome::failure(1, String::new(), e.to_string())
        }
        Err(e) => {
            metrics::record_command_error(&e, exec_started.elapsed());
            return Err(e.into());
        }
    };
    metrics::record_command(outcome.exit_code, exec_started.elapsed());

    tracing::info!(
        request_id = %ctx.correlation_id,
        exit_code = outcome.exit_code,
        duration_ms = exec_started.elapsed().as_millis() as u64,
        "Command finished"
    );

    // Views answer 200 whatever the exit code.
    if let Some(views) = &state.views {
        if let Some(selection) = views.select(route.view.as_ref(), command_path) {
            tracing::debug!(view = %selection.name, "Rendering view");
            let html = views.render(&selection, &view_data(&outcome.stdout))?;
            return Ok(Html(html).into_response());
        }
    }

    let assembled = response::assemble(&outcome, route, &state.config.response.headers, ctx)?;
    Ok(assembled.into_response())
}

/// Full command line: the route's template or `<program> <words>`, then the
/// translated arguments.
fn build_command_line(
    state: &AppState,
    route: &RouteConfig,
    line: &translator::CommandLine,
    query: &[(String, String)],
    body_params: Map<String, Value>,
    ctx: &RequestContext,
) -> String {
    let base = match &route.command {
        Some(command_template) => {
            let mut params = body_params;
            for (key, value) in query {
                params.insert(key.clone(), Value::String(value.clone()));
            }
            params.insert(
                TMP_DIR_ARG.to_string(),
                Value::String(ctx.tmp_dir.to_string_lossy().into_owned()),
            );
            params.insert(
                REQUEST_ID_PARAM.to_string(),
                Value::String(ctx.id.to_string()),
            );
            let params: Map<String, Value> = params
                .into_iter()
                .map(|(key, value)| (key, escape_strings(value)))
                .collect();
            template::resolve_blanking(command_template, &params)
        }
        None => format!("{} {}", state.config.command.program, line.command),
    };

    format!("{} {}", base.trim(), line.args).trim().to_string()
}

/// Escape every string leaf for a double-quoted shell word.
fn escape_strings(value: Value) -> Value {
    match value {
        Value::String(s) => Value::String(escape_double_quoted(&s)),
        Value::Array(items) => Value::Array(items.into_iter().map(escape_strings).collect()),
        Value::Object(map) => Value::Object(
            map.into_iter()
                .map(|(key, value)| (key, escape_strings(value)))
                .collect(),
        ),
        other => other,
    }
}

/// Turn the request body into template parameters and command input.
///
/// Multipart bodies are ingested into `tmp_dir` and sent as a JSON object;
/// JSON bodies are validated and forwarded; anything else is streamed.
async fn read_body(
    request: Request,
    tmp_dir: &Path,
    max_files: Option<usize>,
) -> Result<(Map<String, Value>, CommandInput), GatewayError> {
    let content_type = request
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_ascii_lowercase();

    if content_type.starts_with("multipart/form-data") {
        let multipart = Multipart::from_request(request, &())
            .await
            .map_err(|rejection| GatewayError::BadRequest(rejection.body_text()))?;
        let fields = upload::ingest(multipart, tmp_dir, max_files).await?;
        return Ok((fields.clone(), CommandInput::Json(Value::Object(fields))));
    }

    if content_type.starts_with("application/json") {
        let bytes = Bytes::from_request(request, &())
            .await
            .map_err(|rejection| match rejection.status().as_u16() {
                413 => GatewayError::PayloadTooLarge(rejection.body_text()),
                _ => GatewayError::BadRequest(rejection.body_text()),
            })?;
        if bytes.is_empty() {
            return Ok((Map::new(), CommandInput::Empty));
        }
        let value: Value = serde_json::from_slice(&bytes)
            .map_err(|e| GatewayError::BadRequest(format!("invalid JSON body: {}", e)))?;
        let params = match &value {
            Value::Object(map) => map.clone(),
            _ => Map::new(),
        };
        return Ok((params, CommandInput::Json(value)));
    }

    if request.body().size_hint().exact() == Some(0) {
        return Ok((Map::new(), CommandInput::Empty));
    }

    let stream = request
        .into_body()
        .into_data_stream()
        .map(|chunk| chunk.map_err(io::Error::other))
        .boxed();
    Ok((Map::new(), CommandInput::Stream(stream)))
}

/// Move the scratch directory guard into the response body.
///
/// The directory is removed when the body has been sent or dropped.
fn attach_tmp_dir(response: Response, tmp_dir: TmpDir) -> Response {
    let (mut parts, body) = response.into_parts();
    if let Some(len) = body.size_hint().exact() {
        parts
            .headers
            .entry(header::CONTENT_LENGTH)
            .or_insert_with(|| HeaderValue::from(len));
    }

    let stream = body.into_data_stream().map(move |chunk| {
        let _guard = &tmp_dir;
        chunk
    });
    Response::from_parts(parts, Body::from_stream(stream))
}
