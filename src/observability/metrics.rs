//! Metrics collection and exposition.
//!
//! # Metrics
//! - `gateway_requests_total` (counter): requests by method, status
//! - `gateway_request_duration_seconds` (histogram): end-to-end latency
//! - `gateway_command_executions_total` (counter): commands by exit code or error
//! - `gateway_command_duration_seconds` (histogram): command run time

use std::net::SocketAddr;
use std::time::{Duration, Instant};

use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

use crate::command::ExecutionError;

/// Install the Prometheus recorder and its scrape listener on `addr`.
///
/// Must be called from within a Tokio runtime.
pub fn init_metrics(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    tracing::info!(address = %addr, "Metrics endpoint listening");
    Ok(())
}

pub fn record_request(method: &str, status: u16, started: Instant) {
    metrics::counter!(
        "gateway_requests_total",
        "method" => method.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
    metrics::histogram!("gateway_request_duration_seconds", "method" => method.to_string())
        .record(started.elapsed().as_secs_f64());
}

/// Record a command that ran to completion with `exit_code`.
pub fn record_command(exit_code: i32, duration: Duration) {
    metrics::counter!(
        "gateway_command_executions_total",
        "exit_code" => exit_code.to_string()
    )
    .increment(1);
    metrics::histogram!("gateway_command_duration_seconds").record(duration.as_secs_f64());
}

/// Record a command that produced no exit code.
pub fn record_command_error(error: &ExecutionError, duration: Duration) {
    let kind = match error {
        ExecutionError::Timeout(_) => "timeout",
        ExecutionError::Spawn { .. } => "spawn",
        ExecutionError::Exited(_) => "exited",
        ExecutionError::Input(_) => "input",
        ExecutionError::Io(_) => "io",
    };
    metrics::counter!("gateway_command_executions_total", "error" => kind).increment(1);
    metrics::histogram!("gateway_command_duration_seconds").record(duration.as_secs_f64());
}
