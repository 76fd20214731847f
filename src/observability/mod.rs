//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! Handler and executor produce:
//!     → logging.rs (structured log events via `tracing`)
//!     → metrics.rs (request and command counters, command latency)
//!
//! Consumers:
//!     → stdout (pretty for development, JSON for aggregation)
//!     → Prometheus scrape endpoint (optional)
//! ```
//!
//! # Design Decisions
//! - Request ID flows through every log line via the trace span
//! - Metric updates are no-ops until a recorder is installed

pub mod logging;
pub mod metrics;
