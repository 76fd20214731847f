//! HTTP gateway that publishes a command-line program as an HTTP API.
//!
//! # Architecture Overview
//!
//! ```text
//!     Client Request
//!     ──────────────▶ http::server ──▶ routing::table ──▶ http::upload
//!                          │                                  │
//!                          ▼                                  ▼
//!                    http::tmpdir                  command::translator
//!                    (scratch dir)                 command::template
//!                                                        │
//!                                                        ▼
//!     Client Response                              command::executor
//!     ◀────────────── http::response / http::view ◀──── (shell child)
//! ```
//!
//! `GET /users/list?name=Ada` runs `<program> users list --name "Ada" --tmpDir "<dir>"`;
//! the exit code picks the status and stdout (or stderr) becomes the body.

pub mod command;
pub mod config;
pub mod error;
pub mod http;
pub mod lifecycle;
pub mod observability;
pub mod routing;

pub use config::GatewayConfig;
pub use error::GatewayError;
pub use http::GatewayServer;
pub use lifecycle::Shutdown;
