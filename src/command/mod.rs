//! Command execution bridge.
//!
//! # Data Flow
//! ```text
//! Request path + query + scratch dir
//!     → translator.rs (path segments → command words, query → --flag "value")
//!     → template.rs (expand ${name.path} placeholders in route templates)
//!     → executor.rs (spawn through the shell, feed stdin, collect output)
//!     → ExecutionOutput | ExecutionError
//! ```
//!
//! # Design Decisions
//! - Everything here is independent of HTTP types except the body stream
//! - User-supplied values are shell-escaped; templates come only from config

pub mod executor;
pub mod template;
pub mod translator;

pub use executor::{
    execute, CommandInput, ExecOptions, ExecutionError, ExecutionFailure, ExecutionOutput,
};
pub use translator::{translate, CommandLine, TranslateError};
