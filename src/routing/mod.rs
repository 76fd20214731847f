//! Routing subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming Request (method, path)
//!     → table.rs (prefix check, "METHOD /path" lookup)
//!     → Return: command path + RouteConfig (empty when unconfigured)
//!
//! Route Compilation (at startup):
//!     [api] table from config
//!     → Freeze as immutable RouteTable
//! ```
//!
//! # Design Decisions
//! - Routes compiled at startup, immutable at runtime
//! - Exact key match only; no patterns or regex
//! - Every path is routable: unconfigured paths get default behaviour

pub mod table;

pub use table::{route_key, RouteTable};
