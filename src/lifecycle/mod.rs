//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → Shutdown::trigger
//!
//! Shutdown (shutdown.rs):
//!     trigger → every subscriber wakes → server stops accepting → in-flight
//!     requests finish (scratch directories removed as bodies complete)
//! ```
//!
//! # Design Decisions
//! - One broadcast channel; the server and any background task subscribe
//! - Running commands are not killed on shutdown

pub mod shutdown;
pub mod signals;

pub use shutdown::Shutdown;
pub use signals::shutdown_signal;
