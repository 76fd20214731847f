//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, middleware, command handler)
//!     → tmpdir.rs (scratch directory for this request)
//!     → request.rs (request id, negotiation headers)
//!     → upload.rs (multipart files into the scratch directory)
//!     → [command bridge translates and runs the command]
//!     → response.rs (status, content type, base64) or view.rs (HTML)
//!     → Send to client, then the scratch directory is removed
//! ```

pub mod request;
pub mod response;
pub mod server;
pub mod tmpdir;
pub mod upload;
pub mod view;

pub use request::{RequestContext, X_REQUEST_ID};
pub use server::{AppState, GatewayServer};
