//! HTTP surface of the upload gate.
//!
//! # Data Flow
//! ```text
//! inbound request
//!     → server.rs (Axum setup, body limit, timeout, tracing)
//!     → upload.rs (admission middleware → upstream forwarder)
//!     → admin.rs  (credential-guarded management API)
//! ```

pub mod admin;
pub mod server;
pub mod upload;

pub use server::{AppState, GateServer};
