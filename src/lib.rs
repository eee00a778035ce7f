//! Upload admission gateway library.
//!
//! Everything that decides whether an upload may start lives here: the IP
//! blacklist gate, credential classification, fixed-window rate limiting
//! and per-identifier concurrency slots, composed into a single
//! admit-or-reject decision ahead of the costly upload pipeline.

// Core subsystems
pub mod admission;
pub mod auth;
pub mod config;
pub mod error;
pub mod http;
pub mod store;

// Cross-cutting concerns
pub mod lifecycle;
pub mod observability;

pub use admission::AdmissionService;
pub use config::GateConfig;
pub use error::GateError;
pub use http::GateServer;
pub use lifecycle::Shutdown;
