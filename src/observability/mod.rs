//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! Admission pipeline produces:
//!     → tracing events (structured, client/mode fields)
//!     → metrics.rs (counters for decisions, gauge for live windows)
//!
//! Consumers:
//!     → Log aggregation (stdout)
//!     → Metrics endpoint (Prometheus scrape, optional)
//! ```
//!
//! # Design Decisions
//! - Metric updates are cheap atomic increments on the request path
//! - The Prometheus listener only starts when enabled in config

pub mod metrics;
