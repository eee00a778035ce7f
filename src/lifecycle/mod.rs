//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (main.rs):
//!     Load config → Open stores → Resolve secret → Start sweeper → Serve
//!
//! Shutdown (shutdown.rs):
//!     Ctrl+C → broadcast signal → server drains, sweeper stops
//! ```
//!
//! # Design Decisions
//! - Ordered startup: config first, then stores, then background tasks,
//!   then the listener (traffic only when ready)
//! - Every long-running task subscribes to the same shutdown channel

pub mod shutdown;

pub use shutdown::Shutdown;
