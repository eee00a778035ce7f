//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → GateConfig (validated, immutable)
//!     → shared via ArcSwap to the HTTP layer
//!
//! On file change:
//!     watcher.rs detects change
//!     → loader.rs loads new config
//!     → validation.rs validates
//!     → atomic swap; in-flight requests keep the old snapshot
//! ```
//!
//! # Design Decisions
//! - Process config (TOML) is separate from the per-mode upload policies,
//!   which live in the settings store and are mutable at runtime
//! - All fields have defaults so the gate boots without a config file
//! - A failed reload keeps the current configuration

pub mod loader;
pub mod schema;
pub mod validation;
pub mod watcher;

pub use schema::Environment;
pub use schema::GateConfig;
