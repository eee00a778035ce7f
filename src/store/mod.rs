//! Keyed JSON persistence.
//!
//! # Data Flow
//! ```text
//! settings.json
//!     → settings.rs (load into memory at startup)
//!     → get/put per key; mutations rewrite the backing file
//!     → consumed by auth (credential secret) and admission (policies)
//! ```
//!
//! # Design Decisions
//! - Reads never touch disk; the store is a write-through cache
//! - A missing or undecodable value reads as absent, callers decide
//!   whether that fails open or closed

pub mod settings;

pub use settings::SettingStore;
