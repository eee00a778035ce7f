//! Credential issuance and verification.
//!
//! # Data Flow
//! ```text
//! startup:
//!     settings store → secret.rs (resolve signing secret per environment)
//!     → CredentialVerifier (holds derived keys for the process lifetime)
//!
//! per request:
//!     headers → token.rs extract → verify → claims | none
//!     (absence of claims means anonymous, never an error)
//! ```
//!
//! # Design Decisions
//! - Verification fails closed; callers never see why a token was bad
//! - Production restarts rotate the secret, bulk-invalidating all
//!   outstanding credentials (coarse kill-switch)

pub mod secret;
pub mod token;

pub use token::{Claims, CredentialVerifier};
