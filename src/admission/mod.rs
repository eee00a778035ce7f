//! Admission control.
//!
//! # Data Flow
//! ```text
//! Incoming upload request:
//!     → blacklist.rs  (IP gate, checked first, even for keyed clients)
//!     → classification (credential verifier → public or private mode)
//!     → rate_limit.rs (fixed window per "<mode>:<identifier>")
//!     → concurrency.rs (slot check + claim, atomic)
//!     → forward upstream; dropping the permit releases the slot
//! ```
//!
//! # Design Decisions
//! - Every request is evaluated independently; there is no ban window
//!   beyond the blacklist itself
//! - A missing policy admits (fail open); unreadable blacklist state
//!   means "not blacklisted"; the asymmetry is inherited behavior
//! - Slot release is RAII, never a caller obligation

pub mod blacklist;
pub mod concurrency;
pub mod rate_limit;

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use crate::auth::{Claims, CredentialVerifier};
use crate::error::GateError;
use crate::observability::metrics;
use crate::store::SettingStore;

pub use blacklist::{Blacklist, BlacklistEntry, BlacklistPage};
pub use concurrency::{ConcurrencyLimiter, SlotLimit, SlotPermit};
pub use rate_limit::{RateDecision, RateLimiter};

/// Settings-store keys for the per-mode policies.
pub const PUBLIC_POLICY_KEY: &str = "public_api";
pub const PRIVATE_POLICY_KEY: &str = "private_api";

/// Admission policy for anonymous uploads.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase", default)]
pub struct PublicPolicy {
    /// Master switch; anonymous uploads are rejected while false.
    pub enabled: bool,
    /// Requests per minute per client IP.
    pub rate_limit: u32,
    /// Allow more than one in-flight upload per IP.
    pub allow_concurrent: bool,
    /// Maximum upload size in bytes.
    pub max_file_size: u64,
}

impl Default for PublicPolicy {
    fn default() -> Self {
        Self {
            enabled: false,
            rate_limit: 10,
            allow_concurrent: false,
            max_file_size: 10 * 1024 * 1024,
        }
    }
}

/// Admission policy for keyed uploads.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase", default)]
pub struct PrivatePolicy {
    /// Requests per minute per key.
    pub rate_limit: u32,
    /// Simultaneous uploads per key.
    pub max_concurrent: u32,
    /// Maximum upload size in bytes.
    pub max_file_size: u64,
}

impl Default for PrivatePolicy {
    fn default() -> Self {
        Self {
            rate_limit: 100,
            max_concurrent: 5,
            max_file_size: 100 * 1024 * 1024,
        }
    }
}

/// Admission mode, resolved once per request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Public,
    Private,
}

impl Mode {
    pub fn as_str(self) -> &'static str {
        match self {
            Mode::Public => "public",
            Mode::Private => "private",
        }
    }
}

/// Who is asking, and under which mode their state is scoped.
#[derive(Debug, Clone)]
pub enum Identity {
    /// Anonymous client, scoped by source IP.
    Anonymous { ip: String },
    /// Authenticated client, scoped by the presented key.
    Keyed { api_key: String, claims: Claims },
}

impl Identity {
    pub fn mode(&self) -> Mode {
        match self {
            Identity::Anonymous { .. } => Mode::Public,
            Identity::Keyed { .. } => Mode::Private,
        }
    }

    /// Key under which rate windows and slots are scoped.
    pub fn scope_key(&self) -> String {
        match self {
            Identity::Anonymous { ip } => format!("public:{}", ip),
            Identity::Keyed { api_key, .. } => format!("private:{}", api_key),
        }
    }
}

/// Resolved per-mode policy.
#[derive(Debug, Clone)]
pub enum Policy {
    Public(PublicPolicy),
    Private(PrivatePolicy),
}

impl Policy {
    pub fn rate_limit(&self) -> u32 {
        match self {
            Policy::Public(p) => p.rate_limit,
            Policy::Private(p) => p.rate_limit,
        }
    }

    pub fn max_file_size(&self) -> u64 {
        match self {
            Policy::Public(p) => p.max_file_size,
            Policy::Private(p) => p.max_file_size,
        }
    }

    pub fn slot_limit(&self) -> SlotLimit {
        match self {
            Policy::Public(p) if p.allow_concurrent => SlotLimit::Unlimited,
            Policy::Public(_) => SlotLimit::Exclusive,
            Policy::Private(p) => SlotLimit::AtMost(p.max_concurrent),
        }
    }
}

/// A granted admission: the caller may start the upload.
pub struct Admission {
    pub identity: Identity,
    /// Requests left in the current rate window, when a policy applied.
    pub remaining: Option<u32>,
    /// Upload size cap from the policy, when one applied.
    pub max_file_size: Option<u64>,
    /// Held for the duration of the upload; dropping it frees the slot.
    pub permit: SlotPermit,
}

/// Seed default policies into the settings store if absent.
pub fn seed_default_policies(settings: &SettingStore) -> std::io::Result<()> {
    settings.ensure_default(PUBLIC_POLICY_KEY, PublicPolicy::default())?;
    settings.ensure_default(PRIVATE_POLICY_KEY, PrivatePolicy::default())
}

/// Owner of all admission state; one per process.
pub struct AdmissionService {
    settings: Arc<SettingStore>,
    blacklist: Arc<Blacklist>,
    verifier: Arc<CredentialVerifier>,
    rate: Arc<RateLimiter>,
    slots: Arc<ConcurrencyLimiter>,
}

impl AdmissionService {
    pub fn new(
        settings: Arc<SettingStore>,
        blacklist: Arc<Blacklist>,
        verifier: Arc<CredentialVerifier>,
    ) -> Self {
        Self {
            settings,
            blacklist,
            verifier,
            rate: Arc::new(RateLimiter::new()),
            slots: Arc::new(ConcurrencyLimiter::new()),
        }
    }

    pub fn blacklist(&self) -> &Blacklist {
        &self.blacklist
    }

    pub fn settings(&self) -> &SettingStore {
        &self.settings
    }

    /// Classify a request as anonymous or keyed.
    ///
    /// A token that fails verification routes to public mode; it never
    /// rejects by itself.
    pub fn classify(&self, ip: &str, token: Option<&str>) -> Identity {
        if let Some(token) = token {
            if let Some(claims) = self.verifier.verify(token) {
                return Identity::Keyed {
                    api_key: token.to_string(),
                    claims,
                };
            }
        }
        Identity::Anonymous { ip: ip.to_string() }
    }

    pub fn verify_credential(&self, token: &str) -> Option<Claims> {
        self.verifier.verify(token)
    }

    pub fn issue_credential(
        &self,
        user_id: &str,
        username: &str,
    ) -> Result<String, jsonwebtoken::errors::Error> {
        self.verifier.issue(user_id, username)
    }

    fn policy_for(&self, mode: Mode) -> Option<Policy> {
        match mode {
            Mode::Public => self
                .settings
                .get::<PublicPolicy>(PUBLIC_POLICY_KEY)
                .map(Policy::Public),
            Mode::Private => self
                .settings
                .get::<PrivatePolicy>(PRIVATE_POLICY_KEY)
                .map(Policy::Private),
        }
    }

    /// Run the full admission pipeline for one upload request.
    pub fn admit(&self, ip: &str, token: Option<&str>) -> Result<Admission, GateError> {
        // Blacklist first; a banned network must not reach keyed flows either.
        if self.blacklist.is_blacklisted(ip) {
            metrics::record_rejected("blacklisted");
            tracing::warn!(client = %ip, "Rejected blacklisted IP");
            return Err(GateError::Forbidden("IP address is blacklisted".to_string()));
        }

        let identity = self.classify(ip, token);
        let mode = identity.mode();
        // An absent policy admits unchecked; the slot is still tracked.
        let policy = self.policy_for(mode);

        if let Some(Policy::Public(public)) = &policy {
            if !public.enabled {
                metrics::record_rejected("public_disabled");
                return Err(GateError::Forbidden(
                    "anonymous uploads are disabled".to_string(),
                ));
            }
        }

        let key = identity.scope_key();
        let mut remaining = None;
        if let Some(policy) = &policy {
            match self.rate.check(&key, policy.rate_limit()) {
                RateDecision::Reject { retry_after } => {
                    metrics::record_rejected("rate_limited");
                    tracing::warn!(client = %key, retry_after, "Rate limit exceeded");
                    return Err(GateError::TooManyRequests { retry_after });
                }
                RateDecision::Admit { remaining: left } => remaining = Some(left),
            }
        }

        let slot_limit = policy
            .as_ref()
            .map(Policy::slot_limit)
            .unwrap_or(SlotLimit::Unlimited);
        let permit = match self.slots.try_acquire(&key, slot_limit) {
            Ok(permit) => permit,
            Err(e) => {
                metrics::record_rejected("busy");
                tracing::warn!(client = %key, "No concurrency slot available");
                return Err(e);
            }
        };

        metrics::record_admitted(mode.as_str());
        Ok(Admission {
            max_file_size: policy.as_ref().map(Policy::max_file_size),
            remaining,
            identity,
            permit,
        })
    }

    /// Periodic cleanup of stale rate windows, decoupled from request traffic.
    pub fn spawn_sweeper(&self, mut shutdown: broadcast::Receiver<()>) -> JoinHandle<()> {
        let rate = Arc::clone(&self.rate);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(rate_limit::SWEEP_INTERVAL);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        rate.sweep();
                        metrics::record_rate_windows(rate.window_count());
                    }
                    _ = shutdown.recv() => {
                        tracing::debug!("Rate window sweeper stopped");
                        break;
                    }
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn service(public: Option<PublicPolicy>, private: Option<PrivatePolicy>) -> AdmissionService {
        let settings = Arc::new(SettingStore::new(None));
        if let Some(policy) = public {
            settings.put(PUBLIC_POLICY_KEY, &policy).unwrap();
        }
        if let Some(policy) = private {
            settings.put(PRIVATE_POLICY_KEY, &policy).unwrap();
        }
        AdmissionService::new(
            settings,
            Arc::new(Blacklist::new(None)),
            Arc::new(CredentialVerifier::new("admission-test-secret")),
        )
    }

    fn open_public() -> PublicPolicy {
        PublicPolicy {
            enabled: true,
            ..PublicPolicy::default()
        }
    }

    #[test]
    fn missing_policy_fails_open() {
        let service = service(None, None);
        let admission = service.admit("1.2.3.4", None).unwrap();
        assert_eq!(admission.remaining, None);
        assert_eq!(admission.max_file_size, None);
        assert_eq!(admission.identity.mode(), Mode::Public);
    }

    #[test]
    fn disabled_public_policy_rejects_anonymous_clients() {
        let service = service(Some(PublicPolicy::default()), None);
        assert!(matches!(
            service.admit("1.2.3.4", None),
            Err(GateError::Forbidden(_))
        ));
    }

    #[test]
    fn blacklisted_ip_is_rejected_before_classification() {
        let service = service(Some(open_public()), Some(PrivatePolicy::default()));
        service.blacklist().add("1.2.3.4", "spam").unwrap();

        let token = service.issue_credential("u1", "alice").unwrap();
        assert!(matches!(
            service.admit("1.2.3.4", Some(&token)),
            Err(GateError::Forbidden(_))
        ));
        // A clean address with the same credential is admitted.
        assert!(service.admit("5.6.7.8", Some(&token)).is_ok());
    }

    #[test]
    fn invalid_token_routes_to_public_mode() {
        let service = service(Some(open_public()), Some(PrivatePolicy::default()));
        let identity = service.classify("1.2.3.4", Some("garbage"));
        assert_eq!(identity.mode(), Mode::Public);
        assert_eq!(identity.scope_key(), "public:1.2.3.4");
    }

    #[test]
    fn valid_token_routes_to_private_mode() {
        let service = service(Some(PublicPolicy::default()), Some(PrivatePolicy::default()));
        let token = service.issue_credential("u1", "alice").unwrap();

        // Public mode is disabled, yet the keyed client gets through.
        let admission = service.admit("1.2.3.4", Some(&token)).unwrap();
        assert_eq!(admission.identity.mode(), Mode::Private);
        assert_eq!(
            admission.remaining,
            Some(PrivatePolicy::default().rate_limit - 1)
        );
    }

    #[test]
    fn rate_limit_exhaustion_rejects_with_retry_after() {
        let service = service(
            Some(PublicPolicy {
                rate_limit: 2,
                allow_concurrent: true,
                ..open_public()
            }),
            None,
        );

        for _ in 0..2 {
            let admission = service.admit("1.2.3.4", None).unwrap();
            drop(admission);
        }
        match service.admit("1.2.3.4", None) {
            Err(GateError::TooManyRequests { retry_after }) => assert!(retry_after <= 60),
            other => panic!("expected rate limit rejection, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn public_uploads_are_single_flight() {
        let service = service(Some(open_public()), None);

        let first = service.admit("1.2.3.4", None).unwrap();
        assert!(matches!(
            service.admit("1.2.3.4", None),
            Err(GateError::Busy(_))
        ));

        drop(first);
        assert!(service.admit("1.2.3.4", None).is_ok());
    }

    #[test]
    fn private_uploads_are_bounded_per_key() {
        let service = service(
            Some(PublicPolicy::default()),
            Some(PrivatePolicy {
                rate_limit: 100,
                max_concurrent: 2,
                ..PrivatePolicy::default()
            }),
        );
        let token = service.issue_credential("u1", "alice").unwrap();

        let a = service.admit("1.2.3.4", Some(&token)).unwrap();
        let _b = service.admit("1.2.3.4", Some(&token)).unwrap();
        assert!(matches!(
            service.admit("1.2.3.4", Some(&token)),
            Err(GateError::Busy(_))
        ));

        drop(a);
        assert!(service.admit("1.2.3.4", Some(&token)).is_ok());
    }
}
