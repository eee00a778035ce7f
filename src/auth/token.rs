//! Signed credential tokens.
//!
//! Verification fails closed: malformed, expired or mis-signed tokens all
//! come back as `None` and the caller treats the request as anonymous.

use std::time::{SystemTime, UNIX_EPOCH};

use axum::http::header::{HeaderMap, AUTHORIZATION};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

/// Credential validity period: 30 days.
const VALIDITY_SECS: u64 = 30 * 24 * 60 * 60;

pub const API_KEY_HEADER: &str = "x-api-key";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Claims {
    pub user_id: String,
    pub username: String,
    /// Expiry, seconds since epoch.
    pub exp: u64,
}

/// Stateless verifier/issuer bound to the process signing secret.
pub struct CredentialVerifier {
    encoding: EncodingKey,
    decoding: DecodingKey,
}

impl CredentialVerifier {
    pub fn new(secret: &str) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
        }
    }

    /// Issue a signed credential valid for 30 days.
    pub fn issue(
        &self,
        user_id: &str,
        username: &str,
    ) -> Result<String, jsonwebtoken::errors::Error> {
        let claims = Claims {
            user_id: user_id.to_string(),
            username: username.to_string(),
            exp: unix_now() + VALIDITY_SECS,
        };
        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)
    }

    /// Verify a presented token. Any failure yields `None`.
    pub fn verify(&self, token: &str) -> Option<Claims> {
        let validation = Validation::new(Algorithm::HS256);
        decode::<Claims>(token, &self.decoding, &validation)
            .map(|data| data.claims)
            .ok()
    }
}

/// Pull a candidate token out of the request headers.
///
/// `Authorization: Bearer <token>` wins over `X-Api-Key`.
pub fn extract_token(headers: &HeaderMap) -> Option<&str> {
    if let Some(value) = headers.get(AUTHORIZATION).and_then(|v| v.to_str().ok()) {
        if let Some(token) = value.strip_prefix("Bearer ") {
            return Some(token);
        }
    }
    headers
        .get(API_KEY_HEADER)
        .and_then(|v| v.to_str().ok())
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}
