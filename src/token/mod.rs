//! Signed, time-boxed action tokens for session-less self-service links.
//!
//! Wire format: `base64url(claims_json) "." base64url(hmac_sha256(payload_segment))`,
//! both segments unpadded. There is no revocation: a token stays valid until it
//! expires or the signing secret changes.

use std::sync::Arc;

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::{DateTime, Duration, Utc};
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use subtle::ConstantTimeEq;
use thiserror::Error;

use crate::clock::{Clock, SystemClock};

type HmacSha256 = Hmac<Sha256>;

pub const TOKEN_TTL_DAYS: i64 = 30;
pub const NEAR_EXPIRY_DAYS: i64 = 7;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TokenError {
    #[error("action token secret is not configured")]
    MissingSecret,
    #[error("malformed token")]
    Malformed,
    #[error("signature mismatch")]
    TamperDetected,
    #[error("invalid claims")]
    InvalidClaims,
    #[error("token expired")]
    Expired,
}

/// Claims carried by a token. Field order is the serialised order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ActionClaims {
    pub subject_id: i64,
    pub identity_claim: String,
    /// Milliseconds since the Unix epoch.
    pub expires_at: i64,
}

impl ActionClaims {
    pub fn expires_at_utc(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp_millis(self.expires_at)
    }

    fn has_valid_shape(&self) -> bool {
        self.subject_id > 0 && !self.identity_claim.trim().is_empty()
    }
}

pub struct ActionTokenService {
    secret: Vec<u8>,
    clock: Arc<dyn Clock>,
}

impl std::fmt::Debug for ActionTokenService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActionTokenService")
            .field("secret", &"<redacted>")
            .finish()
    }
}

impl ActionTokenService {
    /// Refuses to build without a secret rather than signing with a guessable key.
    pub fn new(secret: &str) -> Result<Self, TokenError> {
        if secret.trim().is_empty() {
            return Err(TokenError::MissingSecret);
        }
        Ok(Self {
            secret: secret.as_bytes().to_vec(),
            clock: Arc::new(SystemClock),
        })
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn issue(&self, subject_id: i64, identity_claim: &str) -> Result<String, TokenError> {
        self.issue_with_ttl(subject_id, identity_claim, Duration::days(TOKEN_TTL_DAYS))
    }

    pub fn issue_with_ttl(
        &self,
        subject_id: i64,
        identity_claim: &str,
        ttl: Duration,
    ) -> Result<String, TokenError> {
        let expires_at = self
            .clock
            .now_utc()
            .checked_add_signed(ttl)
            .ok_or(TokenError::InvalidClaims)?;
        let claims = ActionClaims {
            subject_id,
            identity_claim: identity_claim.to_string(),
            expires_at: expires_at.timestamp_millis(),
        };
        if !claims.has_valid_shape() {
            return Err(TokenError::InvalidClaims);
        }

        let json = serde_json::to_vec(&claims).map_err(|_| TokenError::InvalidClaims)?;
        let payload = URL_SAFE_NO_PAD.encode(json);
        let signature = self.sign(&payload)?;
        Ok(format!("{payload}.{signature}"))
    }

    pub fn verify(&self, token: &str) -> Result<ActionClaims, TokenError> {
        let mut segments = token.split('.');
        let (payload, signature) = match (segments.next(), segments.next(), segments.next()) {
            (Some(p), Some(s), None) if !p.is_empty() && !s.is_empty() => (p, s),
            _ => return Err(TokenError::Malformed),
        };

        let expected = self.sign(payload)?;
        if !bool::from(expected.as_bytes().ct_eq(signature.as_bytes())) {
            return Err(TokenError::TamperDetected);
        }

        let json = URL_SAFE_NO_PAD
            .decode(payload)
            .map_err(|_| TokenError::Malformed)?;
        let claims: ActionClaims =
            serde_json::from_slice(&json).map_err(|_| TokenError::InvalidClaims)?;

        if self.clock.now_utc().timestamp_millis() >= claims.expires_at {
            return Err(TokenError::Expired);
        }
        if !claims.has_valid_shape() {
            return Err(TokenError::InvalidClaims);
        }

        Ok(claims)
    }

    /// True when the token is unusable or has under a week left.
    pub fn is_near_expiry(&self, token: &str) -> bool {
        match self.verify(token) {
            Ok(claims) => {
                let left = claims.expires_at - self.clock.now_utc().timestamp_millis();
                left < Duration::days(NEAR_EXPIRY_DAYS).num_milliseconds()
            }
            Err(_) => true,
        }
    }

    fn sign(&self, payload: &str) -> Result<String, TokenError> {
        let mut mac =
            HmacSha256::new_from_slice(&self.secret).map_err(|_| TokenError::MissingSecret)?;
        mac.update(payload.as_bytes());
        Ok(URL_SAFE_NO_PAD.encode(mac.finalize().into_bytes()))
    }
}
