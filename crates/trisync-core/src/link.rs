//! Signed, time-limited resolution links
//!
//! Conflict notifications carry a token that lets the administrator open
//! the conflict without a separate login step. Tokens are HS256-signed,
//! bound to one conflict id and one admin identity, and expire 24 hours
//! after issuance.

use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{Error, Result};

const SUBJECT: &str = "conflict-view";

#[derive(Debug, Serialize, Deserialize)]
struct Claims {
    iss: String,
    sub: String,
    jti: String,
    iat: i64,
    exp: i64,
    conflict_id: i64,
    admin: String,
}

/// Issues and verifies the tokens embedded in resolution links
pub struct ResolutionLinkSigner {
    issuer: String,
    ttl: Duration,
    encoding: EncodingKey,
    decoding: DecodingKey,
}

impl ResolutionLinkSigner {
    #[must_use]
    pub fn new(secret: &str, issuer: impl Into<String>) -> Self {
        Self {
            issuer: issuer.into(),
            ttl: Duration::hours(24),
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
        }
    }

    /// Sign a link token for one conflict, addressed to one admin
    pub fn generate(&self, conflict_id: i64, admin: &str) -> Result<String> {
        let now = Utc::now();
        let claims = Claims {
            iss: self.issuer.clone(),
            sub: SUBJECT.to_string(),
            jti: Uuid::now_v7().to_string(),
            iat: now.timestamp(),
            exp: (now + self.ttl).timestamp(),
            conflict_id,
            admin: admin.to_string(),
        };
        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)
            .map_err(|e| Error::Token(e.to_string()))
    }

    /// Verify a link token and return `(conflict_id, admin)`
    pub fn parse(&self, token: &str) -> Result<(i64, String)> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_issuer(&[&self.issuer]);
        validation.sub = Some(SUBJECT.to_string());
        let data = decode::<Claims>(token, &self.decoding, &validation)
            .map_err(|e| Error::Token(e.to_string()))?;
        Ok((data.claims.conflict_id, data.claims.admin))
    }

    #[cfg(test)]
    fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }
}
