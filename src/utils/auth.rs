//! Bearer-token authentication for protected A2A endpoints.
//!
//! A token is accepted if it equals the shared API key, or if it decodes as
//! a valid HS256 JWT signed with the shared secret. There is no session
//! store and no RBAC: every protected endpoint in this system is either
//! reachable or not, there is nothing more granular to authorize.

use crate::utils::error::{WatchError, WatchResult};
use chrono::Utc;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

/// Minimal JWT claims accepted by this system.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub exp: usize,
    pub iat: usize,
}

/// Validates bearer tokens against the shared API key and JWT secret.
pub struct AuthManager {
    api_key: String,
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
}

impl AuthManager {
    #[must_use]
    pub fn new(api_key: String, jwt_secret: &str) -> Self {
        Self {
            api_key,
            encoding_key: EncodingKey::from_secret(jwt_secret.as_ref()),
            decoding_key: DecodingKey::from_secret(jwt_secret.as_ref()),
        }
    }

    /// Validate a bearer token. Missing-header handling is the caller's
    /// responsibility (401); this only distinguishes valid from invalid
    /// (403).
    pub fn validate_token(&self, token: &str) -> WatchResult<()> {
        if token == self.api_key {
            return Ok(());
        }
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = true;
        decode::<Claims>(token, &self.decoding_key, &validation)
            .map(|_| ())
            .map_err(|e| WatchError::Auth {
                reason: format!("invalid token: {e}"),
            })
    }

    /// Issue a short-lived JWT for the given subject, primarily used by
    /// tests and by the `migrate`/`run-cycle` CLI to mint service tokens.
    pub fn issue_token(&self, subject: &str, ttl_secs: i64) -> WatchResult<String> {
        let now = Utc::now();
        let claims = Claims {
            sub: subject.to_string(),
            iat: now.timestamp() as usize,
            exp: (now.timestamp() + ttl_secs) as usize,
        };
        encode(&Header::default(), &claims, &self.encoding_key).map_err(|e| WatchError::Auth {
            reason: format!("failed to issue token: {e}"),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manager() -> AuthManager {
        AuthManager::new("shared-key".to_string(), "jwt-secret")
    }

    #[test]
    fn accepts_shared_api_key() {
        assert!(manager().validate_token("shared-key").is_ok());
    }

    #[test]
    fn accepts_valid_jwt() {
        let m = manager();
        let token = m.issue_token("retrieval-agent", 3600).unwrap();
        assert!(m.validate_token(&token).is_ok());
    }

    #[test]
    fn rejects_garbage_token() {
        assert!(manager().validate_token("not-a-token").is_err());
    }

    #[test]
    fn rejects_expired_jwt() {
        let m = manager();
        let token = m.issue_token("retrieval-agent", -10).unwrap();
        assert!(m.validate_token(&token).is_err());
    }
}
