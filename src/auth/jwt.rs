//! JWT issuing and verification for careportal session tokens.

use chrono::Utc;
use jsonwebtoken::{
    decode, encode, errors::ErrorKind, Algorithm, DecodingKey, EncodingKey, Header, Validation,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::auth::models::User;
use crate::errors::{Error, Result};

/// JWT claims carried by a session token. Role and email are snapshots taken
/// at issue time; the middleware re-fetches the live identity and never
/// trusts them for authorization decisions.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Claims {
    /// Subject (user identifier)
    pub sub: String,
    /// Role snapshot at issue time
    pub role: String,
    /// Email snapshot at issue time
    pub email: String,
    /// Issued-at time, whole seconds since epoch
    pub iat: i64,
    /// Expiration time, whole seconds since epoch
    pub exp: i64,
}

/// Token verification failure kinds. The two are deliberately distinct: an
/// expired token prompts a re-login, an invalid one signals a corrupted or
/// forged credential.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum TokenError {
    #[error("token signature or structure is invalid")]
    Invalid,
    #[error("token has expired")]
    Expired,
}

/// Issues and verifies signed session tokens.
pub struct TokenService {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
}

impl TokenService {
    /// Create a new token service with the given signing secret.
    pub fn new(secret: &[u8]) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        // No clock-skew compensation: expiry comparisons use wall-clock time.
        validation.leeway = 0;
        Self {
            encoding_key: EncodingKey::from_secret(secret),
            decoding_key: DecodingKey::from_secret(secret),
            validation,
        }
    }

    /// Issue a signed token for the given user, valid for `ttl_secs`.
    pub fn issue(&self, user: &User, ttl_secs: i64) -> Result<String> {
        let now = Utc::now().timestamp();

        let claims = Claims {
            sub: user.id.to_string(),
            role: user.role.to_string(),
            email: user.email.clone(),
            iat: now,
            exp: now + ttl_secs,
        };

        encode(&Header::default(), &claims, &self.encoding_key)
            .map_err(|e| Error::internal(format!("Failed to sign token: {}", e)))
    }

    /// Verify a token string and return its claims, distinguishing expired
    /// tokens from otherwise invalid ones.
    pub fn verify(&self, token: &str) -> std::result::Result<Claims, TokenError> {
        decode::<Claims>(token, &self.decoding_key, &self.validation)
            .map(|data| data.claims)
            .map_err(|err| match err.kind() {
                ErrorKind::ExpiredSignature => TokenError::Expired,
                _ => TokenError::Invalid,
            })
    }
}
