//! Authentication collaborator
//!
//! The hub trusts whatever identity the authenticator returns.
//! `JwtAuthenticator` issues stateless HS256 tokens carrying the username and
//! an expiry; nothing is stored per token.

use std::time::Duration;

use chrono::Utc;
use jsonwebtoken::{
    decode, encode, errors::ErrorKind, Algorithm, DecodingKey, EncodingKey, Header, Validation,
};
use serde::{Deserialize, Serialize};

use crate::error::AuthError;
use crate::types::Username;

/// Token issuance and verification
pub trait Authenticator: Send + Sync {
    fn issue_token(&self, username: &str) -> Result<String, AuthError>;

    fn verify_token(&self, token: &str) -> Result<Username, AuthError>;
}

/// The claims of a session token
#[derive(Debug, Serialize, Deserialize)]
struct Claims {
    username: String,
    iat: i64,
    exp: i64,
}

impl Claims {
    fn new(username: &Username, ttl: Duration) -> Self {
        let now = Utc::now().timestamp();
        let ttl = i64::try_from(ttl.as_secs()).unwrap_or(i64::MAX);
        Self {
            username: username.to_string(),
            iat: now,
            exp: now.saturating_add(ttl),
        }
    }
}

/// Signs and verifies session tokens with a shared secret
pub struct JwtAuthenticator {
    encoding: EncodingKey,
    decoding: DecodingKey,
    validation: Validation,
    ttl: Duration,
}

impl JwtAuthenticator {
    pub fn new(secret: &[u8], ttl: Duration) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        // Expiry is exact; a token is dead the second its `exp` passes.
        validation.leeway = 0;
        Self {
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
            validation,
            ttl,
        }
    }

    fn sign(&self, claims: &Claims) -> Result<String, AuthError> {
        encode(&Header::new(Algorithm::HS256), claims, &self.encoding)
            .map_err(|e| AuthError::Signing(e.to_string()))
    }
}

impl Authenticator for JwtAuthenticator {
    fn issue_token(&self, username: &str) -> Result<String, AuthError> {
        let username = Username::parse(username)?;
        self.sign(&Claims::new(&username, self.ttl))
    }

    fn verify_token(&self, token: &str) -> Result<Username, AuthError> {
        let data = decode::<Claims>(token, &self.decoding, &self.validation).map_err(|e| {
            match e.into_kind() {
                ErrorKind::ExpiredSignature => AuthError::Expired,
                _ => AuthError::InvalidToken,
            }
        })?;
        Username::parse(data.claims.username).map_err(|_| AuthError::InvalidToken)
    }
}
