//! HS256 bearer tokens: verification for connection admission and history
//! reads, plus a signer for the `token` CLI command and tests.

use std::time::Duration;

use axum::http::header::AUTHORIZATION;
use axum::http::HeaderMap;
use chatline_core::{AuthError, IdentityVerifier, UserId};
use chrono::Utc;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

/// Claims carried by access tokens. `sub` is the decimal user id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub exp: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iat: Option<i64>,
}

pub struct JwtVerifier {
    key: DecodingKey,
    validation: Validation,
}

impl JwtVerifier {
    pub fn new(secret: &str, leeway: Duration) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = leeway.as_secs();
        validation.set_required_spec_claims(&["exp", "sub"]);
        Self {
            key: DecodingKey::from_secret(secret.as_bytes()),
            validation,
        }
    }
}

impl IdentityVerifier for JwtVerifier {
    fn verify_identity(&self, credential: &str) -> Result<UserId, AuthError> {
        if credential.is_empty() {
            return Err(AuthError::MissingCredential);
        }
        let data = jsonwebtoken::decode::<Claims>(credential, &self.key, &self.validation)
            .map_err(|e| AuthError::InvalidToken(e.to_string()))?;
        data.claims
            .sub
            .parse::<UserId>()
            .map_err(|_| AuthError::InvalidSubject(data.claims.sub))
    }
}

/// Signs access tokens with the shared secret.
pub struct JwtIssuer {
    key: EncodingKey,
    ttl: Duration,
}

impl JwtIssuer {
    pub fn new(secret: &str, ttl: Duration) -> Self {
        Self {
            key: EncodingKey::from_secret(secret.as_bytes()),
            ttl,
        }
    }

    pub fn issue(&self, user_id: UserId) -> Result<String, jsonwebtoken::errors::Error> {
        let now = Utc::now().timestamp();
        let ttl = i64::try_from(self.ttl.as_secs()).unwrap_or(i64::MAX);
        let claims = Claims {
            sub: user_id.to_string(),
            exp: now.saturating_add(ttl),
            iat: Some(now),
        };
        jsonwebtoken::encode(&Header::new(Algorithm::HS256), &claims, &self.key)
    }
}

/// Verify `credential` and, when `requested` is given, require that the
/// token subject is that user.
pub fn authorize(
    verifier: &dyn IdentityVerifier,
    credential: Option<&str>,
    requested: Option<UserId>,
) -> Result<UserId, AuthError> {
    let credential = credential
        .map(str::trim)
        .filter(|c| !c.is_empty())
        .ok_or(AuthError::MissingCredential)?;
    let user_id = verifier.verify_identity(credential)?;
    match requested {
        Some(requested) if requested != user_id => Err(AuthError::SubjectMismatch {
            token: user_id.to_string(),
            requested: requested.to_string(),
        }),
        _ => Ok(user_id),
    }
}

/// Token from an `Authorization: Bearer <token>` header.
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.split_once(' ')?;
    scheme.eq_ignore_ascii_case("bearer").then_some(token.trim())
}
