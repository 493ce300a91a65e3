//! Agent credential checks.

use axum::http::{header, HeaderMap};

/// Decides whether a presented credential is acceptable.
pub trait TokenVerifier: Send + Sync {
    fn verify(&self, credential: Option<&str>) -> bool;
}

/// Accepts exactly one shared secret.
pub struct SecretToken {
    token: String,
}

impl SecretToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self { token: token.into() }
    }
}

impl TokenVerifier for SecretToken {
    fn verify(&self, credential: Option<&str>) -> bool {
        credential.is_some_and(|c| c == self.token)
    }
}

/// Token from an `Authorization: Bearer <token>` header.
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.split_once(' ')?;
    if scheme.eq_ignore_ascii_case("bearer") {
        Some(token.trim())
    } else {
        None
    }
}
