//! Organizer credential handling
//!
//! Event passwords are never stored in clear: the event keeps a SHA-256
//! digest and presented passwords are hashed and compared in constant time.

use axum::http::{header, HeaderMap};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Header carrying the organizer password for clients that do not use Basic auth
pub const ORGANIZER_PASSWORD_HEADER: &str = "x-organizer-password";

/// Hashed organizer password attached to an event
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OrganizerCredential(String);

impl OrganizerCredential {
    /// Derive the stored credential from the organizer's password
    pub fn from_password(password: &str) -> Self {
        Self(digest(password))
    }

    /// Check a presented password against this credential
    pub fn verify(&self, presented: &str) -> bool {
        constant_time_eq(self.0.as_bytes(), digest(presented).as_bytes())
    }
}

impl std::fmt::Debug for OrganizerCredential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("OrganizerCredential(..)")
    }
}

fn digest(password: &str) -> String {
    hex::encode(Sha256::digest(password.as_bytes()))
}

/// Constant-time byte comparison to prevent timing attacks
fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut result = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        result |= x ^ y;
    }
    result == 0
}

/// Pull the organizer password out of a request.
///
/// Accepts HTTP Basic auth (the username is ignored) or the
/// `X-Organizer-Password` header.
pub fn presented_password(headers: &HeaderMap) -> Option<String> {
    if let Some(password) = headers
        .get(ORGANIZER_PASSWORD_HEADER)
        .and_then(|v| v.to_str().ok())
    {
        return Some(password.to_string());
    }

    let auth_str = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let credentials = auth_str.strip_prefix("Basic ")?;
    let decoded = STANDARD.decode(credentials.trim()).ok()?;
    let decoded_str = String::from_utf8(decoded).ok()?;
    let (_username, password) = decoded_str.split_once(':')?;
    Some(password.to_string())
}
