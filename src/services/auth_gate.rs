//! HTTP Basic authentication against the startup credential table.

use crate::models::credentials::Credentials;
use base64::{Engine as _, engine::general_purpose};
use subtle::{Choice, ConstantTimeEq};

/// Realm advertised in the `WWW-Authenticate` challenge.
pub const CHALLENGE: &str = "Basic realm=\"Please log in\"";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Allowed,
    Denied,
}

#[derive(Debug, Clone, Default)]
pub struct AuthGate {
    credentials: Option<Credentials>,
}

impl AuthGate {
    pub fn new(credentials: Option<Credentials>) -> Self {
        Self { credentials }
    }

    pub fn is_enabled(&self) -> bool {
        self.credentials.is_some()
    }

    /// Configured usernames, sorted; empty when authentication is disabled.
    pub fn users(&self) -> Vec<&str> {
        self.credentials
            .as_ref()
            .map(Credentials::usernames)
            .unwrap_or_default()
    }

    /// Check the raw `Authorization` header value.
    pub fn authenticate(&self, authorization: Option<&str>) -> Verdict {
        let Some(credentials) = &self.credentials else {
            return Verdict::Allowed;
        };
        let Some((user, password)) = authorization.and_then(parse_basic) else {
            return Verdict::Denied;
        };

        let (expected, known) = expected_secret(credentials, &user);
        let matches = expected.ct_eq(password.as_bytes()) & known;
        if bool::from(matches) {
            Verdict::Allowed
        } else {
            Verdict::Denied
        }
    }
}

/// Stored password for `user`, or an empty placeholder for unknown users.
///
/// Unknown users still go through the same comparison as known ones; the
/// returned `Choice` keeps an empty password from matching the placeholder.
fn expected_secret<'a>(credentials: &'a Credentials, user: &str) -> (&'a [u8], Choice) {
    match credentials.password(user) {
        Some(password) => (password.as_bytes(), Choice::from(1)),
        None => (b"".as_slice(), Choice::from(0)),
    }
}

/// Decode `Basic base64(user:pass)`. The scheme name is case-insensitive.
fn parse_basic(header: &str) -> Option<(String, String)> {
    let (scheme, encoded) = header.trim().split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("basic") {
        return None;
    }
    let decoded = general_purpose::STANDARD.decode(encoded.trim()).ok()?;
    let decoded = String::from_utf8(decoded).ok()?;
    let (user, password) = decoded.split_once(':')?;
    Some((user.to_string(), password.to_string()))
}
