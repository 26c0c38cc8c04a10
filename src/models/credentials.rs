//! Basic-Auth user table loaded once at startup.

use std::{collections::HashMap, fmt};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CredentialsError {
    #[error("malformed credential pair `{0}`, expected 'user:pass user2:pass2...'")]
    MalformedPair(String),
}

/// Username → password mapping. Immutable once parsed; share it behind an `Arc`.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Credentials {
    users: HashMap<String, String>,
}

impl Credentials {
    /// Parse a whitespace-separated list of `user:pass` pairs.
    ///
    /// The password is everything after the first `:`, so it may itself
    /// contain colons. A pair without a separator fails the whole parse.
    /// Returns `Ok(None)` for an empty or blank input, which disables auth.
    pub fn parse(raw: &str) -> Result<Option<Self>, CredentialsError> {
        let mut users = HashMap::new();
        for pair in raw.split_whitespace() {
            let (user, pass) = pair
                .split_once(':')
                .ok_or_else(|| CredentialsError::MalformedPair(pair.to_string()))?;
            users.insert(user.to_string(), pass.to_string());
        }

        if users.is_empty() {
            return Ok(None);
        }
        Ok(Some(Self { users }))
    }

    pub fn password(&self, user: &str) -> Option<&str> {
        self.users.get(user).map(String::as_str)
    }

    /// Sorted usernames, for startup logging.
    pub fn usernames(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.users.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("users", &self.usernames())
            .field("passwords", &"[REDACTED]")
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_space_separated_pairs() {
        let creds = Credentials::parse("alice:secret bob:hunter2").unwrap().unwrap();
        assert_eq!(creds.usernames().len(), 2);
        assert_eq!(creds.password("alice"), Some("secret"));
        assert_eq!(creds.password("bob"), Some("hunter2"));
        assert_eq!(creds.password("carol"), None);
    }

    #[test]
    fn password_keeps_everything_after_first_colon() {
        let creds = Credentials::parse("svc:a:b:c").unwrap().unwrap();
        assert_eq!(creds.password("svc"), Some("a:b:c"));
    }

    #[test]
    fn tolerates_repeated_whitespace() {
        let creds = Credentials::parse("  alice:secret   bob:x \n").unwrap().unwrap();
        assert_eq!(creds.usernames(), vec!["alice", "bob"]);
    }

    #[test]
    fn blank_input_disables_auth() {
        assert_eq!(Credentials::parse("").unwrap(), None);
        assert_eq!(Credentials::parse("   ").unwrap(), None);
    }

    #[test]
    fn pair_without_separator_is_rejected() {
        let err = Credentials::parse("alice:secret bob").unwrap_err();
        assert_eq!(err, CredentialsError::MalformedPair("bob".into()));
    }

    #[test]
    fn debug_output_hides_passwords() {
        let creds = Credentials::parse("alice:topsecret").unwrap().unwrap();
        let rendered = format!("{:?}", creds);
        assert!(rendered.contains("alice"));
        assert!(!rendered.contains("topsecret"));
    }
}
