//! Shared inter-tier authentication secret.

use sha2::{Digest, Sha256};

/// A shared secret compared on every authenticated relay request.
///
/// Loaded once at startup and never mutated. `Debug` never prints the secret.
#[derive(Clone)]
pub struct Credential(String);

impl Credential {
    /// Wrap a secret. Blank secrets are treated as "not configured".
    pub fn new(secret: impl Into<String>) -> Option<Self> {
        let secret = secret.into();
        if secret.trim().is_empty() {
            None
        } else {
            Some(Self(secret))
        }
    }

    /// The raw secret, for attaching to outbound requests.
    pub fn expose(&self) -> &str {
        &self.0
    }

    /// Compare a presented secret without short-circuiting on the first
    /// differing byte. Both sides are hashed first so length is not leaked
    /// either.
    pub fn matches(&self, presented: &str) -> bool {
        let expected = Sha256::digest(self.0.as_bytes());
        let actual = Sha256::digest(presented.as_bytes());

        expected
            .iter()
            .zip(actual.iter())
            .fold(0u8, |acc, (a, b)| acc | (a ^ b))
            == 0
    }
}

impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Credential(<redacted>)")
    }
}
