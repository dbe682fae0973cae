//! Secret string type for bearer tokens.

use serde::Deserialize;
use std::fmt;

/// A token that never shows up in `Debug` or `Display` output.
///
/// Access tokens pass through login handling and `#[instrument]`ed calls;
/// wrapping them keeps them out of span fields and log lines. The value is
/// only reachable through [`SecretString::expose_secret`].
#[derive(Clone)]
pub struct SecretString(String);

impl SecretString {
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    #[inline]
    pub fn expose_secret(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl From<String> for SecretString {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for SecretString {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl fmt::Debug for SecretString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[REDACTED]")
    }
}

impl fmt::Display for SecretString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[REDACTED]")
    }
}

impl Drop for SecretString {
    fn drop(&mut self) {
        // Best effort only; copies made by the allocator are not cleared
        self.0.clear();
    }
}

impl<'de> Deserialize<'de> for SecretString {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        String::deserialize(deserializer).map(SecretString::new)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_debug_and_display_redacted() {
        let secret = SecretString::new("eyJhbGciOi");
        assert_eq!(format!("{:?}", secret), "[REDACTED]");
        assert_eq!(format!("{}", secret), "[REDACTED]");
    }

    #[test]
    fn test_expose_secret() {
        let secret = SecretString::from("eyJhbGciOi");
        assert_eq!(secret.expose_secret(), "eyJhbGciOi");
        assert!(!secret.is_empty());
        assert!(SecretString::from(" ").is_empty());
    }

    #[test]
    fn test_deserialize() {
        let secret: SecretString = serde_json::from_str(r#""token""#).unwrap();
        assert_eq!(secret.expose_secret(), "token");
    }
}
