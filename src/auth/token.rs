//! Static bearer token authentication
//!
//! A pre-issued application token, typically injected through `GRAPH_TOKEN`.

use crate::auth::provider::AuthProvider;
use crate::error::AuthError;
use crate::util::SecretString;
use async_trait::async_trait;

/// Static bearer token provider
#[derive(Debug, Clone)]
pub struct StaticTokenProvider {
    token: SecretString,
}

impl StaticTokenProvider {
    /// Create a new static token provider
    pub fn new(token: impl Into<String>) -> Result<Self, AuthError> {
        let token = token.into();

        if token.trim().is_empty() {
            return Err(AuthError::InvalidToken);
        }

        Ok(Self {
            token: SecretString::new(token),
        })
    }

    /// Create from the GRAPH_TOKEN environment variable
    pub fn from_env() -> Result<Self, AuthError> {
        match std::env::var("GRAPH_TOKEN") {
            Ok(token) if !token.is_empty() => Self::new(token),
            _ => Err(AuthError::NotConfigured),
        }
    }
}

#[async_trait]
impl AuthProvider for StaticTokenProvider {
    async fn bearer_token(&self) -> Result<SecretString, AuthError> {
        Ok(self.token.clone())
    }

    fn needs_refresh(&self) -> bool {
        false
    }

    fn auth_type(&self) -> &'static str {
        "Static bearer token"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::provider::bearer_header;

    #[test]
    fn test_static_provider_new() {
        let provider = StaticTokenProvider::new("eyJ0eXAi").unwrap();
        assert_eq!(provider.token.expose_secret(), "eyJ0eXAi");
    }

    #[test]
    fn test_static_provider_empty_token() {
        let result = StaticTokenProvider::new("  ");
        assert!(matches!(result.unwrap_err(), AuthError::InvalidToken));
    }

    #[tokio::test]
    async fn test_bearer_header() {
        let provider = StaticTokenProvider::new("test-token").unwrap();
        let token = provider.bearer_token().await.unwrap();
        assert_eq!(bearer_header(&token), "Bearer test-token");
        assert!(!provider.needs_refresh());
    }

    #[test]
    fn test_debug_does_not_leak_token() {
        let provider = StaticTokenProvider::new("super-secret").unwrap();
        assert!(!format!("{:?}", provider).contains("super-secret"));
    }
}
