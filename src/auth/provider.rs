//! Authentication provider trait
//!
//! Supplies the application credential used for directory lookups that are
//! not made on behalf of a signed-in user (group name resolution).

use crate::error::AuthError;
use crate::util::SecretString;
// async_trait required for dyn-compatibility with Arc<dyn AuthProvider>
use async_trait::async_trait;

/// Authentication provider trait
#[async_trait]
pub trait AuthProvider: Send + Sync {
    /// Bearer token for the next Graph request
    async fn bearer_token(&self) -> Result<SecretString, AuthError>;

    /// Check if the credentials need to be refreshed
    ///
    /// Static tokens never do.
    fn needs_refresh(&self) -> bool;

    /// Get a description of the auth method (for logging)
    fn auth_type(&self) -> &'static str;
}

/// Format an `Authorization` header value
pub fn bearer_header(token: &SecretString) -> String {
    format!("Bearer {}", token.expose_secret())
}
