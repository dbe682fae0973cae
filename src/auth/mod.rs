//! Authentication module
//!
//! Provides the application credential for Microsoft Graph lookups.
//! User tokens obtained at login are passed through explicitly and never
//! stored here.

pub mod provider;
pub mod token;

pub use provider::{AuthProvider, bearer_header};
pub use token::StaticTokenProvider;

use crate::config::GraphConfig;
use crate::error::AuthError;
use std::sync::Arc;

/// Create an auth provider from configuration
pub fn create_auth_provider(config: &GraphConfig) -> Result<Arc<dyn AuthProvider>, AuthError> {
    if let Some(token) = &config.token {
        Ok(Arc::new(StaticTokenProvider::new(token.clone())?))
    } else {
        Ok(Arc::new(StaticTokenProvider::from_env()?))
    }
}
