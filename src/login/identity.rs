//! Signed-in user identity

use crate::directory::CallerProfile;
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Which claim the pivot key came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IdentitySource {
    Email,
    Username,
}

/// Identity claims of a signed-in user
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserIdentity {
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub username: Option<String>,
}

impl UserIdentity {
    pub fn from_email(email: impl Into<String>) -> Self {
        Self {
            email: Some(email.into()),
            username: None,
        }
    }

    /// Key used for the user pivot: email, else username (logged)
    pub fn canonical_key(&self) -> Option<(&str, IdentitySource)> {
        if let Some(email) = non_blank(&self.email) {
            return Some((email, IdentitySource::Email));
        }
        let username = non_blank(&self.username)?;
        warn!(username, "User has no email claim, keying groups by username");
        Some((username, IdentitySource::Username))
    }
}

impl From<CallerProfile> for UserIdentity {
    fn from(profile: CallerProfile) -> Self {
        Self {
            email: profile.mail,
            username: profile.user_principal_name,
        }
    }
}

fn non_blank(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|s| !s.is_empty())
}
