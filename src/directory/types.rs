//! Microsoft Graph response types

use serde::{Deserialize, Serialize};

/// A directory group as returned by `GET /groups/{id}`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupInfo {
    pub id: String,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub mail: Option<String>,
}

impl GroupInfo {
    /// Preferred human-readable label: display name, then mail
    pub fn label(&self) -> Option<&str> {
        self.display_name
            .as_deref()
            .filter(|s| !s.trim().is_empty())
            .or_else(|| self.mail.as_deref().filter(|s| !s.trim().is_empty()))
    }
}

/// The signed-in user as returned by `GET /me`
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallerProfile {
    #[serde(default)]
    pub mail: Option<String>,
    #[serde(default)]
    pub user_principal_name: Option<String>,
}

/// One page of a directory object collection
#[derive(Debug, Clone, Deserialize)]
pub struct DirectoryPage {
    #[serde(default)]
    pub value: Vec<DirectoryObject>,
    #[serde(rename = "@odata.nextLink", default)]
    pub next_link: Option<String>,
}

/// Minimal directory object (`$select=id`)
#[derive(Debug, Clone, Deserialize)]
pub struct DirectoryObject {
    #[serde(default)]
    pub id: Option<String>,
}
