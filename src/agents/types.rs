//! Agent directory types
//!
//! `AgentRecord` is the raw catalog shape (configuration, database rows).
//! `AgentRef` is what the rest of the crate sees: icons already classified,
//! status already parsed.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Agent lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentStatus {
    Active,
    Draft,
    Inactive,
}

impl AgentStatus {
    /// Case-insensitive parse; unknown values are treated as inactive
    pub fn parse(s: &str) -> Self {
        match s.trim().to_ascii_lowercase().as_str() {
            "active" => AgentStatus::Active,
            "draft" => AgentStatus::Draft,
            _ => AgentStatus::Inactive,
        }
    }

    pub const fn as_str(&self) -> &'static str {
        match self {
            AgentStatus::Active => "active",
            AgentStatus::Draft => "draft",
            AgentStatus::Inactive => "inactive",
        }
    }
}

impl fmt::Display for AgentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Which access tier governs an agent
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentKind {
    /// Visible through Azure AD group intersection
    #[default]
    Enterprise,
    /// Visible through the direct grant table
    User,
}

/// Icon reference, classified once at the directory boundary
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum IconRef {
    /// Plain URL
    Url(String),
    /// Stored attachment id
    Attachment(Uuid),
}

impl IconRef {
    /// Classify a raw icon string. Empty input yields `None`.
    pub fn parse(raw: &str) -> Option<Self> {
        let raw = raw.trim();
        if raw.is_empty() {
            return None;
        }
        match Uuid::parse_str(raw) {
            Ok(id) => Some(IconRef::Attachment(id)),
            Err(_) => Some(IconRef::Url(raw.to_string())),
        }
    }
}

/// Raw agent catalog entry
#[derive(Debug, Clone, Deserialize)]
pub struct AgentRecord {
    pub name: String,
    #[serde(default)]
    pub public_id: Option<Uuid>,
    #[serde(default = "default_true")]
    pub is_enabled: bool,
    #[serde(default)]
    pub is_deleted: bool,
    /// Missing status is treated as active
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub kind: AgentKind,
    #[serde(default)]
    pub icon: Option<String>,
}

fn default_true() -> bool {
    true
}

/// An agent as seen by the access engine
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AgentRef {
    pub name: String,
    pub public_id: Uuid,
    pub is_enabled: bool,
    pub is_deleted: bool,
    pub status: AgentStatus,
    pub kind: AgentKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub icon: Option<IconRef>,
}

impl AgentRef {
    /// Enabled, not soft-deleted and active
    pub fn is_listable(&self) -> bool {
        self.is_enabled && !self.is_deleted && self.status == AgentStatus::Active
    }
}

impl From<AgentRecord> for AgentRef {
    fn from(record: AgentRecord) -> Self {
        let status = record
            .status
            .as_deref()
            .map(AgentStatus::parse)
            .unwrap_or(AgentStatus::Active);

        Self {
            // Deterministic id for catalog entries that omit one
            public_id: record
                .public_id
                .unwrap_or_else(|| Uuid::new_v5(&Uuid::NAMESPACE_OID, record.name.as_bytes())),
            icon: record.icon.as_deref().and_then(IconRef::parse),
            name: record.name,
            is_enabled: record.is_enabled,
            is_deleted: record.is_deleted,
            status,
            kind: record.kind,
        }
    }
}
