//! Configuration types for agent-rbac
//!
//! This module defines the configuration structure that can be loaded from
//! TOML files and/or environment variables.

use crate::agents::AgentRecord;
use serde::Deserialize;

/// Root configuration structure
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Admin API settings
    pub server: ServerConfig,

    /// Microsoft Graph connection settings
    pub graph: GraphConfig,

    /// Pivot store backend
    pub storage: StorageConfig,

    /// Access control policy
    pub rbac: RbacConfig,

    /// Background job settings
    pub jobs: JobsConfig,

    /// Logging configuration
    pub logging: LoggingConfig,

    /// Static agent catalog
    pub agents: Vec<AgentRecord>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            graph: GraphConfig::default(),
            storage: StorageConfig::default(),
            rbac: RbacConfig::default(),
            jobs: JobsConfig::default(),
            logging: LoggingConfig::default(),
            agents: Vec::new(),
        }
    }
}

/// Admin API configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Enable the admin API
    pub enabled: bool,

    /// Bind host
    pub host: String,

    /// Bind port
    pub port: u16,

    /// Bearer token required by the admin routes (prefer env var
    /// AGENT_RBAC__SERVER__ADMIN_TOKEN). Admin routes reject every request
    /// when unset.
    #[serde(default)]
    pub admin_token: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            host: "127.0.0.1".to_string(),
            port: 18420,
            admin_token: None,
        }
    }
}

/// Microsoft Graph connection configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GraphConfig {
    /// Graph base URL including the API version
    pub url: String,

    /// Application token used for group lookups (prefer env var GRAPH_TOKEN)
    #[serde(default)]
    pub token: Option<String>,

    /// Request timeout in seconds
    pub timeout_secs: u64,

    /// Maximum retries for throttled or failed requests
    pub max_retries: u32,

    /// Base delay for exponential backoff, in milliseconds
    pub retry_base_delay_ms: u64,
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            url: "https://graph.microsoft.com/v1.0".to_string(),
            token: None,
            timeout_secs: 30,
            max_retries: 3,
            retry_base_delay_ms: 1000,
        }
    }
}

impl GraphConfig {
    /// Base URL without a trailing slash
    pub fn base_url(&self) -> String {
        self.url.trim_end_matches('/').to_string()
    }
}

/// Pivot store configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Storage backend
    pub backend: StorageBackend,

    /// PostgreSQL connection URL (prefer env var DATABASE_URL)
    #[serde(default)]
    pub database_url: Option<String>,

    /// Maximum pooled connections
    pub max_connections: u32,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::Memory,
            database_url: None,
            max_connections: 5,
        }
    }
}

/// Storage backend selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    /// Process-local tables (tests, development)
    #[default]
    Memory,
    /// PostgreSQL tables
    Postgres,
}

/// Access control policy configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RbacConfig {
    /// Azure AD group ids whose members are administrators
    #[serde(default)]
    pub admin_group_ids: Vec<String>,

    /// A user counts as active in statistics when their groups were synced
    /// within this many days
    pub active_user_days: u32,
}

impl Default for RbacConfig {
    fn default() -> Self {
        Self {
            admin_group_ids: Vec::new(),
            active_user_days: 30,
        }
    }
}

/// Background job configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct JobsConfig {
    /// Queue capacity before submissions are rejected
    pub capacity: usize,

    /// Attempts per job, including the first
    pub max_attempts: u32,

    /// Base delay between attempts, in milliseconds
    pub retry_base_delay_ms: u64,
}

impl Default for JobsConfig {
    fn default() -> Self {
        Self {
            capacity: 256,
            max_attempts: 3,
            retry_base_delay_ms: 500,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,

    /// Output format (pretty, json)
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Pretty,
        }
    }
}

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable output
    #[default]
    Pretty,
    /// JSON structured output
    Json,
}
