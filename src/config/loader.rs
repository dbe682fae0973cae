//! Configuration loader with layered sources
//!
//! Loads configuration from multiple sources with the following precedence
//! (highest to lowest):
//! 1. Conventional environment variables (GRAPH_TOKEN, DATABASE_URL)
//! 2. Environment variables (AGENT_RBAC__*)
//! 3. Configuration file (TOML)
//! 4. Default values

use crate::config::types::{AppConfig, StorageBackend};
use crate::error::ConfigError;
use config::{Config, Environment, File, FileFormat};
use std::path::Path;

/// Default configuration file paths to check (in order)
const DEFAULT_CONFIG_PATHS: &[&str] = &[
    "agent-rbac.toml",
    ".agent-rbac.toml",
    "~/.config/agent-rbac/config.toml",
    "/etc/agent-rbac/config.toml",
];

/// Load configuration from a TOML string (useful for testing)
pub fn load_config_from_str(toml_str: &str) -> Result<AppConfig, ConfigError> {
    let config = Config::builder()
        .add_source(File::from_str(toml_str, FileFormat::Toml))
        .build()
        .map_err(|e| ConfigError::Load(e.to_string()))?;

    let app_config: AppConfig = config
        .try_deserialize()
        .map_err(|e| ConfigError::Load(e.to_string()))?;

    validate_config(&app_config)?;

    Ok(app_config)
}

/// Load configuration from files and environment
pub fn load_config(config_path: Option<&str>) -> Result<AppConfig, ConfigError> {
    // A missing .env file is the normal case
    let _ = dotenvy::dotenv();

    let mut builder = Config::builder();

    if let Some(path) = config_path {
        // Explicit path provided - must exist
        if !Path::new(path).exists() {
            return Err(ConfigError::Load(format!(
                "Configuration file not found: {}",
                path
            )));
        }
        builder = builder.add_source(File::new(path, FileFormat::Toml));
    } else {
        // Try default paths (first existing one wins)
        for path in DEFAULT_CONFIG_PATHS {
            let expanded = shellexpand::tilde(path);
            if Path::new(expanded.as_ref()).exists() {
                builder = builder.add_source(File::new(&expanded, FileFormat::Toml));
                break;
            }
        }
    }

    // e.g., AGENT_RBAC__GRAPH__URL, AGENT_RBAC__RBAC__ADMIN_GROUP_IDS=a,b
    // Double underscore (__) maps to nested keys (graph.url)
    builder = builder.add_source(
        Environment::with_prefix("AGENT_RBAC")
            .prefix_separator("__")
            .separator("__")
            .list_separator(",")
            .with_list_parse_key("rbac.admin_group_ids")
            .try_parsing(true),
    );

    // Conventional names apply only when the prefixed variable is unset
    if let Ok(token) = std::env::var("GRAPH_TOKEN")
        && !token.is_empty()
        && std::env::var_os("AGENT_RBAC__GRAPH__TOKEN").is_none()
    {
        builder = builder
            .set_override("graph.token", token)
            .map_err(|e| ConfigError::Load(e.to_string()))?;
    }

    if let Ok(url) = std::env::var("DATABASE_URL")
        && !url.is_empty()
        && std::env::var_os("AGENT_RBAC__STORAGE__DATABASE_URL").is_none()
    {
        builder = builder
            .set_override("storage.database_url", url)
            .map_err(|e| ConfigError::Load(e.to_string()))?;
    }

    let config = builder
        .build()
        .map_err(|e| ConfigError::Load(e.to_string()))?;

    let app_config: AppConfig = config
        .try_deserialize()
        .map_err(|e| ConfigError::Load(e.to_string()))?;

    validate_config(&app_config)?;

    Ok(app_config)
}

/// Validate configuration values
pub(crate) fn validate_config(config: &AppConfig) -> Result<(), ConfigError> {
    if config.graph.url.is_empty() {
        return Err(ConfigError::Missing {
            field: "graph.url".to_string(),
        });
    }

    if !config.graph.url.starts_with("http://") && !config.graph.url.starts_with("https://") {
        return Err(ConfigError::Invalid {
            message: format!(
                "graph.url must start with http:// or https://, got: {}",
                config.graph.url
            ),
        });
    }

    if config.graph.timeout_secs == 0 {
        return Err(ConfigError::Invalid {
            message: "graph.timeout_secs must be greater than 0".to_string(),
        });
    }

    if config.storage.backend == StorageBackend::Postgres && config.storage.database_url.is_none()
    {
        return Err(ConfigError::Missing {
            field: "storage.database_url (set DATABASE_URL environment variable)".to_string(),
        });
    }

    if config.server.enabled && config.server.port == 0 {
        return Err(ConfigError::Invalid {
            message: "server.port must be greater than 0".to_string(),
        });
    }

    if config.jobs.max_attempts == 0 {
        return Err(ConfigError::Invalid {
            message: "jobs.max_attempts must be at least 1".to_string(),
        });
    }

    if let Some(blank) = config
        .rbac
        .admin_group_ids
        .iter()
        .position(|id| id.trim().is_empty())
    {
        return Err(ConfigError::Invalid {
            message: format!("rbac.admin_group_ids[{}] is empty", blank),
        });
    }

    let mut seen = std::collections::HashSet::new();
    for agent in &config.agents {
        if agent.name.trim().is_empty() {
            return Err(ConfigError::Invalid {
                message: "agents entries must have a name".to_string(),
            });
        }
        if !seen.insert(agent.name.as_str()) {
            return Err(ConfigError::Invalid {
                message: format!("duplicate agent name: {}", agent.name),
            });
        }
    }

    Ok(())
}
