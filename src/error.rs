//! Error types for agent-rbac
//!
//! This module defines the error hierarchy used throughout the crate.
//! Only write-path storage failures are meant to reach callers; read paths
//! and name resolution degrade to empty or placeholder results instead.

use thiserror::Error;

/// Configuration-related errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to load configuration: {0}")]
    Load(String),

    #[error("Invalid configuration: {message}")]
    Invalid { message: String },

    #[error("Missing required configuration: {field}")]
    Missing { field: String },
}

/// Pivot store failures
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Database error during {operation}: {message}")]
    Database { operation: String, message: String },

    #[error("Constraint violated during {operation}: {message}")]
    Constraint { operation: String, message: String },

    #[error("Connection unavailable: {0}")]
    Unavailable(String),

    #[error("Corrupt row in {table}: {message}")]
    Corrupt { table: String, message: String },
}

impl StorageError {
    /// Map a sqlx error for the named operation
    pub fn from_sqlx(operation: &str, err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::Database(db_err) => {
                let message = db_err.message().to_string();
                match db_err.code().as_deref() {
                    // unique_violation, foreign_key_violation, check_violation
                    Some("23505") | Some("23503") | Some("23514") => StorageError::Constraint {
                        operation: operation.to_string(),
                        message,
                    },
                    _ => StorageError::Database {
                        operation: operation.to_string(),
                        message,
                    },
                }
            }
            sqlx::Error::PoolClosed | sqlx::Error::PoolTimedOut => {
                StorageError::Unavailable(format!("{} ({})", err, operation))
            }
            sqlx::Error::Io(e) => StorageError::Unavailable(format!("{} ({})", e, operation)),
            other => StorageError::Database {
                operation: operation.to_string(),
                message: other.to_string(),
            },
        }
    }
}

/// Microsoft Graph (group directory) errors
#[derive(Error, Debug)]
pub enum DirectoryError {
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Graph API error (HTTP {status}): {message}")]
    Api { status: u16, message: String },

    #[error("Rate limited, retry after {retry_after} seconds")]
    RateLimited { retry_after: u64 },

    #[error("Resource not found: {resource}")]
    NotFound { resource: String },

    #[error("Unauthorized: invalid or expired token")]
    Unauthorized,

    #[error("Forbidden: insufficient privileges for {action}")]
    Forbidden { action: String },

    #[error("Invalid response from Graph: {0}")]
    InvalidResponse(String),
}

impl DirectoryError {
    /// Create an appropriate error from an HTTP status code and response body
    pub fn from_response(status: u16, body: &str) -> Self {
        match status {
            401 => DirectoryError::Unauthorized,
            403 => DirectoryError::Forbidden {
                action: "this operation".into(),
            },
            404 => DirectoryError::NotFound {
                resource: "requested resource".into(),
            },
            429 => DirectoryError::RateLimited { retry_after: 1 },
            _ => DirectoryError::Api {
                status,
                message: if body.is_empty() {
                    format!("HTTP {}", status)
                } else {
                    body.to_string()
                },
            },
        }
    }

    /// Whether a later attempt could succeed without operator action
    pub fn is_transient(&self) -> bool {
        match self {
            DirectoryError::Request(e) => e.is_timeout() || e.is_connect(),
            DirectoryError::RateLimited { .. } => true,
            DirectoryError::Api { status, .. } => *status >= 500,
            _ => false,
        }
    }
}

/// Authentication errors
#[derive(Error, Debug)]
pub enum AuthError {
    #[error("No authentication configured")]
    NotConfigured,

    #[error("Invalid token format")]
    InvalidToken,
}

/// Background job errors
#[derive(Error, Debug)]
pub enum JobError {
    #[error("Job queue is closed")]
    QueueClosed,

    #[error("Job queue is full")]
    QueueFull,

    #[error("Job '{job}' failed: {reason}")]
    Failed { job: String, reason: String },
}

/// Result type alias for pivot store operations
pub type StorageResult<T> = std::result::Result<T, StorageError>;

/// Result type alias for Graph API operations
pub type DirectoryResult<T> = std::result::Result<T, DirectoryError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_directory_error_from_response() {
        assert!(matches!(
            DirectoryError::from_response(401, ""),
            DirectoryError::Unauthorized
        ));

        assert!(matches!(
            DirectoryError::from_response(403, ""),
            DirectoryError::Forbidden { .. }
        ));

        assert!(matches!(
            DirectoryError::from_response(404, ""),
            DirectoryError::NotFound { .. }
        ));

        assert!(matches!(
            DirectoryError::from_response(429, ""),
            DirectoryError::RateLimited { .. }
        ));

        let api_err = DirectoryError::from_response(500, "Internal server error");
        assert!(matches!(api_err, DirectoryError::Api { status: 500, .. }));
    }

    #[test]
    fn test_is_transient() {
        assert!(DirectoryError::RateLimited { retry_after: 1 }.is_transient());
        assert!(
            DirectoryError::Api {
                status: 503,
                message: "Service unavailable".to_string()
            }
            .is_transient()
        );
        assert!(
            !DirectoryError::Api {
                status: 400,
                message: "Bad request".to_string()
            }
            .is_transient()
        );
        assert!(!DirectoryError::Unauthorized.is_transient());
        assert!(
            !DirectoryError::NotFound {
                resource: "group".to_string()
            }
            .is_transient()
        );
    }

    #[test]
    fn test_storage_error_display() {
        let err = StorageError::Database {
            operation: "sync_user_groups".to_string(),
            message: "connection reset".to_string(),
        };
        assert!(err.to_string().contains("sync_user_groups"));

        let err = StorageError::from_sqlx("list_all_user_pivots", sqlx::Error::PoolClosed);
        assert!(matches!(err, StorageError::Unavailable(_)));
    }
}
