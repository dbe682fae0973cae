//! Admin HTTP surface
//!
//! JSON endpoints over the access engine, for administrators and for the
//! frontend's agent listing, guarded by an admin bearer token. Writes that
//! fail return HTTP 500 with an error body; reads degrade to empty results
//! instead of failing.

pub mod routes;

pub use routes::{ApiError, router};

use crate::access_control::AccessEngine;
use crate::agents::AgentDirectory;
use crate::config::ServerConfig;
use crate::jobs::JobQueue;
use crate::login::LoginSync;
use crate::names::GroupNameResolver;
use crate::util::{SecretString, bind_listener};
use std::future::Future;
use std::sync::Arc;
use tracing::info;

/// Shared state for handlers
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<AccessEngine>,
    pub agents: Arc<dyn AgentDirectory>,
    pub names: Arc<GroupNameResolver>,
    pub login: Arc<LoginSync>,
    pub jobs: Option<JobQueue>,
    /// Bearer token for the admin routes; `None` rejects them all
    pub admin_token: Option<SecretString>,
    /// Users synced within this window count as active in statistics
    pub active_user_window: chrono::Duration,
}

/// Serve the admin API until `shutdown` resolves
///
/// Falls back to an OS-assigned port when the configured one is taken.
pub async fn serve<F>(config: &ServerConfig, state: AppState, shutdown: F) -> std::io::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    if !config.enabled {
        info!("Admin API is disabled");
        return Ok(());
    }

    let listener = bind_listener(&config.host, config.port).await?;
    info!("Admin API listening on http://{}", listener.local_addr()?);

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown)
        .await?;

    info!("Admin API stopped");
    Ok(())
}
