//! Agent RBAC service
//!
//! Group-intersection access control for agents, with an admin HTTP API.

use agent_rbac::{
    access_control::AccessEngine,
    agents::{AgentDirectory, StaticAgentDirectory},
    auth::create_auth_provider,
    config::{AppConfig, LogFormat, StorageBackend, load_config},
    directory::{GraphClient, GroupDirectory},
    jobs::{JobQueue, RetryPolicy},
    login::{AdminPolicy, LoginSync},
    names::{GroupNameResolver, GroupNameTable},
    pivot::{DirectGrantStore, InMemoryPivotStore, PivotStore, PostgresPivotStore},
    server::{self, AppState},
    util::SecretString,
};
use anyhow::Context;
use clap::Parser;
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Agent RBAC - group-based access control for agents
#[derive(Parser, Debug)]
#[command(name = "agent-rbac")]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, env = "AGENT_RBAC_CONFIG")]
    config: Option<String>,

    /// Log level (trace, debug, info, warn, error); overrides config
    #[arg(long, env = "AGENT_RBAC_LOG_LEVEL")]
    log_level: Option<String>,

    /// Admin API host; overrides config
    #[arg(long, env = "AGENT_RBAC_HOST")]
    host: Option<String>,

    /// Admin API port; overrides config
    #[arg(long, env = "AGENT_RBAC_PORT")]
    port: Option<u16>,

    /// Do not start the admin API
    #[arg(long, env = "AGENT_RBAC_NO_SERVER")]
    no_server: bool,
}

fn init_logging(config: &AppConfig, level_override: Option<&str>) {
    let level = level_override.unwrap_or(&config.logging.level);
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    match config.logging.format {
        LogFormat::Pretty => tracing_subscriber::registry()
            .with(fmt::layer().with_writer(std::io::stderr))
            .with(filter)
            .init(),
        LogFormat::Json => tracing_subscriber::registry()
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .with(filter)
            .init(),
    }
}

/// The same store behind both traits
type Stores = (Arc<dyn PivotStore>, Arc<dyn DirectGrantStore>);

async fn open_stores(config: &AppConfig) -> anyhow::Result<Stores> {
    match config.storage.backend {
        StorageBackend::Memory => {
            warn!("Using in-memory storage; pivots are lost on restart");
            let store = Arc::new(InMemoryPivotStore::new());
            let pivots: Arc<dyn PivotStore> = store.clone();
            let grants: Arc<dyn DirectGrantStore> = store;
            Ok((pivots, grants))
        }
        StorageBackend::Postgres => {
            let url = config
                .storage
                .database_url
                .as_deref()
                .context("storage.database_url is required for the postgres backend")?;
            let store = Arc::new(
                PostgresPivotStore::connect(url, config.storage.max_connections).await?,
            );
            store.migrate().await?;
            info!("Connected to PostgreSQL pivot store");
            let pivots: Arc<dyn PivotStore> = store.clone();
            let grants: Arc<dyn DirectGrantStore> = store;
            Ok((pivots, grants))
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let mut config = load_config(args.config.as_deref())?;
    if let Some(host) = args.host {
        config.server.host = host;
    }
    if let Some(port) = args.port {
        config.server.port = port;
    }
    if args.no_server {
        config.server.enabled = false;
    }

    init_logging(&config, args.log_level.as_deref());

    info!(
        version = env!("CARGO_PKG_VERSION"),
        agents = config.agents.len(),
        admin_groups = config.rbac.admin_group_ids.len(),
        "Starting agent RBAC service"
    );

    let (pivots, grants) = open_stores(&config)
        .await
        .inspect_err(|e| error!(error = %e, "Failed to open pivot store"))?;

    let graph: Arc<dyn GroupDirectory> = Arc::new(
        GraphClient::new(&config.graph)
            .inspect_err(|e| error!(error = %e, "Failed to create Graph client"))?,
    );

    let table = Arc::new(GroupNameTable::new());
    let names = match create_auth_provider(&config.graph) {
        Ok(auth) => {
            info!(auth_type = auth.auth_type(), "Group names resolved through Graph");
            GroupNameResolver::new(Arc::clone(&graph), auth, table)
        }
        Err(e) => {
            warn!(error = %e, "No Graph credential, group names resolve from local table only");
            GroupNameResolver::local_only(table)
        }
    };

    let (jobs, worker) = JobQueue::start(config.jobs.capacity, RetryPolicy::from_config(&config.jobs));

    let login = LoginSync::new(
        Arc::clone(&graph),
        Arc::clone(&pivots),
        AdminPolicy::new(config.rbac.admin_group_ids.clone()),
    )
    .with_jobs(jobs.clone());

    let agents: Arc<dyn AgentDirectory> = Arc::new(StaticAgentDirectory::new(config.agents.clone()));

    let admin_token = config
        .server
        .admin_token
        .as_deref()
        .map(SecretString::from)
        .filter(|t| !t.is_empty());
    if config.server.enabled && admin_token.is_none() {
        warn!("No server.admin_token configured, admin routes will reject every request");
    }

    let state = AppState {
        engine: Arc::new(AccessEngine::new(pivots, grants)),
        agents,
        names: Arc::new(names),
        login: Arc::new(login),
        jobs: Some(jobs),
        admin_token,
        active_user_window: chrono::Duration::days(i64::from(config.rbac.active_user_days)),
    };

    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for shutdown signal");
        }
        info!("Received shutdown signal");
    };

    if config.server.enabled {
        server::serve(&config.server, state, shutdown).await?;
    } else {
        info!("Admin API disabled, waiting for shutdown signal");
        drop(state);
        shutdown.await;
    }

    worker.shutdown().await;
    Ok(())
}
