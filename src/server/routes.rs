//! Admin API routes and handlers
//!
//! Everything under `/api` except `/api/login` requires the configured admin
//! bearer token. `/api/login` takes the caller's directory token and keys the
//! sync by the profile behind it.

use crate::access_control::AccessDecision;
use crate::agents::AgentRef;
use crate::error::DirectoryError;
use crate::jobs::JobStats;
use crate::login::LoginOutcome;
use crate::names::placeholder_name;
use crate::pivot::{GroupId, GroupMetadata, dedupe};
use crate::server::AppState;
use crate::stats::{ActiveUsers, RbacStats};
use crate::util::SecretString;
use axum::{
    Json, Router,
    extract::{Path, Query, Request, State},
    http::{HeaderMap, StatusCode, header::AUTHORIZATION},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use tower_http::trace::TraceLayer;
use tracing::{error, warn};

/// JSON error response
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::UNAUTHORIZED,
            message: message.into(),
        }
    }

    pub fn bad_gateway(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_GATEWAY,
            message: message.into(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: message.into(),
        }
    }
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(ErrorBody { error: self.message })).into_response()
    }
}

/// Build the admin API router
pub fn router(state: AppState) -> Router {
    let admin = Router::new()
        .route("/api/stats", get(stats))
        .route(
            "/api/users/{email}/groups",
            get(get_user_groups).put(put_user_groups),
        )
        .route("/api/users/{email}/agents", get(get_user_agents))
        .route(
            "/api/agents/{name}/groups",
            get(get_agent_groups).put(put_agent_groups),
        )
        .route("/api/access", get(check_access))
        .route("/api/groups/names", post(resolve_names))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_admin));

    Router::new()
        .route("/health", get(health))
        .route("/api/login", post(login))
        .merge(admin)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Reject requests without the configured admin token
async fn require_admin(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let Some(expected) = state.admin_token.as_ref().filter(|t| !t.is_empty()) else {
        warn!(path = %request.uri().path(), "Admin request rejected, no admin token configured");
        return Err(ApiError::unauthorized("Admin API token is not configured"));
    };

    let presented = bearer_token(request.headers())?;
    if !tokens_match(presented.expose_secret(), expected.expose_secret()) {
        warn!(path = %request.uri().path(), "Admin request with invalid token");
        return Err(ApiError::unauthorized("Invalid admin token"));
    }

    Ok(next.run(request).await)
}

/// Comparison time depends only on the length
fn tokens_match(presented: &str, expected: &str) -> bool {
    presented.len() == expected.len()
        && presented
            .bytes()
            .zip(expected.bytes())
            .fold(0u8, |acc, (a, b)| acc | (a ^ b))
            == 0
}

fn require(value: &str, field: &str) -> Result<(), ApiError> {
    if value.trim().is_empty() {
        return Err(ApiError::bad_request(format!("{} must not be empty", field)));
    }
    Ok(())
}

#[derive(Serialize)]
struct Health {
    status: &'static str,
    version: &'static str,
}

async fn health() -> Json<Health> {
    Json(Health {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

#[derive(Serialize)]
struct StatsResponse {
    #[serde(flatten)]
    rbac: RbacStats,
    #[serde(skip_serializing_if = "Option::is_none")]
    jobs: Option<JobStats>,
}

async fn stats(State(state): State<AppState>) -> Json<StatsResponse> {
    let active = ActiveUsers::SyncedSince(Utc::now() - state.active_user_window);
    let rbac = match RbacStats::collect(
        state.engine.pivots().as_ref(),
        state.agents.as_ref(),
        active,
    )
    .await
    {
        Ok(stats) => stats,
        Err(e) => {
            warn!(error = %e, "Failed to collect RBAC statistics");
            RbacStats::default()
        }
    };

    Json(StatsResponse {
        rbac,
        jobs: state.jobs.as_ref().map(|q| q.stats()),
    })
}

#[derive(Serialize)]
struct UserGroupsResponse {
    email: String,
    groups: Vec<GroupId>,
}

async fn get_user_groups(
    State(state): State<AppState>,
    Path(email): Path<String>,
) -> Json<UserGroupsResponse> {
    let groups = state.engine.get_user_groups(&email).await;
    Json(UserGroupsResponse { email, groups })
}

#[derive(Deserialize)]
struct SyncUserGroupsRequest {
    groups: Vec<GroupId>,
}

#[derive(Serialize)]
struct UserPivotResponse {
    email: String,
    groups: Vec<GroupId>,
    updated_at: DateTime<Utc>,
}

async fn put_user_groups(
    State(state): State<AppState>,
    Path(email): Path<String>,
    Json(body): Json<SyncUserGroupsRequest>,
) -> Result<Json<UserPivotResponse>, ApiError> {
    require(&email, "email")?;

    let row = state
        .engine
        .sync_user_groups(&email, body.groups)
        .await
        .map_err(|e| {
            error!(email = %email, error = %e, "User group sync failed");
            ApiError::internal(format!("Failed to sync user groups: {}", e))
        })?;

    Ok(Json(UserPivotResponse {
        email: row.email,
        groups: row.groups,
        updated_at: row.updated_at,
    }))
}

async fn get_user_agents(
    State(state): State<AppState>,
    Path(email): Path<String>,
) -> Json<Vec<AgentRef>> {
    Json(
        state
            .engine
            .list_available_agents(&email, state.agents.as_ref())
            .await,
    )
}

#[derive(Serialize)]
struct AgentGroupsResponse {
    agent_name: String,
    groups: Vec<GroupMetadata>,
    #[serde(skip_serializing_if = "Option::is_none")]
    updated_at: Option<DateTime<Utc>>,
}

async fn get_agent_groups(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Json<AgentGroupsResponse> {
    let pivot = match state.engine.pivots().get_agent_pivot(&name).await {
        Ok(pivot) => pivot,
        Err(e) => {
            warn!(agent_name = %name, error = %e, "Failed to read agent pivot");
            None
        }
    };

    let Some(pivot) = pivot else {
        return Json(AgentGroupsResponse {
            agent_name: name,
            groups: Vec::new(),
            updated_at: None,
        });
    };

    state.names.table().remember_all(&pivot.metadata);
    let ids = pivot.unique_groups();
    let names = state.names.resolve_group_names(&ids).await;
    let groups = with_names(ids, &names);

    Json(AgentGroupsResponse {
        agent_name: pivot.agent_name,
        groups,
        updated_at: Some(pivot.updated_at),
    })
}

#[derive(Deserialize)]
struct AssignAgentGroupsRequest {
    groups: Vec<GroupId>,
    #[serde(default)]
    metadata: Vec<GroupMetadata>,
}

async fn put_agent_groups(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Json(body): Json<AssignAgentGroupsRequest>,
) -> Result<Json<AgentGroupsResponse>, ApiError> {
    require(&name, "agent name")?;

    // Names supplied by the caller win; the rest are resolved. Entries for
    // ids outside the assignment are dropped.
    let assigned: HashSet<&GroupId> = body.groups.iter().collect();
    let mut seen = HashSet::new();
    let supplied: Vec<GroupMetadata> = body
        .metadata
        .into_iter()
        .filter(|m| !m.name.trim().is_empty() && assigned.contains(&m.id))
        .filter(|m| seen.insert(m.id.clone()))
        .collect();
    state.names.table().remember_all(&supplied);
    let names = state.names.resolve_group_names(&body.groups).await;

    // Placeholders are display-only and never persisted
    let mut metadata = supplied;
    let known: HashSet<GroupId> = metadata.iter().map(|m| m.id.clone()).collect();
    metadata.extend(
        dedupe(&body.groups)
            .into_iter()
            .filter(|id| !known.contains(id))
            .filter_map(|id| {
                let label = names.get(&id)?;
                (*label != placeholder_name(&id)).then(|| GroupMetadata {
                    name: label.clone(),
                    id,
                })
            }),
    );

    let row = state
        .engine
        .assign_agent_groups(&name, body.groups, metadata)
        .await
        .map_err(|e| {
            error!(agent_name = %name, error = %e, "Agent group assignment failed");
            ApiError::internal(format!("Failed to assign agent groups: {}", e))
        })?;

    let groups = with_names(row.unique_groups(), &names);
    Ok(Json(AgentGroupsResponse {
        agent_name: row.agent_name,
        groups,
        updated_at: Some(row.updated_at),
    }))
}

fn with_names(ids: Vec<GroupId>, names: &HashMap<GroupId, String>) -> Vec<GroupMetadata> {
    ids.into_iter()
        .map(|id| GroupMetadata {
            name: names
                .get(&id)
                .cloned()
                .unwrap_or_else(|| placeholder_name(&id)),
            id,
        })
        .collect()
}

#[derive(Deserialize)]
struct AccessQuery {
    email: String,
    agent: String,
}

#[derive(Serialize)]
struct AccessResponse {
    email: String,
    agent: String,
    allowed: bool,
    #[serde(flatten)]
    decision: AccessDecision,
}

async fn check_access(
    State(state): State<AppState>,
    Query(query): Query<AccessQuery>,
) -> Json<AccessResponse> {
    let decision = state.engine.decide(&query.email, &query.agent).await;
    Json(AccessResponse {
        allowed: decision.is_allowed(),
        email: query.email,
        agent: query.agent,
        decision,
    })
}

#[derive(Deserialize)]
struct ResolveNamesRequest {
    ids: Vec<GroupId>,
}

async fn resolve_names(
    State(state): State<AppState>,
    Json(body): Json<ResolveNamesRequest>,
) -> Json<HashMap<GroupId, String>> {
    Json(state.names.resolve_group_names(&body.ids).await)
}

/// Caller's bearer token, passed through to the directory
fn bearer_token(headers: &HeaderMap) -> Result<SecretString, ApiError> {
    headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(SecretString::from)
        .ok_or_else(|| ApiError::unauthorized("Missing bearer token"))
}

async fn login(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<LoginOutcome>, ApiError> {
    let token = bearer_token(&headers)?;
    match state.login.on_token_login(&token).await {
        Ok(outcome) => Ok(Json(outcome)),
        Err(DirectoryError::Unauthorized) => {
            Err(ApiError::unauthorized("Token rejected by the directory"))
        }
        Err(e) => {
            warn!(error = %e, "Failed to read caller profile at login");
            Err(ApiError::bad_gateway(format!(
                "Failed to read caller profile: {}",
                e
            )))
        }
    }
}
