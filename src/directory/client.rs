//! Microsoft Graph client
//!
//! Typed HTTP client for the two Graph calls the engine needs:
//! `GET /me/memberOf` (paged) and `GET /groups/{id}`.

use crate::auth::bearer_header;
use crate::config::GraphConfig;
use crate::directory::GroupDirectory;
use crate::directory::types::{CallerProfile, DirectoryPage, GroupInfo};
use crate::error::{DirectoryError, DirectoryResult};
use crate::pivot::GroupId;
use crate::util::{SecretString, short_id};
use async_trait::async_trait;
use rand::Rng;
use reqwest::header::RETRY_AFTER;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use std::time::Duration;
use tracing::{debug, instrument, warn};

/// Longest server-requested wait we honor
const MAX_RETRY_AFTER_SECS: u64 = 60;

/// Microsoft Graph client
pub struct GraphClient {
    http: Client,
    base_url: String,
    max_retries: u32,
    retry_base_delay: Duration,
}

impl GraphClient {
    /// Create a new Graph client from configuration
    pub fn new(config: &GraphConfig) -> DirectoryResult<Self> {
        let http = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .pool_max_idle_per_host(10)
            .pool_idle_timeout(Duration::from_secs(90))
            .user_agent(format!("agent-rbac/{}", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(DirectoryError::Request)?;

        Ok(Self {
            http,
            base_url: config.base_url(),
            max_retries: config.max_retries,
            retry_base_delay: Duration::from_millis(config.retry_base_delay_ms),
        })
    }

    /// Build a URL for an API endpoint
    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Execute a request, retrying throttled, 5xx and connection failures
    async fn execute(&self, request: RequestBuilder) -> DirectoryResult<Response> {
        let mut attempt = 0;

        loop {
            let req = request
                .try_clone()
                .ok_or_else(|| DirectoryError::InvalidResponse("Cannot clone request".into()))?;

            let (error, server_wait) = match req.send().await {
                Ok(response) => {
                    let status = response.status();
                    if status.is_success() {
                        return Ok(response);
                    }

                    if status == StatusCode::TOO_MANY_REQUESTS {
                        let retry_after = retry_after_secs(&response);
                        (
                            DirectoryError::RateLimited {
                                retry_after: retry_after.unwrap_or(0),
                            },
                            retry_after.map(Duration::from_secs),
                        )
                    } else {
                        let body = response.text().await.unwrap_or_default();
                        (DirectoryError::from_response(status.as_u16(), &body), None)
                    }
                }
                Err(e) => (DirectoryError::Request(e), None),
            };

            if !error.is_transient() || attempt >= self.max_retries {
                if error.is_transient() {
                    warn!(attempts = attempt + 1, error = %error, "Graph request retries exhausted");
                }
                return Err(error);
            }

            let delay = server_wait
                .unwrap_or_else(|| with_jitter(backoff_delay(self.retry_base_delay, attempt)));
            warn!(
                attempt = attempt + 1,
                delay_ms = delay.as_millis() as u64,
                error = %error,
                "Graph request failed, retrying"
            );
            tokio::time::sleep(delay).await;
            attempt += 1;
        }
    }

    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        url: &str,
        token: &SecretString,
    ) -> DirectoryResult<T> {
        let request = self
            .http
            .get(url)
            .header(reqwest::header::AUTHORIZATION, bearer_header(token));

        let response = self.execute(request).await?;
        response
            .json()
            .await
            .map_err(|e| DirectoryError::InvalidResponse(format!("Failed to parse response: {}", e)))
    }
}

#[async_trait]
impl GroupDirectory for GraphClient {
    #[instrument(skip(self, token))]
    async fn caller_profile(&self, token: &SecretString) -> DirectoryResult<CallerProfile> {
        self.get_json(&self.url("/me?$select=mail,userPrincipalName"), token)
            .await
    }

    #[instrument(skip(self, token))]
    async fn caller_groups(&self, token: &SecretString) -> DirectoryResult<Vec<GroupId>> {
        let mut groups = Vec::new();
        let mut next = Some(self.url("/me/memberOf?$select=id"));
        let mut pages = 0usize;

        while let Some(url) = next {
            let page: DirectoryPage = self.get_json(&url, token).await?;
            pages += 1;
            groups.extend(page.value.into_iter().filter_map(|object| object.id));
            next = page.next_link;
        }

        debug!(pages, groups = groups.len(), "Fetched caller group memberships");
        Ok(groups)
    }

    #[instrument(skip(self, token, group_id), fields(group = short_id(group_id)))]
    async fn group_by_id(
        &self,
        token: &SecretString,
        group_id: &str,
    ) -> DirectoryResult<Option<GroupInfo>> {
        let url = self.url(&format!(
            "/groups/{}?$select=id,displayName,mail",
            urlencoding::encode(group_id)
        ));

        match self.get_json::<GroupInfo>(&url, token).await {
            Ok(group) => Ok(Some(group)),
            Err(DirectoryError::NotFound { .. }) => {
                debug!("Group not found (may have been deleted)");
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }
}

/// Exponential backoff: `base * 2^attempt`
pub fn backoff_delay(base: Duration, attempt: u32) -> Duration {
    base.saturating_mul(2u32.saturating_pow(attempt))
}

/// Add up to 25% random jitter
fn with_jitter(delay: Duration) -> Duration {
    let max_jitter = delay.as_millis() as u64 / 4;
    if max_jitter == 0 {
        return delay;
    }
    delay + Duration::from_millis(rand::rng().random_range(0..=max_jitter))
}

/// Seconds from a `Retry-After` header, capped
fn retry_after_secs(response: &Response) -> Option<u64> {
    response
        .headers()
        .get(RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<u64>().ok())
        .map(|secs| secs.min(MAX_RETRY_AFTER_SECS))
}
