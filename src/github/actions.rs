// GitHub Actions API: latest run lookup for a single workflow file
use super::auth::InstallationToken;
use super::errors::StatusQueryError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use governor::{DefaultDirectRateLimiter, Jitter, Quota, RateLimiter};
use octocrab::Octocrab;
use serde::{Deserialize, Serialize};
use std::num::NonZeroU32;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::debug;
use urlencoding::encode;

#[cfg(test)]
use mockall::automock;

/// The fields of a workflow run that the status view cares about
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct LatestRun {
    pub status: Option<String>,
    pub conclusion: Option<String>,
    #[serde(rename = "html_url")]
    pub url: Option<String>,
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
struct WorkflowRunsPage {
    workflow_runs: Vec<LatestRun>,
}

#[derive(Debug, Serialize)]
struct RunsParams {
    per_page: u8,
}

/// Source of per-workflow run information
#[cfg_attr(test, automock)]
#[async_trait]
pub trait WorkflowRunSource: Send + Sync {
    /// Most recent run of `workflow` in `owner/repo`, or `None` if it never ran
    async fn latest_run(
        &self,
        token: &InstallationToken,
        owner: &str,
        repo: &str,
        workflow: &str,
    ) -> Result<Option<LatestRun>, StatusQueryError>;
}

/// Rate-limited Actions client authenticated with an installation token
pub struct GitHubActionsClient {
    api_base: String,
    rate_limiter: Arc<DefaultDirectRateLimiter>,
    client: Mutex<Option<(String, Octocrab)>>,
}

impl GitHubActionsClient {
    pub fn new(api_base: impl Into<String>, requests_per_second: u32) -> Self {
        let per_second = NonZeroU32::new(requests_per_second).unwrap_or(NonZeroU32::MIN);
        let quota = Quota::per_second(per_second).allow_burst(per_second);

        Self {
            api_base: api_base.into(),
            rate_limiter: Arc::new(RateLimiter::direct(quota)),
            client: Mutex::new(None),
        }
    }

    /// Client for `token`, rebuilt only when the token changes
    fn client_for(&self, token: &InstallationToken) -> Result<Octocrab, StatusQueryError> {
        let mut slot = self
            .client
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if let Some((value, client)) = slot.as_ref() {
            if *value == token.value {
                return Ok(client.clone());
            }
        }

        let client = Octocrab::builder()
            .base_uri(self.api_base.as_str())?
            .personal_token(token.value.clone())
            .build()?;
        *slot = Some((token.value.clone(), client.clone()));
        Ok(client)
    }
}

#[async_trait]
impl WorkflowRunSource for GitHubActionsClient {
    async fn latest_run(
        &self,
        token: &InstallationToken,
        owner: &str,
        repo: &str,
        workflow: &str,
    ) -> Result<Option<LatestRun>, StatusQueryError> {
        let client = self.client_for(token)?;
        self.rate_limiter
            .until_ready_with_jitter(Jitter::up_to(Duration::from_millis(50)))
            .await;

        debug!(owner, repo, workflow, "Fetching latest workflow run");
        // Runs come back newest first, so the first entry is the latest one.
        let page: WorkflowRunsPage = client
            .get(
                format!(
                    "/repos/{}/{}/actions/workflows/{}/runs",
                    encode(owner),
                    encode(repo),
                    encode(workflow)
                ),
                Some(&RunsParams { per_page: 1 }),
            )
            .await?;

        Ok(page.workflow_runs.into_iter().next())
    }
}
