// Latest-run status for every tracked workflow, one isolated query per record

use crate::github::{CredentialProvider, InstallationToken, StatusQueryError, WorkflowRunSource};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{info, warn};

use super::config_store::ConfigStore;
use super::errors::WorkflowError;
use super::types::{StatusReport, StatusResult, WorkflowRecord};

pub const DEFAULT_QUERY_TIMEOUT: Duration = Duration::from_secs(5);
pub const DEFAULT_MAX_CONCURRENCY: usize = 8;

pub struct StatusAggregator {
    credentials: Arc<CredentialProvider>,
    store: ConfigStore,
    runs: Arc<dyn WorkflowRunSource>,
    query_timeout: Duration,
    max_concurrency: usize,
}

impl StatusAggregator {
    pub fn new(
        credentials: Arc<CredentialProvider>,
        store: ConfigStore,
        runs: Arc<dyn WorkflowRunSource>,
    ) -> Self {
        Self {
            credentials,
            store,
            runs,
            query_timeout: DEFAULT_QUERY_TIMEOUT,
            max_concurrency: DEFAULT_MAX_CONCURRENCY,
        }
    }

    pub fn with_query_timeout(mut self, timeout: Duration) -> Self {
        self.query_timeout = timeout;
        self
    }

    pub fn with_max_concurrency(mut self, max_concurrency: usize) -> Self {
        self.max_concurrency = max_concurrency.max(1);
        self
    }

    /// Status of every tracked workflow, in tracked order.
    ///
    /// Only a credential or config-store failure fails the whole call; a
    /// failed lookup for one workflow is reported in that workflow's `error`.
    pub async fn get_statuses(&self) -> Result<StatusReport, WorkflowError> {
        let token = self.credentials.get_access_token().await?;
        let set = self.store.read().await?;

        let results = self.query_all(token, set.records).await;
        let failed = results.iter().filter(|r| r.is_error()).count();
        info!(
            count = results.len(),
            failed,
            "Aggregated workflow statuses"
        );
        Ok(StatusReport::new(results))
    }

    async fn query_all(
        &self,
        token: InstallationToken,
        records: Vec<WorkflowRecord>,
    ) -> Vec<StatusResult> {
        // Every slot starts out failed so a task that never reports back still
        // yields exactly one result for its record.
        let mut slots: Vec<StatusResult> = records
            .iter()
            .cloned()
            .map(|record| StatusResult::failed(record, "status query did not complete"))
            .collect();

        let token = Arc::new(token);
        let permits = Arc::new(Semaphore::new(self.max_concurrency));
        let mut tasks = JoinSet::new();

        for (index, record) in records.into_iter().enumerate() {
            let runs = self.runs.clone();
            let token = token.clone();
            let permits = permits.clone();
            let timeout = self.query_timeout;

            tasks.spawn(async move {
                let _permit = permits.acquire_owned().await.ok();
                let outcome = tokio::time::timeout(
                    timeout,
                    runs.latest_run(&token, &record.owner, &record.repo, &record.workflow),
                )
                .await
                .unwrap_or(Err(StatusQueryError::Timeout(timeout)));

                let result = match outcome {
                    Ok(run) => StatusResult::from_run(record, run),
                    Err(e) => {
                        warn!(
                            owner = %record.owner,
                            repo = %record.repo,
                            workflow = %record.workflow,
                            error = %e,
                            "Workflow status query failed"
                        );
                        StatusResult::failed(record, e.to_string())
                    }
                };
                (index, result)
            });
        }

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((index, result)) => slots[index] = result,
                Err(e) => warn!(error = %e, "Workflow status task aborted"),
            }
        }
        slots
    }
}
