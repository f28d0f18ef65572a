//! Request surface consumed by the hosting layer
//!
//! Wires the config store, credential provider, mutation engine and status
//! aggregator together from a [`HubConfig`] and exposes one method per
//! request kind. Errors come back as [`WorkflowError`]; the hosting layer
//! renders them with [`ErrorBody`](crate::workflows::ErrorBody) and
//! [`WorkflowError::status_code`].

use anyhow::{bail, Result};
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::Instrument;

use crate::config::{HubConfig, StoreBackend};
use crate::github::{CredentialProvider, GitHubActionsClient, GitHubAppExchanger, WorkflowRunSource};
use crate::store::{FileBlobStore, GitHubContentsStore, MemoryBlobStore, VersionedBlobStore};
use crate::telemetry::{create_request_span, generate_correlation_id};
use crate::workflows::{
    ConfigStore, MutationEngine, StatusAggregator, StatusReport, WorkflowError, WorkflowRecord,
};

#[derive(Debug, Clone, Deserialize)]
pub struct AddWorkflowRequest {
    /// `owner/repo`
    pub repo: String,
    pub workflow: String,
    pub label: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RemoveWorkflowRequest {
    /// `owner/repo`
    pub repo: String,
    pub workflow: String,
}

pub struct WorkflowService {
    store: ConfigStore,
    mutations: MutationEngine,
    aggregator: StatusAggregator,
}

impl WorkflowService {
    pub fn new(
        blob: Arc<dyn VersionedBlobStore>,
        credentials: Arc<CredentialProvider>,
        runs: Arc<dyn WorkflowRunSource>,
        config: &HubConfig,
    ) -> Self {
        let store = ConfigStore::new(blob);
        let mutations = MutationEngine::new(store.clone())
            .with_max_attempts(config.mutations.max_attempts)
            .with_backoff(Duration::from_millis(config.mutations.backoff_ms));
        let aggregator = StatusAggregator::new(credentials, store.clone(), runs)
            .with_query_timeout(Duration::from_secs(config.aggregation.request_timeout_seconds))
            .with_max_concurrency(config.aggregation.max_concurrency);

        Self {
            store,
            mutations,
            aggregator,
        }
    }

    /// Build the production wiring described by `config`
    pub fn from_config(config: &HubConfig) -> Result<Self> {
        let github = &config.github;
        let exchanger = GitHubAppExchanger::new(
            github.app_id,
            github.private_key_pem()?,
            github.installation_id,
            github.api_base.clone(),
        );
        let credentials = Arc::new(CredentialProvider::new(
            Arc::new(exchanger),
            Duration::from_secs(config.aggregation.request_timeout_seconds),
        ));

        let blob: Arc<dyn VersionedBlobStore> = match config.store.backend {
            StoreBackend::File => Arc::new(FileBlobStore::new(&config.store.path)),
            StoreBackend::Memory => Arc::new(MemoryBlobStore::new()),
            StoreBackend::Github => {
                let Some((owner, repo)) = config
                    .store
                    .repo
                    .as_deref()
                    .and_then(|r| r.split_once('/'))
                else {
                    bail!("store.repo must be set to 'owner/repo' for the github store backend");
                };
                Arc::new(GitHubContentsStore::new(
                    credentials.clone(),
                    github.api_base.clone(),
                    owner,
                    repo,
                    config.store.path.clone(),
                    config.store.branch.clone(),
                ))
            }
        };
        tracing::info!(store = %blob.describe(), "Using config store");

        let runs = Arc::new(GitHubActionsClient::new(
            github.api_base.clone(),
            github.requests_per_second,
        ));
        Ok(Self::new(blob, credentials, runs, config))
    }

    /// Aggregated latest-run status of every tracked workflow
    pub async fn statuses(&self) -> Result<StatusReport, WorkflowError> {
        let span = create_request_span("status", &generate_correlation_id());
        self.aggregator.get_statuses().instrument(span).await
    }

    /// Tracked workflows without contacting GitHub
    pub async fn list(&self) -> Result<Vec<WorkflowRecord>, WorkflowError> {
        let span = create_request_span("list", &generate_correlation_id());
        async { self.store.read().await.map(|set| set.records) }
            .instrument(span)
            .await
    }

    pub async fn add(&self, request: AddWorkflowRequest) -> Result<WorkflowRecord, WorkflowError> {
        let span = create_request_span("add", &generate_correlation_id());
        self.mutations
            .add_workflow(&request.repo, &request.workflow, &request.label)
            .instrument(span)
            .await
    }

    pub async fn remove(
        &self,
        request: RemoveWorkflowRequest,
    ) -> Result<WorkflowRecord, WorkflowError> {
        let span = create_request_span("remove", &generate_correlation_id());
        self.mutations
            .remove_workflow(&request.repo, &request.workflow)
            .instrument(span)
            .await
    }
}
