#![allow(dead_code)]

//! Shared fixtures for the workflow hub integration tests
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use workflow_hub::github::{LatestRun, TokenExchanger, WorkflowRunSource};
use workflow_hub::store::{MemoryBlobStore, VersionedBlob};
use workflow_hub::workflows::{ConfigStore, MutationEngine, WorkflowKey};
use workflow_hub::{
    AuthError, CredentialProvider, InstallationToken, StatusQueryError, StoreError,
    VersionedBlobStore, WorkflowRecord,
};

/// RSA key registered for the fake GitHub App used against wiremock
pub const TEST_APP_KEY: &str = include_str!("keys/test_app_key.pem");

/// Seed a memory store with the given `(owner, repo, workflow)` triples
pub fn seeded_store(workflows: &[(&str, &str, &str)]) -> Arc<MemoryBlobStore> {
    let records: Vec<WorkflowRecord> = workflows
        .iter()
        .map(|(owner, repo, workflow)| {
            WorkflowRecord::new(WorkflowKey::new(*owner, *repo, *workflow), *workflow)
        })
        .collect();
    Arc::new(MemoryBlobStore::with_contents(
        serde_json::to_vec(&records).expect("records serialize"),
    ))
}

/// Mutation engine that retries without sleeping
pub fn engine_over(blob: Arc<dyn VersionedBlobStore>, max_attempts: u32) -> MutationEngine {
    MutationEngine::new(ConfigStore::new(blob))
        .with_max_attempts(max_attempts)
        .with_backoff(Duration::ZERO)
}

/// Sorted identity triples of whatever the store currently holds
pub async fn stored_keys(blob: Arc<dyn VersionedBlobStore>) -> Vec<WorkflowKey> {
    let set = ConfigStore::new(blob).read().await.expect("store readable");
    let mut keys: Vec<WorkflowKey> = set.records.iter().map(WorkflowRecord::key).collect();
    keys.sort_by_key(|k| k.to_string());
    keys
}

pub fn completed_run(conclusion: &str, updated_at: DateTime<Utc>) -> LatestRun {
    LatestRun {
        status: Some("completed".to_string()),
        conclusion: Some(conclusion.to_string()),
        url: Some("https://github.com/acme/api/actions/runs/1".to_string()),
        updated_at: Some(updated_at),
    }
}

/// Exchanger handing out a fixed long-lived token and counting exchanges
#[derive(Default)]
pub struct StaticExchanger {
    pub exchanges: AtomicU32,
}

#[async_trait]
impl TokenExchanger for StaticExchanger {
    async fn exchange(&self) -> Result<InstallationToken, AuthError> {
        self.exchanges.fetch_add(1, Ordering::SeqCst);
        Ok(InstallationToken::new(
            "ghs_fixture",
            Utc::now() + chrono::Duration::hours(1),
        ))
    }
}

pub fn static_credentials() -> Arc<CredentialProvider> {
    Arc::new(CredentialProvider::new(
        Arc::new(StaticExchanger::default()),
        Duration::from_secs(5),
    ))
}

/// Run source answering from a table keyed by `owner/repo:workflow`.
/// Unknown workflows report "never run".
#[derive(Default)]
pub struct ScriptedRuns {
    outcomes: HashMap<String, Result<Option<LatestRun>, StatusQueryError>>,
}

impl ScriptedRuns {
    pub fn with(mut self, key: &str, outcome: Result<Option<LatestRun>, StatusQueryError>) -> Self {
        self.outcomes.insert(key.to_string(), outcome);
        self
    }
}

#[async_trait]
impl WorkflowRunSource for ScriptedRuns {
    async fn latest_run(
        &self,
        _token: &InstallationToken,
        owner: &str,
        repo: &str,
        workflow: &str,
    ) -> Result<Option<LatestRun>, StatusQueryError> {
        self.outcomes
            .get(&format!("{owner}/{repo}:{workflow}"))
            .cloned()
            .unwrap_or(Ok(None))
    }
}

/// Wraps a store and loses the first `conflicts` writes to a phantom
/// concurrent writer
pub struct ContendedStore {
    inner: Arc<MemoryBlobStore>,
    conflicts: AtomicU32,
}

impl ContendedStore {
    pub fn new(inner: Arc<MemoryBlobStore>, conflicts: u32) -> Self {
        Self {
            inner,
            conflicts: AtomicU32::new(conflicts),
        }
    }
}

#[async_trait]
impl VersionedBlobStore for ContendedStore {
    async fn get(&self) -> Result<Option<VersionedBlob>, StoreError> {
        self.inner.get().await
    }

    async fn put_if_match(
        &self,
        contents: Vec<u8>,
        expected: Option<&str>,
    ) -> Result<String, StoreError> {
        let remaining = self.conflicts.load(Ordering::SeqCst);
        if remaining > 0 {
            self.conflicts.store(remaining - 1, Ordering::SeqCst);
            return Err(StoreError::VersionConflict);
        }
        self.inner.put_if_match(contents, expected).await
    }

    fn describe(&self) -> String {
        format!("contended {}", self.inner.describe())
    }
}
