// Add/remove of tracked workflows as optimistic read-modify-write cycles

use rand::Rng;
use std::time::Duration;
use tracing::{info, warn};

use super::config_store::ConfigStore;
use super::errors::WorkflowError;
use super::types::{WorkflowKey, WorkflowRecord};

pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;
const DEFAULT_BACKOFF: Duration = Duration::from_millis(25);

pub struct MutationEngine {
    store: ConfigStore,
    max_attempts: u32,
    backoff: Duration,
}

impl MutationEngine {
    pub fn new(store: ConfigStore) -> Self {
        Self {
            store,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            backoff: DEFAULT_BACKOFF,
        }
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    /// Base delay between conflicting attempts; grows linearly and is jittered
    pub fn with_backoff(mut self, backoff: Duration) -> Self {
        self.backoff = backoff;
        self
    }

    /// Start tracking `workflow` in `owner_repo`
    pub async fn add_workflow(
        &self,
        owner_repo: &str,
        workflow: &str,
        label: &str,
    ) -> Result<WorkflowRecord, WorkflowError> {
        let key = WorkflowKey::parse(owner_repo, workflow)?;
        let label = label.trim();
        if label.is_empty() {
            return Err(WorkflowError::Validation(
                "label must not be empty".to_string(),
            ));
        }

        self.apply("add", |records| {
            if records.iter().any(|r| r.matches(&key)) {
                return Err(WorkflowError::Duplicate(key.clone()));
            }
            let record = WorkflowRecord::new(key.clone(), label);
            records.push(record.clone());
            Ok(record)
        })
        .await
    }

    /// Stop tracking `workflow` in `owner_repo`, returning the removed record
    pub async fn remove_workflow(
        &self,
        owner_repo: &str,
        workflow: &str,
    ) -> Result<WorkflowRecord, WorkflowError> {
        let key = WorkflowKey::parse(owner_repo, workflow)?;

        self.apply("remove", |records| {
            let position = records
                .iter()
                .position(|r| r.matches(&key))
                .ok_or_else(|| WorkflowError::NotFound(key.clone()))?;
            Ok(records.remove(position))
        })
        .await
    }

    /// Read, mutate and conditionally write, starting over on version conflicts.
    /// Errors from `mutate` end the cycle without writing anything.
    async fn apply<T, F>(&self, operation: &str, mut mutate: F) -> Result<T, WorkflowError>
    where
        F: FnMut(&mut Vec<WorkflowRecord>) -> Result<T, WorkflowError> + Send,
        T: Send,
    {
        for attempt in 1..=self.max_attempts {
            let mut set = self.store.read().await?;
            let outcome = mutate(&mut set.records)?;

            match self.store.write(&set.records, set.version.as_deref()).await {
                Ok(version) => {
                    info!(operation, attempt, version = %version, "Updated tracked workflows");
                    return Ok(outcome);
                }
                Err(WorkflowError::VersionConflict) => {
                    warn!(
                        operation,
                        attempt,
                        max_attempts = self.max_attempts,
                        "Config document changed underneath us"
                    );
                    if attempt < self.max_attempts {
                        tokio::time::sleep(jittered(self.backoff, attempt)).await;
                    }
                }
                Err(e) => return Err(e),
            }
        }

        Err(WorkflowError::ConflictExhausted {
            attempts: self.max_attempts,
        })
    }
}

fn jittered(base: Duration, attempt: u32) -> Duration {
    let base_ms = base.as_millis() as u64 * u64::from(attempt);
    if base_ms == 0 {
        return Duration::ZERO;
    }
    let jitter = rand::rng().random_range(0..=base_ms);
    Duration::from_millis(base_ms + jitter)
}
