// Adapter between the tracked-workflow document and the versioned blob store

use crate::store::VersionedBlobStore;
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::errors::WorkflowError;
use super::types::{StoredRecord, TrackedSet, WorkflowRecord};

#[derive(Clone)]
pub struct ConfigStore {
    blob: Arc<dyn VersionedBlobStore>,
}

impl ConfigStore {
    pub fn new(blob: Arc<dyn VersionedBlobStore>) -> Self {
        Self { blob }
    }

    /// Read the tracked set.
    ///
    /// Records without an `id` get one assigned here. When that happens the
    /// repaired document is written back in the background against the
    /// version just read; if that write fails it is only logged, and the
    /// caller still receives the repaired records.
    pub async fn read(&self) -> Result<TrackedSet, WorkflowError> {
        let Some(blob) = self.blob.get().await? else {
            debug!(store = %self.blob.describe(), "No config document yet");
            return Ok(TrackedSet::default());
        };

        let stored: Vec<StoredRecord> = serde_json::from_slice(&blob.contents).map_err(|e| {
            WorkflowError::StoreUnavailable(format!("config document is not a valid workflow list: {e}"))
        })?;

        let mut repaired = 0usize;
        let records: Vec<WorkflowRecord> = stored
            .into_iter()
            .map(|record| WorkflowRecord {
                id: record.id.unwrap_or_else(|| {
                    repaired += 1;
                    Uuid::new_v4()
                }),
                owner: record.owner,
                repo: record.repo,
                workflow: record.workflow,
                label: record.label,
            })
            .collect();

        if repaired > 0 {
            info!(repaired, store = %self.blob.describe(), "Assigned ids to tracked workflows");
            self.spawn_repair(&records, blob.version.clone());
        }

        Ok(TrackedSet {
            records,
            version: Some(blob.version),
        })
    }

    /// Conditionally replace the document; fails with
    /// [`WorkflowError::VersionConflict`] if `expected` is stale.
    pub async fn write(
        &self,
        records: &[WorkflowRecord],
        expected: Option<&str>,
    ) -> Result<String, WorkflowError> {
        let contents = encode(records)?;
        let version = self.blob.put_if_match(contents, expected).await?;
        debug!(
            records = records.len(),
            version = %version,
            "Wrote config document"
        );
        Ok(version)
    }

    fn spawn_repair(&self, records: &[WorkflowRecord], version: String) {
        let contents = match encode(records) {
            Ok(contents) => contents,
            Err(e) => {
                warn!(error = %e, "Could not encode repaired config document");
                return;
            }
        };
        let blob = self.blob.clone();
        tokio::spawn(async move {
            match blob.put_if_match(contents, Some(&version)).await {
                Ok(new_version) => {
                    info!(version = %new_version, "Persisted repaired config document")
                }
                Err(e) => warn!(error = %e, "Failed to persist repaired config document"),
            }
        });
    }
}

fn encode(records: &[WorkflowRecord]) -> Result<Vec<u8>, WorkflowError> {
    serde_json::to_vec_pretty(records)
        .map_err(|e| WorkflowError::StoreUnavailable(format!("cannot encode config document: {e}")))
}
