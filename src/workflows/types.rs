use crate::github::LatestRun;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use super::errors::WorkflowError;

/// Identity of a tracked workflow; matching is exact and case-sensitive
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct WorkflowKey {
    pub owner: String,
    pub repo: String,
    pub workflow: String,
}

impl WorkflowKey {
    pub fn new(
        owner: impl Into<String>,
        repo: impl Into<String>,
        workflow: impl Into<String>,
    ) -> Self {
        Self {
            owner: owner.into(),
            repo: repo.into(),
            workflow: workflow.into(),
        }
    }

    /// Validate caller input of the form `("owner/repo", "workflow.yml")`
    pub fn parse(owner_repo: &str, workflow: &str) -> Result<Self, WorkflowError> {
        let owner_repo = owner_repo.trim();
        let valid_segment = |s: &str| !s.is_empty() && !s.chars().any(is_reserved);

        let mut parts = owner_repo.split('/');
        let (owner, repo) = match (parts.next(), parts.next(), parts.next()) {
            (Some(owner), Some(repo), None) if valid_segment(owner) && valid_segment(repo) => {
                (owner, repo)
            }
            _ => {
                return Err(WorkflowError::Validation(format!(
                    "repository must be in 'owner/repo' form, got '{owner_repo}'"
                )))
            }
        };

        let workflow = workflow.trim();
        if workflow.is_empty() {
            return Err(WorkflowError::Validation(
                "workflow file must not be empty".to_string(),
            ));
        }
        if workflow.chars().any(|c| c == '/' || is_reserved(c)) {
            return Err(WorkflowError::Validation(format!(
                "workflow file must be a plain file name, got '{workflow}'"
            )));
        }

        Ok(Self::new(owner, repo, workflow))
    }
}

/// Characters that would change the meaning of an API path segment
fn is_reserved(c: char) -> bool {
    c.is_whitespace() || matches!(c, '?' | '#' | '%')
}

impl fmt::Display for WorkflowKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}:{}", self.owner, self.repo, self.workflow)
    }
}

/// One tracked workflow
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowRecord {
    pub id: Uuid,
    pub owner: String,
    pub repo: String,
    pub workflow: String,
    pub label: String,
}

impl WorkflowRecord {
    /// New record with a freshly generated id
    pub fn new(key: WorkflowKey, label: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            owner: key.owner,
            repo: key.repo,
            workflow: key.workflow,
            label: label.into(),
        }
    }

    pub fn key(&self) -> WorkflowKey {
        WorkflowKey::new(&self.owner, &self.repo, &self.workflow)
    }

    pub fn matches(&self, key: &WorkflowKey) -> bool {
        self.owner == key.owner && self.repo == key.repo && self.workflow == key.workflow
    }
}

/// Record as it appears in the stored document; older documents lack `id`
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct StoredRecord {
    #[serde(default)]
    pub id: Option<Uuid>,
    pub owner: String,
    pub repo: String,
    pub workflow: String,
    #[serde(default)]
    pub label: String,
}

/// The tracked records in document order, with the version they were read at
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TrackedSet {
    pub records: Vec<WorkflowRecord>,
    /// `None` when the document does not exist yet
    pub version: Option<String>,
}

impl TrackedSet {
    pub fn find(&self, key: &WorkflowKey) -> Option<&WorkflowRecord> {
        self.records.iter().find(|r| r.matches(key))
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Latest-run status of one tracked workflow.
///
/// Exactly one of two shapes: a lookup that succeeded (status fields as
/// reported, possibly all null if the workflow never ran) or a failed lookup
/// (`error` set, status fields null).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusResult {
    #[serde(flatten)]
    pub record: WorkflowRecord,
    pub conclusion: Option<String>,
    pub status: Option<String>,
    pub url: Option<String>,
    pub updated_at: Option<DateTime<Utc>>,
    pub error: Option<String>,
}

impl StatusResult {
    pub fn from_run(record: WorkflowRecord, run: Option<LatestRun>) -> Self {
        let run = run.unwrap_or(LatestRun {
            status: None,
            conclusion: None,
            url: None,
            updated_at: None,
        });
        Self {
            record,
            conclusion: run.conclusion,
            status: run.status,
            url: run.url,
            updated_at: run.updated_at,
            error: None,
        }
    }

    pub fn failed(record: WorkflowRecord, error: impl Into<String>) -> Self {
        Self {
            record,
            conclusion: None,
            status: None,
            url: None,
            updated_at: None,
            error: Some(error.into()),
        }
    }

    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }
}

/// Aggregated status response
#[derive(Debug, Clone, Serialize)]
pub struct StatusReport {
    pub workflows: Vec<StatusResult>,
    pub timestamp: DateTime<Utc>,
    pub count: usize,
}

impl StatusReport {
    pub fn new(workflows: Vec<StatusResult>) -> Self {
        Self {
            count: workflows.len(),
            workflows,
            timestamp: Utc::now(),
        }
    }
}
