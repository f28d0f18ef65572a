// Workflow Hub Library - GitHub Actions workflow tracking and status aggregation
// This exposes the core components for the command line and for embedding

pub mod config;
pub mod github;
pub mod service;
pub mod store;
pub mod telemetry;
pub mod workflows;

// Re-export key types for easy access
pub use config::{config, HubConfig};
pub use github::{AuthError, CredentialProvider, InstallationToken, StatusQueryError};
pub use service::{AddWorkflowRequest, RemoveWorkflowRequest, WorkflowService};
pub use store::{StoreError, VersionedBlobStore};
pub use telemetry::{generate_correlation_id, init_telemetry};
pub use workflows::{
    ErrorBody, ErrorKind, MutationEngine, StatusAggregator, StatusReport, StatusResult,
    WorkflowError, WorkflowRecord,
};
