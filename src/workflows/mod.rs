pub mod aggregator;
pub mod config_store;
pub mod errors;
pub mod mutations;
pub mod types;

pub use aggregator::StatusAggregator;
pub use config_store::ConfigStore;
pub use errors::{ErrorBody, ErrorKind, WorkflowError};
pub use mutations::MutationEngine;
pub use types::{StatusReport, StatusResult, TrackedSet, WorkflowKey, WorkflowRecord};
