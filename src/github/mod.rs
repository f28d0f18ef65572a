pub mod actions;
pub mod auth;
pub mod errors;

pub use actions::{GitHubActionsClient, LatestRun, WorkflowRunSource};
pub use auth::{CredentialProvider, GitHubAppExchanger, InstallationToken, TokenExchanger};
pub use errors::{AuthError, StatusQueryError};
