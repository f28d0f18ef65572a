use std::time::Duration;
use thiserror::Error;

/// Failures while obtaining an installation access token
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("GitHub App credentials missing: {0}")]
    MissingCredentials(String),
    #[error("GitHub App private key is not a valid RSA PEM key: {0}")]
    InvalidPrivateKey(String),
    #[error("no installation found for GitHub App {app_id}")]
    NoInstallation { app_id: u64 },
    #[error("token exchange rejected (HTTP {status}): {message}")]
    Rejected { status: u16, message: String },
    #[error("token exchange failed: {0}")]
    Exchange(String),
    #[error("token exchange timed out after {}ms", .0.as_millis())]
    Timeout(Duration),
}

/// Failures while looking up the latest run of a single workflow
#[derive(Debug, Clone, Error, PartialEq)]
pub enum StatusQueryError {
    #[error("workflow or repository not found")]
    NotFound,
    #[error("GitHub API rate limit exceeded")]
    RateLimited,
    #[error("GitHub API error (HTTP {status}): {message}")]
    Api { status: u16, message: String },
    #[error("request to GitHub failed: {0}")]
    Transport(String),
    #[error("status query timed out after {}ms", .0.as_millis())]
    Timeout(Duration),
}

/// HTTP status and message of an API-level octocrab error, if it is one
pub(crate) fn api_status(err: &octocrab::Error) -> Option<(u16, String)> {
    match err {
        octocrab::Error::GitHub { source, .. } => {
            Some((source.status_code.as_u16(), source.message.clone()))
        }
        _ => None,
    }
}

fn is_rate_limit(status: u16, message: &str) -> bool {
    status == 429 || (status == 403 && message.to_lowercase().contains("rate limit"))
}

impl From<octocrab::Error> for StatusQueryError {
    fn from(err: octocrab::Error) -> Self {
        match api_status(&err) {
            Some((404, _)) => StatusQueryError::NotFound,
            Some((status, message)) if is_rate_limit(status, &message) => {
                StatusQueryError::RateLimited
            }
            Some((status, message)) => StatusQueryError::Api { status, message },
            None => StatusQueryError::Transport(err.to_string()),
        }
    }
}

impl From<octocrab::Error> for AuthError {
    fn from(err: octocrab::Error) -> Self {
        match api_status(&err) {
            Some((status, message)) => AuthError::Rejected { status, message },
            None => AuthError::Exchange(err.to_string()),
        }
    }
}
