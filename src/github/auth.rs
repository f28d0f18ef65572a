// GitHub App authentication: exchange the app's private key for a
// short-lived installation access token and cache it until near expiry.

use super::errors::AuthError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use octocrab::Octocrab;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

#[cfg(test)]
use mockall::automock;

/// Tokens are refreshed once they are within this many seconds of expiry
pub const DEFAULT_REFRESH_MARGIN_SECS: i64 = 60;

/// Short-lived bearer token scoped to one app installation
#[derive(Clone, PartialEq, Eq)]
pub struct InstallationToken {
    pub value: String,
    pub expires_at: DateTime<Utc>,
}

impl InstallationToken {
    pub fn new(value: impl Into<String>, expires_at: DateTime<Utc>) -> Self {
        Self {
            value: value.into(),
            expires_at,
        }
    }

    /// True if the token stays valid for at least `margin` past `now`
    pub fn is_valid_for(&self, margin: chrono::Duration, now: DateTime<Utc>) -> bool {
        self.expires_at - margin > now
    }
}

impl std::fmt::Debug for InstallationToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InstallationToken")
            .field("value", &"<redacted>")
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// Performs one identity-for-token exchange with the external authority
#[cfg_attr(test, automock)]
#[async_trait]
pub trait TokenExchanger: Send + Sync {
    async fn exchange(&self) -> Result<InstallationToken, AuthError>;
}

#[derive(Debug, Deserialize)]
struct InstallationSummary {
    id: u64,
}

#[derive(Debug, Deserialize)]
struct AccessTokenResponse {
    token: String,
    expires_at: DateTime<Utc>,
}

/// Exchanges GitHub App identity material for an installation token
#[derive(Clone)]
pub struct GitHubAppExchanger {
    app_id: Option<u64>,
    private_key: Option<String>,
    installation_id: Option<u64>,
    api_base: String,
}

impl GitHubAppExchanger {
    /// Identity material may be absent; that surfaces as an [`AuthError`]
    /// at exchange time so read-only commands keep working without it.
    pub fn new(
        app_id: Option<u64>,
        private_key: Option<String>,
        installation_id: Option<u64>,
        api_base: impl Into<String>,
    ) -> Self {
        Self {
            app_id,
            private_key,
            installation_id,
            api_base: api_base.into(),
        }
    }

    fn app_client(&self) -> Result<(u64, Octocrab), AuthError> {
        let app_id = self.app_id.ok_or_else(|| {
            AuthError::MissingCredentials("GitHub App id is not configured".to_string())
        })?;
        let pem = self
            .private_key
            .as_deref()
            .filter(|key| !key.trim().is_empty())
            .ok_or_else(|| {
                AuthError::MissingCredentials(
                    "GitHub App private key is not configured".to_string(),
                )
            })?;
        let key = jsonwebtoken::EncodingKey::from_rsa_pem(pem.as_bytes())
            .map_err(|e| AuthError::InvalidPrivateKey(e.to_string()))?;

        let client = Octocrab::builder()
            .base_uri(self.api_base.as_str())?
            .app(app_id.into(), key)
            .build()?;
        Ok((app_id, client))
    }

    async fn resolve_installation(&self, app_id: u64, client: &Octocrab) -> Result<u64, AuthError> {
        if let Some(id) = self.installation_id {
            return Ok(id);
        }

        let installations: Vec<InstallationSummary> =
            client.get("/app/installations", None::<&()>).await?;
        let installation = installations
            .first()
            .map(|i| i.id)
            .ok_or(AuthError::NoInstallation { app_id })?;
        if installations.len() > 1 {
            warn!(
                app_id,
                installation,
                count = installations.len(),
                "GitHub App has several installations; using the first"
            );
        }
        Ok(installation)
    }
}

#[async_trait]
impl TokenExchanger for GitHubAppExchanger {
    async fn exchange(&self) -> Result<InstallationToken, AuthError> {
        let (app_id, client) = self.app_client()?;
        let installation = self.resolve_installation(app_id, &client).await?;

        let response: AccessTokenResponse = client
            .post(
                format!("/app/installations/{installation}/access_tokens"),
                None::<&()>,
            )
            .await?;

        info!(
            app_id,
            installation,
            expires_at = %response.expires_at,
            "Obtained installation access token"
        );
        Ok(InstallationToken::new(response.token, response.expires_at))
    }
}

/// Process-wide installation token cache.
///
/// Starts empty. A caller that finds no token, or one about to expire,
/// performs the exchange while holding the cache lock; concurrent callers
/// wait on that lock and then reuse the fresh token instead of exchanging
/// again.
pub struct CredentialProvider {
    exchanger: Arc<dyn TokenExchanger>,
    cached: Mutex<Option<InstallationToken>>,
    refresh_margin: chrono::Duration,
    exchange_timeout: Duration,
}

impl CredentialProvider {
    pub fn new(exchanger: Arc<dyn TokenExchanger>, exchange_timeout: Duration) -> Self {
        Self {
            exchanger,
            cached: Mutex::new(None),
            refresh_margin: chrono::Duration::seconds(DEFAULT_REFRESH_MARGIN_SECS),
            exchange_timeout,
        }
    }

    pub fn with_refresh_margin(mut self, margin: chrono::Duration) -> Self {
        self.refresh_margin = margin;
        self
    }

    pub async fn get_access_token(&self) -> Result<InstallationToken, AuthError> {
        let mut cached = self.cached.lock().await;

        if let Some(token) = cached.as_ref() {
            if token.is_valid_for(self.refresh_margin, Utc::now()) {
                debug!(expires_at = %token.expires_at, "Using cached installation token");
                return Ok(token.clone());
            }
            debug!(expires_at = %token.expires_at, "Cached installation token is expiring");
        }

        let token = tokio::time::timeout(self.exchange_timeout, self.exchanger.exchange())
            .await
            .map_err(|_| AuthError::Timeout(self.exchange_timeout))??;
        *cached = Some(token.clone());
        Ok(token)
    }
}
