// Document kept as a file in a GitHub repository.
// The blob sha returned by the contents API is the version token; GitHub
// itself rejects a PUT whose sha is stale, which gives us put-if-match.

use super::{StoreError, VersionedBlob, VersionedBlobStore};
use crate::github::errors::api_status;
use crate::github::CredentialProvider;
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use octocrab::Octocrab;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info};
use urlencoding::encode;

#[derive(Debug, Deserialize)]
struct ContentFile {
    sha: String,
    #[serde(default)]
    content: String,
}

#[derive(Debug, Serialize)]
struct RefParams<'a> {
    #[serde(rename = "ref", skip_serializing_if = "Option::is_none")]
    git_ref: Option<&'a str>,
}

#[derive(Debug, Serialize)]
struct PutContentBody<'a> {
    message: &'a str,
    content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    sha: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    branch: Option<&'a str>,
}

#[derive(Debug, Deserialize)]
struct PutContentResponse {
    content: CommittedContent,
}

#[derive(Debug, Deserialize)]
struct CommittedContent {
    sha: String,
}

pub struct GitHubContentsStore {
    credentials: Arc<CredentialProvider>,
    api_base: String,
    owner: String,
    repo: String,
    path: String,
    branch: Option<String>,
}

impl GitHubContentsStore {
    pub fn new(
        credentials: Arc<CredentialProvider>,
        api_base: impl Into<String>,
        owner: impl Into<String>,
        repo: impl Into<String>,
        path: impl Into<String>,
        branch: Option<String>,
    ) -> Self {
        Self {
            credentials,
            api_base: api_base.into(),
            owner: owner.into(),
            repo: repo.into(),
            path: path.into().trim_start_matches('/').to_string(),
            branch,
        }
    }

    fn route(&self) -> String {
        let path: Vec<_> = self.path.split('/').map(encode).collect();
        format!(
            "/repos/{}/{}/contents/{}",
            encode(&self.owner),
            encode(&self.repo),
            path.join("/")
        )
    }

    async fn client(&self) -> Result<Octocrab, StoreError> {
        let token = self
            .credentials
            .get_access_token()
            .await
            .map_err(|e| StoreError::Unavailable(format!("cannot authenticate to GitHub: {e}")))?;
        Octocrab::builder()
            .base_uri(self.api_base.as_str())
            .and_then(|builder| builder.personal_token(token.value).build())
            .map_err(|e| StoreError::Unavailable(e.to_string()))
    }
}

#[async_trait]
impl VersionedBlobStore for GitHubContentsStore {
    async fn get(&self) -> Result<Option<VersionedBlob>, StoreError> {
        let client = self.client().await?;
        let params = RefParams {
            git_ref: self.branch.as_deref(),
        };

        let file: ContentFile = match client.get(self.route(), Some(&params)).await {
            Ok(file) => file,
            Err(e) if matches!(api_status(&e), Some((404, _))) => {
                debug!(store = %self.describe(), "Config document does not exist yet");
                return Ok(None);
            }
            Err(e) => return Err(StoreError::Unavailable(e.to_string())),
        };

        // The API wraps base64 content at 60 columns.
        let encoded: String = file.content.chars().filter(|c| !c.is_whitespace()).collect();
        let contents = STANDARD
            .decode(encoded)
            .map_err(|e| StoreError::Unavailable(format!("undecodable document content: {e}")))?;
        Ok(Some(VersionedBlob {
            contents,
            version: file.sha,
        }))
    }

    async fn put_if_match(
        &self,
        contents: Vec<u8>,
        expected: Option<&str>,
    ) -> Result<String, StoreError> {
        let client = self.client().await?;
        let body = PutContentBody {
            message: "Update tracked workflows",
            content: STANDARD.encode(contents),
            sha: expected,
            branch: self.branch.as_deref(),
        };

        match client
            .put::<PutContentResponse, _, _>(self.route(), Some(&body))
            .await
        {
            Ok(response) => {
                info!(store = %self.describe(), sha = %response.content.sha, "Committed config document");
                Ok(response.content.sha)
            }
            Err(e) => match api_status(&e) {
                // 409: sha does not match
                Some((409, _)) => Err(StoreError::VersionConflict),
                // 422 also covers a bad branch or path; only sha complaints
                // mean someone else created or changed the file
                Some((422, message)) if expected.is_none() || message.contains("sha") => {
                    Err(StoreError::VersionConflict)
                }
                _ => Err(StoreError::Unavailable(e.to_string())),
            },
        }
    }

    fn describe(&self) -> String {
        match &self.branch {
            Some(branch) => format!("github:{}/{}@{}:{}", self.owner, self.repo, branch, self.path),
            None => format!("github:{}/{}:{}", self.owner, self.repo, self.path),
        }
    }
}
