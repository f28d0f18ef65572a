use anyhow::{Context, Result};
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

const CONFIG_FILE_STEM: &str = "workflow-hub";
const ENV_PREFIX: &str = "WORKFLOW_HUB";

/// Main configuration structure for the workflow hub
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct HubConfig {
    /// GitHub App identity and API settings
    pub github: GitHubConfig,
    /// Where the tracked-workflow document lives
    pub store: StoreConfig,
    /// Status aggregation settings
    pub aggregation: AggregationConfig,
    /// Add/remove settings
    pub mutations: MutationConfig,
    /// Logging settings
    pub observability: ObservabilityConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct GitHubConfig {
    /// GitHub App id
    pub app_id: Option<u64>,
    /// PEM-encoded private key of the app
    pub private_key: Option<String>,
    /// Alternative to `private_key`: path to the PEM file
    pub private_key_path: Option<PathBuf>,
    /// Installation to act as; the app's first installation if unset
    pub installation_id: Option<u64>,
    /// API root, overridable for GitHub Enterprise
    pub api_base: String,
    /// Client-side rate limit for status queries
    pub requests_per_second: u32,
}

impl Default for GitHubConfig {
    fn default() -> Self {
        Self {
            app_id: None,
            private_key: None,
            private_key_path: None,
            installation_id: None,
            api_base: "https://api.github.com".to_string(),
            requests_per_second: 10,
        }
    }
}

impl GitHubConfig {
    /// The private key, read from `private_key_path` if not given inline
    pub fn private_key_pem(&self) -> Result<Option<String>> {
        if let Some(key) = self.private_key.as_ref().filter(|k| !k.trim().is_empty()) {
            // Keys passed through env vars often carry literal "\n" sequences
            return Ok(Some(key.replace("\\n", "\n")));
        }
        match &self.private_key_path {
            Some(path) => std::fs::read_to_string(path)
                .map(Some)
                .with_context(|| format!("Failed to read private key from {}", path.display())),
            None => Ok(None),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    File,
    Github,
    Memory,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct StoreConfig {
    pub backend: StoreBackend,
    /// File path (file backend) or path inside the repository (github backend)
    pub path: String,
    /// `owner/repo` holding the document (github backend)
    pub repo: Option<String>,
    /// Branch holding the document (github backend); default branch if unset
    pub branch: Option<String>,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::File,
            path: "workflows.json".to_string(),
            repo: None,
            branch: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AggregationConfig {
    /// Bound on the token exchange and on every status query
    pub request_timeout_seconds: u64,
    /// Status queries in flight at once
    pub max_concurrency: usize,
}

impl Default for AggregationConfig {
    fn default() -> Self {
        Self {
            request_timeout_seconds: 5,
            max_concurrency: 8,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct MutationConfig {
    /// Attempts per add/remove before giving up on version conflicts
    pub max_attempts: u32,
    /// Base delay between attempts in milliseconds
    pub backoff_ms: u64,
}

impl Default for MutationConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff_ms: 25,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Default log filter when RUST_LOG is not set
    pub log_level: String,
    /// Emit JSON log lines instead of human-readable ones
    pub json: bool,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            json: true,
        }
    }
}

impl HubConfig {
    /// Load configuration with precedence:
    /// 1. Default values
    /// 2. `workflow-hub.toml` in the working directory, or `path` if given
    /// 3. Environment variables (`WORKFLOW_HUB_GITHUB__APP_ID=...`)
    pub fn load_from(path: Option<&Path>) -> Result<Self> {
        let mut builder = Config::builder();

        match path {
            Some(path) => {
                builder = builder.add_source(File::from(path));
            }
            None => {
                if Path::new(&format!("{CONFIG_FILE_STEM}.toml")).exists() {
                    builder = builder.add_source(File::with_name(CONFIG_FILE_STEM));
                }
            }
        }

        builder = builder.add_source(
            Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let config = builder.build()?;
        let hub_config: HubConfig = config.try_deserialize()?;
        Ok(hub_config)
    }

    pub fn load() -> Result<Self> {
        Self::load_from(None)
    }

    /// Load .env file if it exists
    pub fn load_env_file() -> Result<()> {
        if Path::new(".env").exists() {
            dotenvy::dotenv()?;
            tracing::info!("Loaded environment variables from .env file");
        }
        Ok(())
    }
}

/// Global configuration instance
static CONFIG: std::sync::LazyLock<Result<HubConfig, anyhow::Error>> =
    std::sync::LazyLock::new(|| {
        let _ = HubConfig::load_env_file();
        HubConfig::load()
    });

/// Get the global configuration
pub fn config() -> Result<&'static HubConfig> {
    CONFIG
        .as_ref()
        .map_err(|e| anyhow::anyhow!("Failed to load configuration: {}", e))
}
