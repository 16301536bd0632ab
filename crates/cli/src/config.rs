use anyhow::{Context, Result};
use orchestrator::ExecutorConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

pub const PHASEFLOW_DIR: &str = ".phaseflow";
pub const CONFIG_FILE: &str = "config.toml";
pub const DEFAULT_PORT: u16 = 3001;
pub const DEFAULT_OPENCODE_URL: &str = "http://localhost:4096";
const DEFAULT_DB_PATH: &str = ".phaseflow/phaseflow.db";

/// Contents of `.phaseflow/config.toml`. Missing keys take their defaults.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PhaseflowConfig {
    pub server: ServerConfig,
    pub opencode: OpenCodeConfig,
    pub database: DatabaseConfig,
    pub orchestrator: OrchestratorSettings,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { port: DEFAULT_PORT }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OpenCodeConfig {
    pub url: String,
    /// Provider and model sent with every prompt; the agent's default when unset
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model_id: Option<String>,
}

impl Default for OpenCodeConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_OPENCODE_URL.to_string(),
            provider_id: None,
            model_id: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub path: PathBuf,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from(DEFAULT_DB_PATH),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OrchestratorSettings {
    pub session_timeout_secs: u64,
    pub base_branch: String,
    pub max_judge_iterations: u32,
    pub draft_pull_requests: bool,
    pub repo_path: PathBuf,
}

impl Default for OrchestratorSettings {
    fn default() -> Self {
        Self {
            session_timeout_secs: 300,
            base_branch: "main".to_string(),
            max_judge_iterations: 2,
            draft_pull_requests: false,
            repo_path: PathBuf::from("."),
        }
    }
}

impl OrchestratorSettings {
    /// Engine settings with `repo_path` resolved against the project root
    pub fn executor_config(&self, root: &Path) -> ExecutorConfig {
        ExecutorConfig::new(resolve(root, &self.repo_path))
            .with_session_timeout(Duration::from_secs(self.session_timeout_secs))
            .with_base_branch(self.base_branch.clone())
            .with_max_judge_iterations(self.max_judge_iterations)
            .with_draft_pull_requests(self.draft_pull_requests)
    }
}

impl PhaseflowConfig {
    pub fn path(root: &Path) -> PathBuf {
        root.join(PHASEFLOW_DIR).join(CONFIG_FILE)
    }

    /// Read the project config, falling back to defaults when there is none
    pub async fn load(root: &Path) -> Result<Self> {
        let path = Self::path(root);
        if !tokio::fs::try_exists(&path).await.unwrap_or(false) {
            debug!(path = %path.display(), "Config file does not exist, using defaults");
            return Ok(Self::default());
        }

        let content = tokio::fs::read_to_string(&path)
            .await
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse {}", path.display()))?;
        debug!(path = %path.display(), "Config loaded");
        Ok(config)
    }

    pub async fn save(&self, root: &Path) -> Result<PathBuf> {
        let path = Self::path(root);
        tokio::fs::create_dir_all(root.join(PHASEFLOW_DIR)).await?;
        tokio::fs::write(&path, toml::to_string_pretty(self)?).await?;
        Ok(path)
    }

    pub fn database_path(&self, root: &Path) -> PathBuf {
        resolve(root, &self.database.path)
    }
}

fn resolve(root: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        root.join(path)
    }
}
