//! Configuration for the bbr command.
//!
//! Loads configuration from a TOML file. `BBR_CONFIG` names the file when
//! `--config` is not given and `BBR_LOG_LEVEL` overrides the configured log
//! level; both may come from a `.env` file.

use bbr_core::job::JobProperties;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const CONFIG_ENV: &str = "BBR_CONFIG";
pub const LOG_LEVEL_ENV: &str = "BBR_LOG_LEVEL";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub log: LogConfig,

    #[serde(default)]
    pub orchestrator: OrchestratorConfig,

    #[serde(default)]
    pub deployments: Vec<DeploymentConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    /// Run the executables of a phase concurrently
    #[serde(default = "default_parallel")]
    pub parallel: bool,

    /// Percentage step between transfer progress log lines
    #[serde(default = "default_progress_increment")]
    pub progress_increment: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeploymentConfig {
    pub name: String,

    /// Deployment manifest saved with `backup --with-manifest`
    #[serde(default)]
    pub manifest: Option<PathBuf>,

    #[serde(default)]
    pub instances: Vec<InstanceConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstanceConfig {
    /// Instance group name
    pub name: String,

    #[serde(default = "default_index")]
    pub index: String,

    pub id: String,

    pub host: String,

    #[serde(default = "default_ssh_port")]
    pub port: u16,

    #[serde(default = "default_username")]
    pub username: String,

    pub private_key: PathBuf,

    /// Runs the backup script of backup-one-restore-all jobs
    #[serde(default)]
    pub bootstrap: bool,

    #[serde(default)]
    pub jobs: Vec<JobProperties>,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_parallel() -> bool {
    true
}

fn default_progress_increment() -> u64 {
    bbr_core::transfer::DEFAULT_PROGRESS_INCREMENT
}

fn default_index() -> String {
    "0".to_string()
}

fn default_ssh_port() -> u16 {
    22
}

fn default_username() -> String {
    "vcap".to_string()
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            parallel: default_parallel(),
            progress_increment: default_progress_increment(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("Unable to read config {}: {}", path.display(), e))?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    /// Resolve the configuration from `--config`, then `BBR_CONFIG`, falling
    /// back to the defaults. `BBR_LOG_LEVEL` wins over the file.
    pub fn load(explicit: Option<&Path>) -> anyhow::Result<Self> {
        let _ = dotenvy::dotenv();

        let path = explicit
            .map(Path::to_path_buf)
            .or_else(|| std::env::var_os(CONFIG_ENV).map(PathBuf::from));
        let mut config = match path {
            Some(path) => Self::from_file(&path)?,
            None => Self::default(),
        };

        if let Ok(level) = std::env::var(LOG_LEVEL_ENV) {
            config.log.level = level;
        }
        Ok(config)
    }

    pub fn deployment(&self, name: &str) -> Option<&DeploymentConfig> {
        self.deployments.iter().find(|d| d.name == name)
    }
}
