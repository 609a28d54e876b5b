//! Agent configuration

use anyhow::{Context, Result};
use pulse_lib::cycle::CycleConfig;
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

/// Optional config file stem, resolved as `k8spulse.{toml,yaml,json}`
const CONFIG_FILE: &str = "k8spulse";

/// Agent configuration
#[derive(Debug, Clone, Deserialize)]
pub struct PulseConfig {
    /// Environment label used in report file names and commit messages
    #[serde(default = "default_env_name")]
    pub env_name: String,

    /// Pause between monitoring cycles in seconds
    #[serde(default = "default_interval")]
    pub interval_secs: u64,

    /// History shown in the report
    #[serde(default = "default_history_window")]
    pub history_window_hours: u64,

    #[serde(default = "default_database_path")]
    pub database_path: PathBuf,

    /// Directory receiving the HTML reports and index
    #[serde(default = "default_docs_dir")]
    pub docs_dir: PathBuf,

    /// API server port for health/metrics/history
    #[serde(default = "default_api_port")]
    pub api_port: u16,

    /// Ask the recommender for an HTML recommendation each cycle
    #[serde(default)]
    pub use_ai: bool,

    #[serde(default = "default_gpt_model")]
    pub gpt_model: String,

    #[serde(default = "default_openai_base_url")]
    pub openai_base_url: String,

    /// Commit and push each report
    #[serde(default)]
    pub git_commit: bool,

    /// Scan long-lived non-running pods for zombie processes
    #[serde(default)]
    pub zombies: bool,

    /// Fetch CAST AI audit events into the report
    #[serde(default)]
    pub audit_events: bool,
}

fn default_env_name() -> String {
    "staging".to_string()
}

fn default_interval() -> u64 {
    300
}

fn default_history_window() -> u64 {
    24
}

fn default_database_path() -> PathBuf {
    PathBuf::from("k8spulse.db")
}

fn default_docs_dir() -> PathBuf {
    PathBuf::from("docs")
}

fn default_api_port() -> u16 {
    8080
}

fn default_gpt_model() -> String {
    "gpt-4o".to_string()
}

fn default_openai_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}

impl Default for PulseConfig {
    fn default() -> Self {
        Self {
            env_name: default_env_name(),
            interval_secs: default_interval(),
            history_window_hours: default_history_window(),
            database_path: default_database_path(),
            docs_dir: default_docs_dir(),
            api_port: default_api_port(),
            use_ai: false,
            gpt_model: default_gpt_model(),
            openai_base_url: default_openai_base_url(),
            git_commit: false,
            zombies: false,
            audit_events: false,
        }
    }
}

impl PulseConfig {
    /// Load configuration from an optional `k8spulse.*` file and `PULSE_*` variables
    pub fn load() -> Result<Self> {
        let config = config::Config::builder()
            .add_source(config::File::with_name(CONFIG_FILE).required(false))
            .add_source(config::Environment::with_prefix("PULSE").try_parsing(true))
            .build()
            .context("Failed to read configuration")?;

        config
            .try_deserialize()
            .context("Invalid configuration")
    }

    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    /// Settings handed to each monitoring cycle
    pub fn cycle_config(&self) -> CycleConfig {
        CycleConfig {
            env_name: self.env_name.clone(),
            docs_dir: self.docs_dir.clone(),
            history_window: Duration::from_secs(self.history_window_hours.saturating_mul(3600)),
            gpt_model: self.gpt_model.clone(),
            zombies: self.zombies,
            ..CycleConfig::default()
        }
    }
}
