//! Daemon process configuration
//!
//! These settings describe how the daemon itself runs. Alerting behaviour
//! lives in the JSON config file at `config_path`.

use agent_lib::settings::default_config_path;
use anyhow::Result;
use serde::Deserialize;
use std::path::PathBuf;

/// Daemon configuration, read from `AGENT_*` environment variables
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct AgentConfig {
    /// Path of the alerting config file
    #[serde(default = "default_config_path")]
    pub config_path: PathBuf,

    /// API server port for health/metrics
    #[serde(default = "default_api_port")]
    pub api_port: u16,

    /// `json` (default) or `pretty`
    #[serde(default = "default_log_format")]
    pub log_format: String,
}

fn default_api_port() -> u16 {
    9187
}

fn default_log_format() -> String {
    "json".to_string()
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            config_path: default_config_path(),
            api_port: default_api_port(),
            log_format: default_log_format(),
        }
    }
}

impl AgentConfig {
    /// Load configuration from the environment
    pub fn load() -> Result<Self> {
        let config = config::Config::builder()
            .add_source(config::Environment::with_prefix("AGENT").try_parsing(true))
            .build()?;

        Ok(config.try_deserialize()?)
    }

    pub fn pretty_logs(&self) -> bool {
        self.log_format.eq_ignore_ascii_case("pretty")
    }
}
