//! Daemon settings
//!
//! Settings are read from a JSON file and layered with `NOTIFYGUARD_*`
//! environment overrides. Every key is optional: anything missing falls back
//! to its default, and a file that cannot be read or parsed yields the full
//! default set rather than stopping the daemon.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{error, warn};

/// Directory holding the config and state files
pub const DEFAULT_CONFIG_DIR: &str = "/var/cpanel/uniquenotify";

/// Config file name inside [`DEFAULT_CONFIG_DIR`]
pub const CONFIG_FILE_NAME: &str = "config.json";

/// State file name, stored next to the config file unless overridden
pub const STATE_FILE_NAME: &str = "state.json";

const ENV_PREFIX: &str = "NOTIFYGUARD";

/// Longest accepted cooldown, one year
pub const MAX_COOLDOWN_MINUTES: u64 = 365 * 24 * 60;

/// Convert a cooldown in minutes, capping it at [`MAX_COOLDOWN_MINUTES`]
pub fn cooldown_duration(minutes: u64) -> chrono::Duration {
    chrono::Duration::minutes(minutes.min(MAX_COOLDOWN_MINUTES) as i64)
}

/// Default location of the config file
pub fn default_config_path() -> PathBuf {
    Path::new(DEFAULT_CONFIG_DIR).join(CONFIG_FILE_NAME)
}

/// Alerting and collection settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GuardSettings {
    /// CPU percentage at or above which an account is alerted
    #[serde(default = "default_threshold_cpu")]
    pub threshold_cpu: f64,

    /// Minimum minutes between two alerts for the same account
    #[serde(default = "default_cooldown_minutes")]
    pub cooldown_minutes: u64,

    /// Daily quiet window, `"HH:MM-HH:MM"`, empty to disable
    #[serde(default)]
    pub quiet_hours: String,

    #[serde(default)]
    pub telegram: TelegramSettings,

    /// Sample usage through CloudLinux `lveinfo`
    #[serde(default = "default_true")]
    pub use_cloudlinux: bool,

    /// Seconds between scheduling cycles
    #[serde(default = "default_interval_seconds")]
    pub interval_seconds: u64,

    /// Global cap on alerts within the sliding hourly window
    #[serde(default = "default_max_alerts_per_hour")]
    pub max_alerts_per_hour: u32,

    /// Host name printed in alert messages; detected at runtime when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hostname: Option<String>,

    /// State file location; defaults to `state.json` beside the config file
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state_file: Option<PathBuf>,

    /// Upper bound on a single notification attempt
    #[serde(default = "default_notify_timeout_seconds")]
    pub notify_timeout_seconds: u64,

    #[serde(default = "default_lveinfo_path")]
    pub lveinfo_path: String,

    #[serde(default = "default_lveinfo_timeout_seconds")]
    pub lveinfo_timeout_seconds: u64,
}

/// Telegram destination credentials
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TelegramSettings {
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default)]
    pub bot_token: String,

    #[serde(default)]
    pub chat_id: String,

    /// Bot API base URL
    #[serde(default = "default_api_base")]
    pub api_base: String,
}

impl Default for TelegramSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            bot_token: String::new(),
            chat_id: String::new(),
            api_base: default_api_base(),
        }
    }
}

impl TelegramSettings {
    /// Both the bot token and chat id are set
    pub fn is_configured(&self) -> bool {
        !self.bot_token.trim().is_empty() && !self.chat_id.trim().is_empty()
    }

    /// Bot token with everything but the last four characters hidden
    pub fn masked_token(&self) -> String {
        let token = self.bot_token.trim();
        if token.is_empty() {
            return String::new();
        }
        let visible: String = token
            .chars()
            .rev()
            .take(4)
            .collect::<Vec<_>>()
            .into_iter()
            .rev()
            .collect();
        format!("****{}", visible)
    }
}

fn default_threshold_cpu() -> f64 {
    90.0
}

fn default_cooldown_minutes() -> u64 {
    30
}

fn default_true() -> bool {
    true
}

fn default_interval_seconds() -> u64 {
    120
}

fn default_max_alerts_per_hour() -> u32 {
    10
}

fn default_notify_timeout_seconds() -> u64 {
    10
}

fn default_lveinfo_path() -> String {
    "lveinfo".to_string()
}

fn default_lveinfo_timeout_seconds() -> u64 {
    30
}

fn default_api_base() -> String {
    "https://api.telegram.org".to_string()
}

fn detect_hostname() -> String {
    if let Ok(name) = std::env::var("HOSTNAME") {
        if !name.trim().is_empty() {
            return name.trim().to_string();
        }
    }

    ["/proc/sys/kernel/hostname", "/etc/hostname"]
        .iter()
        .filter_map(|path| std::fs::read_to_string(path).ok())
        .map(|name| name.trim().to_string())
        .find(|name| !name.is_empty())
        .unwrap_or_else(|| "unknown".to_string())
}

impl Default for GuardSettings {
    fn default() -> Self {
        Self {
            threshold_cpu: default_threshold_cpu(),
            cooldown_minutes: default_cooldown_minutes(),
            quiet_hours: String::new(),
            telegram: TelegramSettings::default(),
            use_cloudlinux: true,
            interval_seconds: default_interval_seconds(),
            max_alerts_per_hour: default_max_alerts_per_hour(),
            hostname: None,
            state_file: None,
            notify_timeout_seconds: default_notify_timeout_seconds(),
            lveinfo_path: default_lveinfo_path(),
            lveinfo_timeout_seconds: default_lveinfo_timeout_seconds(),
        }
    }
}

impl GuardSettings {
    /// Load settings from `path` plus environment overrides
    ///
    /// A missing file is not an error; parse and type errors are.
    pub fn load(path: &Path) -> Result<Self, config::ConfigError> {
        let settings = config::Config::builder()
            .add_source(
                config::File::from(path)
                    .format(config::FileFormat::Json)
                    .required(false),
            )
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let loaded: GuardSettings = settings.try_deserialize()?;
        Ok(loaded.sanitized())
    }

    /// Load settings for the daemon, never failing
    ///
    /// Writes a default file when none exists so operators have something to edit.
    pub fn load_or_default(path: &Path) -> Self {
        if !path.exists() {
            warn!(path = %path.display(), "Config file not found, using defaults");
            let defaults = Self::default();
            if let Err(e) = defaults.save(path) {
                warn!(path = %path.display(), error = %e, "Failed to write default config file");
            }
        }

        match Self::load(path) {
            Ok(settings) => settings,
            Err(e) => {
                error!(path = %path.display(), error = %e, "Failed to load config, using defaults");
                Self::default()
            }
        }
    }

    /// Write settings as pretty JSON, readable only by the owner
    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        use anyhow::Context;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory {:?}", parent))?;
        }

        let json = serde_json::to_string_pretty(self).context("Failed to serialize settings")?;
        std::fs::write(path, json).with_context(|| format!("Failed to write {:?}", path))?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))
                .with_context(|| format!("Failed to restrict permissions on {:?}", path))?;
        }

        Ok(())
    }

    /// Replace out-of-range values with defaults
    pub fn sanitized(mut self) -> Self {
        if self.interval_seconds == 0 {
            warn!(
                default = default_interval_seconds(),
                "interval_seconds must be positive, using default"
            );
            self.interval_seconds = default_interval_seconds();
        }
        if !self.threshold_cpu.is_finite() {
            warn!(
                default = default_threshold_cpu(),
                "threshold_cpu is not a finite number, using default"
            );
            self.threshold_cpu = default_threshold_cpu();
        }
        if self.notify_timeout_seconds == 0 {
            self.notify_timeout_seconds = default_notify_timeout_seconds();
        }
        if self.lveinfo_timeout_seconds == 0 {
            self.lveinfo_timeout_seconds = default_lveinfo_timeout_seconds();
        }
        if self.cooldown_minutes > MAX_COOLDOWN_MINUTES {
            warn!(
                cooldown_minutes = self.cooldown_minutes,
                max = MAX_COOLDOWN_MINUTES,
                "cooldown_minutes is too large, capping"
            );
            self.cooldown_minutes = MAX_COOLDOWN_MINUTES;
        }
        if self
            .hostname
            .as_deref()
            .map_or(false, |name| name.trim().is_empty())
        {
            self.hostname = None;
        }
        self
    }

    /// Where alert state is persisted, given the config file location
    pub fn state_path(&self, config_path: &Path) -> PathBuf {
        match &self.state_file {
            Some(path) => path.clone(),
            None => config_path
                .parent()
                .unwrap_or_else(|| Path::new(DEFAULT_CONFIG_DIR))
                .join(STATE_FILE_NAME),
        }
    }

    /// Configured host name, or the one detected from the environment
    pub fn hostname(&self) -> String {
        match self.hostname.as_deref().map(str::trim) {
            Some(name) if !name.is_empty() => name.to_string(),
            _ => detect_hostname(),
        }
    }

    /// Cooldown as a chrono duration, capped at [`MAX_COOLDOWN_MINUTES`]
    pub fn cooldown(&self) -> chrono::Duration {
        cooldown_duration(self.cooldown_minutes)
    }

    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_seconds)
    }

    pub fn notify_timeout(&self) -> Duration {
        Duration::from_secs(self.notify_timeout_seconds)
    }

    pub fn lveinfo_timeout(&self) -> Duration {
        Duration::from_secs(self.lveinfo_timeout_seconds)
    }

    /// How long the scheduler may go without finishing a cycle before it is unhealthy
    ///
    /// Three intervals plus the slowest possible cycle: the lveinfo timeout
    /// and one delivery timeout per alert the hourly cap allows.
    pub fn stall_timeout(&self) -> chrono::Duration {
        let limit = self
            .interval()
            .saturating_mul(3)
            .saturating_add(self.lveinfo_timeout())
            .saturating_add(self.notify_timeout().saturating_mul(self.max_alerts_per_hour));
        chrono::Duration::from_std(limit).unwrap_or(chrono::Duration::MAX)
    }
}
