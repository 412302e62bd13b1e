//! Viewing and editing the alerting config file

use agent_lib::alerting::QuietHours;
use agent_lib::settings::{GuardSettings, MAX_COOLDOWN_MINUTES};
use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;
use serde::Serialize;
use std::path::Path;
use tabled::Tabled;

use crate::output::{print_info, print_json, print_success, print_table, OutputFormat};

/// Settings changes accepted by `ngctl config set`
#[derive(Debug, Clone, Default, Args)]
pub struct ConfigUpdate {
    /// CPU percentage that triggers an alert
    #[arg(long)]
    pub threshold_cpu: Option<f64>,

    /// Minimum minutes between alerts for one account
    #[arg(long)]
    pub cooldown_minutes: Option<u64>,

    /// Silence window as HH:MM-HH:MM, or "" to disable
    #[arg(long)]
    pub quiet_hours: Option<String>,

    /// Seconds between monitoring cycles
    #[arg(long)]
    pub interval_seconds: Option<u64>,

    /// Alerts allowed per hour across all accounts
    #[arg(long)]
    pub max_alerts_per_hour: Option<u32>,

    /// Telegram bot token
    #[arg(long)]
    pub bot_token: Option<String>,

    /// Telegram chat id
    #[arg(long)]
    pub chat_id: Option<String>,

    /// Enable or disable Telegram delivery
    #[arg(long)]
    pub telegram_enabled: Option<bool>,

    /// Read usage from CloudLinux lveinfo
    #[arg(long)]
    pub use_cloudlinux: Option<bool>,
}

impl ConfigUpdate {
    fn is_empty(&self) -> bool {
        self.threshold_cpu.is_none()
            && self.cooldown_minutes.is_none()
            && self.quiet_hours.is_none()
            && self.interval_seconds.is_none()
            && self.max_alerts_per_hour.is_none()
            && self.bot_token.is_none()
            && self.chat_id.is_none()
            && self.telegram_enabled.is_none()
            && self.use_cloudlinux.is_none()
    }

    /// Validate and merge into `settings`
    pub fn apply(&self, settings: &mut GuardSettings) -> Result<()> {
        if let Some(threshold) = self.threshold_cpu {
            if !threshold.is_finite() || threshold <= 0.0 {
                anyhow::bail!("threshold-cpu must be a positive number, got {}", threshold);
            }
            settings.threshold_cpu = threshold;
        }
        if let Some(range) = &self.quiet_hours {
            QuietHours::parse(range)
                .with_context(|| format!("Invalid quiet hours {:?}", range))?;
            settings.quiet_hours = range.trim().to_string();
        }
        if let Some(interval) = self.interval_seconds {
            if interval == 0 {
                anyhow::bail!("interval-seconds must be greater than zero");
            }
            settings.interval_seconds = interval;
        }
        if let Some(minutes) = self.cooldown_minutes {
            if minutes > MAX_COOLDOWN_MINUTES {
                anyhow::bail!("cooldown-minutes must be at most {MAX_COOLDOWN_MINUTES} (one year)");
            }
            settings.cooldown_minutes = minutes;
        }
        if let Some(max) = self.max_alerts_per_hour {
            settings.max_alerts_per_hour = max;
        }
        if let Some(token) = &self.bot_token {
            settings.telegram.bot_token = token.trim().to_string();
        }
        if let Some(chat_id) = &self.chat_id {
            settings.telegram.chat_id = chat_id.trim().to_string();
        }
        if let Some(enabled) = self.telegram_enabled {
            settings.telegram.enabled = enabled;
        }
        if let Some(use_cloudlinux) = self.use_cloudlinux {
            settings.use_cloudlinux = use_cloudlinux;
        }
        Ok(())
    }
}

/// Row for the settings table
#[derive(Tabled, Serialize)]
struct SettingRow {
    #[tabled(rename = "Setting")]
    key: &'static str,
    #[tabled(rename = "Value")]
    value: String,
}

fn setting_rows(settings: &GuardSettings, state_path: &Path) -> Vec<SettingRow> {
    let row = |key, value: String| SettingRow { key, value };
    let quiet = if settings.quiet_hours.is_empty() {
        "(none)".to_string()
    } else {
        settings.quiet_hours.clone()
    };

    vec![
        row("threshold_cpu", format!("{}%", settings.threshold_cpu)),
        row("cooldown_minutes", settings.cooldown_minutes.to_string()),
        row("quiet_hours", quiet),
        row("interval_seconds", settings.interval_seconds.to_string()),
        row("max_alerts_per_hour", settings.max_alerts_per_hour.to_string()),
        row("use_cloudlinux", settings.use_cloudlinux.to_string()),
        row("hostname", settings.hostname()),
        row("telegram.enabled", settings.telegram.enabled.to_string()),
        row("telegram.bot_token", settings.telegram.masked_token()),
        row("telegram.chat_id", settings.telegram.chat_id.clone()),
        row("state_file", state_path.display().to_string()),
    ]
}

/// Print the effective settings with the bot token masked
pub fn show(config_path: &Path, format: OutputFormat) -> Result<()> {
    let settings = GuardSettings::load(config_path)
        .with_context(|| format!("Failed to load {}", config_path.display()))?;
    let state_path = settings.state_path(config_path);

    match format {
        OutputFormat::Json => {
            let mut masked = settings.clone();
            masked.telegram.bot_token = settings.telegram.masked_token();
            print_json(&masked)?;
        }
        OutputFormat::Table => {
            println!("{}", "NotifyGuard Configuration".bold());
            println!("{}", "=".repeat(60));
            println!("File: {}", config_path.display().to_string().cyan());
            if !config_path.exists() {
                print_info("File does not exist yet, showing defaults");
            }
            println!();
            print_table(&setting_rows(&settings, &state_path));
        }
    }

    Ok(())
}

/// Apply `update` to the config file
pub fn set(config_path: &Path, update: &ConfigUpdate) -> Result<()> {
    if update.is_empty() {
        anyhow::bail!("Nothing to change; pass at least one setting flag");
    }

    let mut settings = GuardSettings::load(config_path)
        .with_context(|| format!("Failed to load {}", config_path.display()))?;
    update.apply(&mut settings)?;
    settings.save(config_path)?;

    print_success(&format!("Configuration saved to {}", config_path.display()));
    print_info("Restart the notifyguard service for changes to take effect");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_apply_merges_only_given_fields() {
        let mut settings = GuardSettings::default();
        let update = ConfigUpdate {
            threshold_cpu: Some(75.0),
            chat_id: Some(" 12345 ".to_string()),
            ..Default::default()
        };

        update.apply(&mut settings).unwrap();
        assert_eq!(settings.threshold_cpu, 75.0);
        assert_eq!(settings.telegram.chat_id, "12345");
        assert_eq!(settings.cooldown_minutes, 30);
    }

    #[test]
    fn test_apply_rejects_bad_quiet_hours() {
        let mut settings = GuardSettings::default();
        let update = ConfigUpdate {
            quiet_hours: Some("25:00-06:00".to_string()),
            ..Default::default()
        };

        assert!(update.apply(&mut settings).is_err());
        assert_eq!(settings.quiet_hours, "");
    }

    #[test]
    fn test_apply_rejects_cooldown_over_a_year() {
        let mut settings = GuardSettings::default();
        let update = ConfigUpdate {
            cooldown_minutes: Some(MAX_COOLDOWN_MINUTES + 1),
            ..Default::default()
        };

        assert!(update.apply(&mut settings).is_err());
        assert_eq!(settings.cooldown_minutes, 30);
    }

    #[test]
    fn test_apply_allows_clearing_quiet_hours() {
        let mut settings = GuardSettings {
            quiet_hours: "22:00-06:00".to_string(),
            ..Default::default()
        };
        let update = ConfigUpdate {
            quiet_hours: Some(String::new()),
            ..Default::default()
        };

        update.apply(&mut settings).unwrap();
        assert_eq!(settings.quiet_hours, "");
    }

    #[test]
    fn test_empty_update() {
        assert!(ConfigUpdate::default().is_empty());
        assert!(!ConfigUpdate {
            use_cloudlinux: Some(false),
            ..Default::default()
        }
        .is_empty());
    }

    #[test]
    fn test_rows_mask_token() {
        let mut settings = GuardSettings::default();
        settings.telegram.bot_token = "123456:ABCDEFGH".to_string();
        let rows = setting_rows(&settings, Path::new("/tmp/state.json"));
        let token = rows
            .iter()
            .find(|r| r.key == "telegram.bot_token")
            .unwrap();
        assert_eq!(token.value, "****EFGH");
    }
}
