//! Inspecting persisted alert state

use agent_lib::settings::GuardSettings;
use agent_lib::state::{JsonFileStore, StateStore};
use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Utc};
use colored::Colorize;
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::Path;
use tabled::Tabled;

use crate::output::{format_age, format_local, print_json, print_table, OutputFormat};

/// Row for the last-alert table
#[derive(Tabled)]
struct AlertRow {
    #[tabled(rename = "Account")]
    account: String,
    #[tabled(rename = "Last Alert")]
    last_alert: String,
    #[tabled(rename = "Age")]
    age: String,
    #[tabled(rename = "Cooldown")]
    cooldown: String,
}

#[derive(Serialize)]
struct StateView {
    state_file: String,
    last_alerts: BTreeMap<String, String>,
    hour_window_start: Option<String>,
    hour_alert_count: u32,
    max_alerts_per_hour: u32,
}

/// Cooldown still to run for an account last alerted at `at`
///
/// A last alert in the future counts as a full cooldown.
fn cooldown_left(cooldown: Duration, at: DateTime<Utc>, now: DateTime<Utc>) -> Option<Duration> {
    let elapsed = now.signed_duration_since(at);
    if elapsed >= cooldown {
        return None;
    }
    Some(cooldown.checked_sub(&elapsed).unwrap_or(cooldown))
}

/// Print the persisted last-alert times and the hourly window
pub fn show(settings: &GuardSettings, config_path: &Path, format: OutputFormat) -> Result<()> {
    let state_path = settings.state_path(config_path);
    let state = JsonFileStore::new(&state_path)
        .load()
        .with_context(|| format!("Failed to read {}", state_path.display()))?;

    match format {
        OutputFormat::Json => {
            let persisted = state.to_persisted();
            print_json(&StateView {
                state_file: state_path.display().to_string(),
                last_alerts: persisted.last_alerts,
                hour_window_start: persisted.alert_hour_start,
                hour_alert_count: state.hour_alert_count,
                max_alerts_per_hour: settings.max_alerts_per_hour,
            })?;
        }
        OutputFormat::Table => {
            let now = Utc::now();
            let cooldown = settings.cooldown();

            println!("{}", "Alert State".bold());
            println!("{}", "=".repeat(60));
            println!("File: {}", state_path.display().to_string().cyan());
            match state.hour_window_start {
                Some(start) => println!(
                    "Hourly window: {} alerts since {} (limit {})",
                    state.hour_alert_count,
                    format_local(start),
                    settings.max_alerts_per_hour
                ),
                None => println!("Hourly window: not started"),
            }
            println!();

            let rows: Vec<AlertRow> = state
                .last_alert_at
                .iter()
                .map(|(account, &at)| AlertRow {
                    account: account.clone(),
                    last_alert: format_local(at),
                    age: format_age(at, now),
                    cooldown: match cooldown_left(cooldown, at, now) {
                        Some(left) => format!("{}m left", (left.num_seconds() + 59) / 60)
                            .yellow()
                            .to_string(),
                        None => "ready".green().to_string(),
                    },
                })
                .collect();

            print_table(&rows);
        }
    }

    Ok(())
}
