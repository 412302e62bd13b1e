//! One-off usage sampling

use agent_lib::collector::create_usage_source;
use agent_lib::settings::GuardSettings;
use anyhow::{Context, Result};
use colored::Colorize;
use tabled::Tabled;

use crate::output::{color_cpu, print_json, print_table, print_warning, OutputFormat};

/// Row for the sample table
#[derive(Tabled)]
struct SampleRow {
    #[tabled(rename = "Account")]
    account: String,
    #[tabled(rename = "CPU")]
    cpu: String,
    #[tabled(rename = "Alert")]
    alert: String,
}

/// Run the usage source once and print what it reports
pub async fn sample(settings: &GuardSettings, format: OutputFormat) -> Result<()> {
    if !settings.use_cloudlinux {
        print_warning("use_cloudlinux is disabled; the daemon samples nothing");
        return Ok(());
    }

    let source = create_usage_source(settings);
    let snapshot = source
        .sample()
        .await
        .with_context(|| format!("Failed to sample usage with {}", source.name()))?;

    match format {
        OutputFormat::Json => print_json(&snapshot)?,
        OutputFormat::Table => {
            let high = snapshot
                .iter()
                .filter(|s| s.is_high(settings.threshold_cpu))
                .count();

            let rows: Vec<SampleRow> = snapshot
                .iter()
                .map(|s| SampleRow {
                    account: s.account_id.clone(),
                    cpu: color_cpu(s.cpu_percent, settings.threshold_cpu),
                    alert: if s.is_high(settings.threshold_cpu) {
                        "yes".red().bold().to_string()
                    } else {
                        String::new()
                    },
                })
                .collect();

            print_table(&rows);
            println!(
                "\n{} accounts, {} at or above {}%",
                snapshot.len(),
                high,
                settings.threshold_cpu
            );
        }
    }

    Ok(())
}
