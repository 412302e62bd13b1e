//! Daemon health status

use anyhow::Result;
use chrono::Utc;
use colored::Colorize;
use serde::Serialize;
use tabled::Tabled;

use crate::client::AgentClient;
use crate::output::{color_status, format_age, format_local, print_json, print_table, OutputFormat};
use agent_lib::health::{HealthResponse, ReadinessResponse};

/// Row for the component table
#[derive(Tabled)]
struct ComponentRow {
    #[tabled(rename = "Component")]
    name: String,
    #[tabled(rename = "Status")]
    status: String,
    #[tabled(rename = "Since")]
    since: String,
    #[tabled(rename = "Message")]
    message: String,
}

#[derive(Serialize)]
struct StatusView {
    health: HealthResponse,
    readiness: ReadinessResponse,
}

/// Query the daemon's health endpoints
pub async fn show_status(client: &AgentClient, format: OutputFormat) -> Result<()> {
    let health = client.health().await?;
    let readiness = client.readiness().await?;

    match format {
        OutputFormat::Json => print_json(&StatusView { health, readiness })?,
        OutputFormat::Table => {
            println!("{}", "NotifyGuard Daemon".bold());
            println!("{}", "=".repeat(60));
            println!("Status: {}", color_status(health.status.as_str()));
            match &readiness.reason {
                Some(reason) if !readiness.ready => {
                    println!("Ready:  {} ({})", "no".red(), reason)
                }
                _ => println!("Ready:  {}", "yes".green()),
            }
            match health.last_cycle_at {
                Some(at) => println!("Last cycle: {}", format_age(at, Utc::now())),
                None => println!("Last cycle: {}", "none yet".yellow()),
            }
            println!();

            let rows: Vec<ComponentRow> = health
                .components
                .iter()
                .map(|(name, component)| ComponentRow {
                    name: name.clone(),
                    status: color_status(component.status.as_str()),
                    since: format_local(component.since),
                    message: component.message.clone().unwrap_or_default(),
                })
                .collect();

            print_table(&rows);
        }
    }

    Ok(())
}
