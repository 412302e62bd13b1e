//! NotifyGuard operator CLI
//!
//! Edits the alerting config, sends a Telegram test message, inspects
//! persisted alert state and queries the running daemon.

mod client;
mod commands;
mod output;

use agent_lib::settings::{default_config_path, GuardSettings};
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use commands::config::ConfigUpdate;
use std::path::{Path, PathBuf};

/// NotifyGuard operator CLI
#[derive(Parser)]
#[command(name = "ngctl")]
#[command(author, version, about = "CLI for the NotifyGuard CPU alert daemon", long_about = None)]
pub struct Cli {
    /// Config file path (default: /var/cpanel/uniquenotify/config.json)
    #[arg(long, short, env = "NOTIFYGUARD_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Daemon API URL (can also be set via NOTIFYGUARD_AGENT_URL env var)
    #[arg(
        long,
        env = "NOTIFYGUARD_AGENT_URL",
        default_value = "http://localhost:9187",
        global = true
    )]
    pub agent_url: String,

    /// Output format
    #[arg(long, short, default_value = "table", global = true)]
    pub format: output::OutputFormat,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Show or change alerting settings
    #[command(subcommand)]
    Config(ConfigCommands),

    /// Send a Telegram test message
    TestNotify,

    /// Inspect persisted alert state
    #[command(subcommand)]
    State(StateCommands),

    /// Sample per-account CPU usage once
    Sample,

    /// Show the running daemon's health
    Status,
}

#[derive(Subcommand)]
pub enum ConfigCommands {
    /// Print effective settings (bot token masked)
    Show,

    /// Change settings and save the config file
    Set(ConfigUpdate),
}

#[derive(Subcommand)]
pub enum StateCommands {
    /// List last alert times and the hourly window
    Show,
}

fn load_settings(path: &Path) -> Result<GuardSettings> {
    GuardSettings::load(path).with_context(|| format!("Failed to load {}", path.display()))
}

async fn run(cli: Cli) -> Result<()> {
    let config_path = cli.config.clone().unwrap_or_else(default_config_path);

    match cli.command {
        Commands::Config(config_cmd) => match config_cmd {
            ConfigCommands::Show => commands::config::show(&config_path, cli.format)?,
            ConfigCommands::Set(update) => commands::config::set(&config_path, &update)?,
        },
        Commands::TestNotify => {
            let settings = load_settings(&config_path)?;
            commands::notify::test_notify(&settings).await?;
        }
        Commands::State(state_cmd) => match state_cmd {
            StateCommands::Show => {
                let settings = load_settings(&config_path)?;
                commands::state::show(&settings, &config_path, cli.format)?;
            }
        },
        Commands::Sample => {
            let settings = load_settings(&config_path)?;
            commands::sample::sample(&settings, cli.format).await?;
        }
        Commands::Status => {
            let client = client::AgentClient::new(&cli.agent_url)?;
            commands::status::show_status(&client, cli.format).await?;
        }
    }

    Ok(())
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    if let Err(e) = run(cli).await {
        output::print_error(&format!("{:#}", e));
        std::process::exit(1);
    }
}
