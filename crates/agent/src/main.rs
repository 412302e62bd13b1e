//! NotifyGuard - per-account CPU alert daemon
//!
//! Samples per-account CPU usage on a fixed interval and sends rate-limited
//! Telegram alerts for accounts over the configured threshold.

use agent_lib::{
    alerting::{AlertEngine, AlertPolicy},
    collector::{create_usage_source, MonitorLoopBuilder},
    health::{components, HealthRegistry},
    notifier::TelegramNotifier,
    observability::{AgentMetrics, StructuredLogger},
    settings::GuardSettings,
    state::JsonFileStore,
};
use anyhow::{Context, Result};
use notifyguard_agent::{api, config::AgentConfig};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

const AGENT_VERSION: &str = env!("CARGO_PKG_VERSION");

#[tokio::main]
async fn main() -> Result<()> {
    let config = AgentConfig::load().context("Invalid AGENT_* environment")?;

    // Initialize tracing with JSON output and env filter
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    if config.pretty_logs() {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json())
            .init();
    }

    info!(config_path = %config.config_path.display(), "Starting notifyguard");

    let settings = GuardSettings::load_or_default(&config.config_path);
    let hostname = settings.hostname();
    let state_path = settings.state_path(&config.config_path);

    // Initialize health registry
    let health_registry = HealthRegistry::new().with_stall_timeout(settings.stall_timeout());
    health_registry.register(components::SCHEDULER).await;
    health_registry.register(components::USAGE_SOURCE).await;
    health_registry.register(components::NOTIFIER).await;
    health_registry.register(components::STATE_STORE).await;

    if !settings.telegram.enabled {
        warn!("Telegram notifications are disabled, alerts will not be delivered");
    } else if !settings.telegram.is_configured() {
        warn!("Telegram bot_token or chat_id is empty, alerts will not be delivered");
        health_registry
            .set_degraded(components::NOTIFIER, "Telegram credentials not configured")
            .await;
    }

    let notifier = TelegramNotifier::new(&settings.telegram, settings.notify_timeout())
        .context("Failed to create Telegram notifier")?;
    let store = JsonFileStore::new(&state_path);
    info!(path = %state_path.display(), "Using state file");

    let engine = AlertEngine::new(
        AlertPolicy::from_settings(&settings),
        Arc::new(store),
        Arc::new(notifier),
        hostname.clone(),
    )
    .with_notify_timeout(settings.notify_timeout());

    let metrics = AgentMetrics::new();
    metrics.set_hour_alert_count(engine.state().hour_alert_count);

    let logger = StructuredLogger::new(&hostname);
    logger.log_startup(
        AGENT_VERSION,
        settings.threshold_cpu,
        settings.interval_seconds,
        settings.cooldown_minutes,
        &settings.quiet_hours,
        settings.max_alerts_per_hour,
    );

    let monitor = MonitorLoopBuilder::new()
        .source(create_usage_source(&settings))
        .engine(engine)
        .health(health_registry.clone())
        .interval(settings.interval())
        .build()?;

    let (shutdown_tx, _) = broadcast::channel::<()>(1);

    // Start health and metrics server
    let app_state = Arc::new(api::AppState::new(health_registry.clone(), metrics));
    let api_handle = tokio::spawn(api::serve(
        config.api_port,
        app_state,
        shutdown_tx.subscribe(),
    ));

    let mut monitor_handle = tokio::spawn(monitor.run(shutdown_tx.subscribe()));

    // Mark daemon as ready after initialization
    health_registry.set_ready(true).await;

    let mut monitor_running = true;
    let reason = tokio::select! {
        reason = wait_for_shutdown() => reason?,
        result = &mut monitor_handle => {
            monitor_running = false;
            if let Err(e) = result {
                error!(error = %e, "Monitoring loop terminated abnormally");
            } else {
                error!("Monitoring loop exited before shutdown");
            }
            health_registry
                .set_unhealthy(components::SCHEDULER, "Monitoring loop stopped")
                .await;
            wait_for_shutdown().await?
        }
    };
    logger.log_shutdown(reason);
    let _ = shutdown_tx.send(());

    if monitor_running {
        if let Err(e) = monitor_handle.await {
            error!(error = %e, "Monitoring loop terminated abnormally");
        }
    }
    match api_handle.await {
        Ok(Err(e)) => error!(error = %e, "API server failed"),
        Err(e) => error!(error = %e, "API server terminated abnormally"),
        Ok(Ok(())) => {}
    }

    info!("Shutdown complete");
    Ok(())
}

#[cfg(unix)]
async fn wait_for_shutdown() -> Result<&'static str> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut terminate = signal(SignalKind::terminate()).context("Failed to install SIGTERM handler")?;
    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            result?;
            Ok("SIGINT received")
        }
        _ = terminate.recv() => Ok("SIGTERM received"),
    }
}

#[cfg(not(unix))]
async fn wait_for_shutdown() -> Result<&'static str> {
    tokio::signal::ctrl_c().await?;
    Ok("Ctrl-C received")
}
