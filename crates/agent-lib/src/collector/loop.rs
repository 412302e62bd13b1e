//! Scheduling loop
//!
//! Runs one decision cycle per interval: sample usage, hand the snapshot to
//! the alert engine, record the outcome. Cycles never overlap; a slow cycle
//! delays the next tick instead of queueing extra ones.

use super::UsageSource;
use crate::alerting::AlertEngine;
use crate::health::{components, HealthRegistry};
use crate::models::UsageSample;
use crate::observability::AgentMetrics;
use anyhow::Result;
use chrono::{DateTime, Local, Utc};
use futures::FutureExt;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time::{interval, Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

/// Configuration for the scheduling loop
#[derive(Debug, Clone)]
pub struct ScheduleConfig {
    /// Time between cycle starts (default: 120 seconds)
    pub interval: Duration,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(120),
        }
    }
}

/// Drives the alert engine from a usage source on a fixed interval
pub struct MonitorLoop {
    source: Arc<dyn UsageSource>,
    engine: AlertEngine,
    config: ScheduleConfig,
    health: Option<HealthRegistry>,
    metrics: AgentMetrics,
}

impl MonitorLoop {
    pub fn new(source: Arc<dyn UsageSource>, engine: AlertEngine, config: ScheduleConfig) -> Self {
        Self {
            source,
            engine,
            config,
            health: None,
            metrics: AgentMetrics::new(),
        }
    }

    /// Report component health to `registry` after every cycle
    pub fn with_health(mut self, registry: HealthRegistry) -> Self {
        self.health = Some(registry);
        self
    }

    pub fn engine(&self) -> &AlertEngine {
        &self.engine
    }

    /// Run cycles until a shutdown signal arrives
    ///
    /// Shutdown is only observed between cycles, so a cycle in progress always
    /// finishes and commits its state. A panicking cycle marks the scheduler
    /// unhealthy and the next tick runs as usual.
    pub async fn run(mut self, mut shutdown: broadcast::Receiver<()>) {
        info!(
            interval_secs = self.config.interval.as_secs(),
            source = %self.source.name(),
            "Starting monitoring loop"
        );

        let mut ticker = interval(self.config.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(panic) = AssertUnwindSafe(self.run_cycle()).catch_unwind().await {
                        let reason = panic_message(panic.as_ref());
                        error!(panic = %reason, "Monitoring cycle panicked");
                        if let Some(registry) = &self.health {
                            registry
                                .set_unhealthy(components::SCHEDULER, format!("Cycle panicked: {reason}"))
                                .await;
                        }
                    }
                }
                _ = shutdown.recv() => {
                    info!("Shutting down monitoring loop");
                    break;
                }
            }
        }
    }

    /// Run one cycle at the current local time
    pub async fn run_cycle(&mut self) -> Vec<UsageSample> {
        self.run_cycle_at(Local::now()).await
    }

    /// Run one cycle as if the clock read `now`
    pub async fn run_cycle_at(&mut self, now: DateTime<Local>) -> Vec<UsageSample> {
        let start = Instant::now();

        let snapshot = match self.source.sample().await {
            Ok(snapshot) => {
                self.report(components::USAGE_SOURCE, None).await;
                snapshot
            }
            Err(e) => {
                warn!(source = %self.source.name(), error = %e, "Failed to read usage snapshot");
                self.metrics.inc_usage_source_errors();
                self.report(components::USAGE_SOURCE, Some(e.to_string()))
                    .await;
                Vec::new()
            }
        };

        if snapshot.is_empty() {
            debug!("No CPU usage data available");
        }

        let alerted = self.engine.evaluate(&snapshot, now).await;
        let stats = self.engine.last_cycle().clone();
        let elapsed = start.elapsed();

        self.metrics
            .observe_cycle(elapsed.as_secs_f64(), stats.sampled);

        if stats.delivery_failures > 0 {
            self.report(
                components::NOTIFIER,
                Some(format!("{} deliveries failed", stats.delivery_failures)),
            )
            .await;
        } else if stats.sent > 0 {
            self.report(components::NOTIFIER, None).await;
        }

        if stats.persist_failures > 0 {
            self.report(
                components::STATE_STORE,
                Some(format!("{} state writes failed", stats.persist_failures)),
            )
            .await;
        } else if stats.sent > 0 {
            self.report(components::STATE_STORE, None).await;
        }

        self.report(components::SCHEDULER, None).await;
        if let Some(registry) = &self.health {
            registry.record_cycle(Utc::now()).await;
        }

        if stats.sent > 0 || stats.delivery_failures > 0 {
            info!(
                accounts = stats.sampled,
                over_threshold = stats.over_threshold,
                sent = stats.sent,
                suppressed = stats.suppressed,
                delivery_failures = stats.delivery_failures,
                elapsed_ms = elapsed.as_millis(),
                "Monitoring cycle complete"
            );
        } else {
            debug!(
                accounts = stats.sampled,
                over_threshold = stats.over_threshold,
                suppressed = stats.suppressed,
                elapsed_ms = elapsed.as_millis(),
                "Monitoring cycle complete"
            );
        }

        if elapsed > self.config.interval {
            warn!(
                elapsed_ms = elapsed.as_millis(),
                interval_secs = self.config.interval.as_secs(),
                "Cycle took longer than the interval, next cycle delayed"
            );
        }

        alerted
    }

    async fn report(&self, component: &str, problem: Option<String>) {
        if let Some(registry) = &self.health {
            match problem {
                Some(message) => registry.set_degraded(component, message).await,
                None => registry.set_healthy(component).await,
            }
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Builder for creating the monitoring loop
pub struct MonitorLoopBuilder {
    source: Option<Arc<dyn UsageSource>>,
    engine: Option<AlertEngine>,
    health: Option<HealthRegistry>,
    config: ScheduleConfig,
}

impl MonitorLoopBuilder {
    /// Create a new builder with default configuration
    pub fn new() -> Self {
        Self {
            source: None,
            engine: None,
            health: None,
            config: ScheduleConfig::default(),
        }
    }

    /// Set the usage source
    pub fn source(mut self, source: Arc<dyn UsageSource>) -> Self {
        self.source = Some(source);
        self
    }

    /// Set the alert engine
    pub fn engine(mut self, engine: AlertEngine) -> Self {
        self.engine = Some(engine);
        self
    }

    /// Set the health registry
    pub fn health(mut self, registry: HealthRegistry) -> Self {
        self.health = Some(registry);
        self
    }

    /// Set the cycle interval
    pub fn interval(mut self, interval: Duration) -> Self {
        self.config.interval = interval;
        self
    }

    /// Build the monitoring loop
    pub fn build(self) -> Result<MonitorLoop> {
        let source = self
            .source
            .ok_or_else(|| anyhow::anyhow!("Usage source is required"))?;
        let engine = self
            .engine
            .ok_or_else(|| anyhow::anyhow!("Alert engine is required"))?;
        if self.config.interval.is_zero() {
            anyhow::bail!("Interval must be greater than zero");
        }

        let mut monitor = MonitorLoop::new(source, engine, self.config);
        if let Some(registry) = self.health {
            monitor = monitor.with_health(registry);
        }
        Ok(monitor)
    }
}

impl Default for MonitorLoopBuilder {
    fn default() -> Self {
        Self::new()
    }
}
