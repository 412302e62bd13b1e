//! Daemon health
//!
//! The monitoring loop reports each collaborator after every cycle and stamps
//! the time the cycle finished. The overall status is the worst component
//! status. A scheduler that has not finished a cycle within the stall limit
//! is reported unhealthy even if nothing else reported it.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Health status of a component, ordered from best to worst
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ComponentStatus {
    /// Working normally
    Healthy,
    /// Failing, but cycles keep running
    Degraded,
    /// Cycles are not running
    Unhealthy,
}

impl ComponentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ComponentStatus::Healthy => "healthy",
            ComponentStatus::Degraded => "degraded",
            ComponentStatus::Unhealthy => "unhealthy",
        }
    }
}

impl fmt::Display for ComponentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Last reported state of one component
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComponentHealth {
    pub status: ComponentStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// When the component entered its current status
    pub since: DateTime<Utc>,
}

/// Body of `/healthz`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: ComponentStatus,
    pub components: BTreeMap<String, ComponentHealth>,
    /// Finish time of the last monitoring cycle
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_cycle_at: Option<DateTime<Utc>>,
}

/// Body of `/readyz`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReadinessResponse {
    pub ready: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// Component names for health tracking
pub mod components {
    pub const SCHEDULER: &str = "scheduler";
    pub const USAGE_SOURCE: &str = "usage_source";
    pub const NOTIFIER: &str = "notifier";
    pub const STATE_STORE: &str = "state_store";
}

#[derive(Debug, Default)]
struct RegistryState {
    components: BTreeMap<String, ComponentHealth>,
    last_cycle_at: Option<DateTime<Utc>>,
    ready: bool,
}

/// Shared health state written by the loop and read by the API
#[derive(Debug, Clone, Default)]
pub struct HealthRegistry {
    inner: Arc<RwLock<RegistryState>>,
    stall_after: Option<Duration>,
}

impl HealthRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Report the scheduler unhealthy when no cycle has finished for `limit`
    pub fn with_stall_timeout(mut self, limit: Duration) -> Self {
        self.stall_after = Some(limit);
        self
    }

    /// Add a component as healthy
    pub async fn register(&self, name: &str) {
        self.set(name, ComponentStatus::Healthy, None).await;
    }

    pub async fn set_healthy(&self, name: &str) {
        self.set(name, ComponentStatus::Healthy, None).await;
    }

    pub async fn set_degraded(&self, name: &str, message: impl Into<String>) {
        self.set(name, ComponentStatus::Degraded, Some(message.into()))
            .await;
    }

    pub async fn set_unhealthy(&self, name: &str, message: impl Into<String>) {
        self.set(name, ComponentStatus::Unhealthy, Some(message.into()))
            .await;
    }

    /// Stamp the end of a monitoring cycle
    pub async fn record_cycle(&self, at: DateTime<Utc>) {
        self.inner.write().await.last_cycle_at = Some(at);
    }

    pub async fn set_ready(&self, ready: bool) {
        self.inner.write().await.ready = ready;
    }

    async fn set(&self, name: &str, status: ComponentStatus, message: Option<String>) {
        let now = Utc::now();
        let mut inner = self.inner.write().await;
        let entry = inner
            .components
            .entry(name.to_string())
            .or_insert(ComponentHealth {
                status,
                message: None,
                since: now,
            });
        if entry.status != status {
            entry.status = status;
            entry.since = now;
        }
        entry.message = message;
    }

    pub async fn health(&self) -> HealthResponse {
        self.health_at(Utc::now()).await
    }

    /// Health as seen at `now`, applying the stall limit
    pub async fn health_at(&self, now: DateTime<Utc>) -> HealthResponse {
        let inner = self.inner.read().await;
        let mut report = inner.components.clone();

        if let (Some(limit), Some(last)) = (self.stall_after, inner.last_cycle_at) {
            let idle = now.signed_duration_since(last);
            let already_down = report
                .get(components::SCHEDULER)
                .is_some_and(|c| c.status == ComponentStatus::Unhealthy);
            if idle > limit && !already_down {
                report.insert(
                    components::SCHEDULER.to_string(),
                    ComponentHealth {
                        status: ComponentStatus::Unhealthy,
                        message: Some(format!("No cycle finished for {}s", idle.num_seconds())),
                        since: last + limit,
                    },
                );
            }
        }

        let status = report
            .values()
            .map(|c| c.status)
            .max()
            .unwrap_or(ComponentStatus::Healthy);

        HealthResponse {
            status,
            components: report,
            last_cycle_at: inner.last_cycle_at,
        }
    }

    /// Ready once started, until a component turns unhealthy
    pub async fn readiness(&self) -> ReadinessResponse {
        if !self.inner.read().await.ready {
            return ReadinessResponse {
                ready: false,
                reason: Some("Daemon not yet initialized".to_string()),
            };
        }

        let health = self.health().await;
        let down = health
            .components
            .iter()
            .find(|(_, c)| c.status == ComponentStatus::Unhealthy);

        match down {
            Some((name, component)) => ReadinessResponse {
                ready: false,
                reason: Some(match &component.message {
                    Some(message) => format!("{name} unhealthy: {message}"),
                    None => format!("{name} unhealthy"),
                }),
            },
            None => ReadinessResponse {
                ready: true,
                reason: None,
            },
        }
    }
}
