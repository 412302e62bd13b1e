//! Alert decision engine
//!
//! Walks one usage snapshot in order, gates every reading at or above the
//! threshold, dispatches permitted alerts and commits state after each
//! successful delivery. A failed or timed-out delivery leaves the account's
//! cooldown and the hourly budget untouched so the next cycle can retry.

use super::gate::{AlertPolicy, GateDecision};
use crate::models::UsageSample;
use crate::notifier::{render_alert_message, Notifier, NotifyError};
use crate::observability::{AgentMetrics, StructuredLogger};
use crate::state::{AlertState, StateStore};
use chrono::{DateTime, Local, Utc};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error};

/// Default bound on a single delivery attempt
pub const DEFAULT_NOTIFY_TIMEOUT: Duration = Duration::from_secs(10);

/// Counters for the most recent [`AlertEngine::evaluate`] call
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleStats {
    pub sampled: usize,
    pub over_threshold: usize,
    pub sent: usize,
    pub suppressed: usize,
    pub delivery_failures: usize,
    pub persist_failures: usize,
}

/// Stateful alert decision engine, the single writer of [`AlertState`]
pub struct AlertEngine {
    policy: AlertPolicy,
    state: AlertState,
    store: Arc<dyn StateStore>,
    notifier: Arc<dyn Notifier>,
    hostname: String,
    notify_timeout: Duration,
    metrics: AgentMetrics,
    logger: StructuredLogger,
    last_cycle: CycleStats,
}

impl AlertEngine {
    /// Create an engine, loading prior state from `store`
    ///
    /// Unreadable state is logged and replaced with an empty record.
    pub fn new(
        policy: AlertPolicy,
        store: Arc<dyn StateStore>,
        notifier: Arc<dyn Notifier>,
        hostname: impl Into<String>,
    ) -> Self {
        let state = match store.load() {
            Ok(state) => state,
            Err(e) => {
                error!(error = %e, "Error loading alert state, starting empty");
                AlertState::default()
            }
        };

        let hostname = hostname.into();
        let metrics = AgentMetrics::new();
        metrics.set_hour_alert_count(state.hour_alert_count);

        Self {
            policy,
            state,
            store,
            notifier,
            logger: StructuredLogger::new(hostname.clone()),
            hostname,
            notify_timeout: DEFAULT_NOTIFY_TIMEOUT,
            metrics,
            last_cycle: CycleStats::default(),
        }
    }

    /// Set the upper bound on one delivery attempt
    pub fn with_notify_timeout(mut self, timeout: Duration) -> Self {
        self.notify_timeout = timeout;
        self
    }

    pub fn policy(&self) -> &AlertPolicy {
        &self.policy
    }

    pub fn state(&self) -> &AlertState {
        &self.state
    }

    pub fn last_cycle(&self) -> &CycleStats {
        &self.last_cycle
    }

    /// Evaluate one snapshot and return the readings that were alerted
    ///
    /// Readings are processed in snapshot order; when the hourly cap is
    /// nearly spent, earlier accounts win the remaining slots.
    pub async fn evaluate(
        &mut self,
        snapshot: &[UsageSample],
        now: DateTime<Local>,
    ) -> Vec<UsageSample> {
        let mut stats = CycleStats {
            sampled: snapshot.len(),
            ..Default::default()
        };
        let mut approved = Vec::new();

        for sample in snapshot {
            if !sample.is_high(self.policy.threshold_cpu) {
                continue;
            }

            stats.over_threshold += 1;
            self.metrics.inc_high_usage();
            self.logger.log_high_usage(
                &sample.account_id,
                sample.cpu_percent,
                self.policy.threshold_cpu,
            );

            let window_before = self.state.hour_window_start;
            let decision = self.policy.permit(&mut self.state, &sample.account_id, now);
            let window_changed = self.state.hour_window_start != window_before;

            if decision != GateDecision::Permit {
                stats.suppressed += 1;
                self.metrics.inc_alerts_suppressed(decision.reason());
                self.logger.log_suppressed(
                    &sample.account_id,
                    decision.reason(),
                    &decision.to_string(),
                );
                if window_changed && !self.persist() {
                    stats.persist_failures += 1;
                }
                continue;
            }

            let delivery = self.dispatch(sample, now).await;
            match delivery {
                Ok(()) => {
                    self.state
                        .record_alert(&sample.account_id, now.with_timezone(&Utc));
                    if !self.persist() {
                        stats.persist_failures += 1;
                    }

                    stats.sent += 1;
                    self.metrics.inc_alerts_sent();
                    self.metrics.set_hour_alert_count(self.state.hour_alert_count);
                    self.logger.log_alert_sent(
                        &sample.account_id,
                        sample.cpu_percent,
                        self.notifier.name(),
                    );
                    approved.push(sample.clone());
                }
                Err(e) => {
                    stats.delivery_failures += 1;
                    self.metrics.inc_delivery_failures();
                    self.logger.log_delivery_failed(
                        &sample.account_id,
                        self.notifier.name(),
                        &e.to_string(),
                    );
                    if window_changed && !self.persist() {
                        stats.persist_failures += 1;
                    }
                }
            }
        }

        debug!(
            sampled = stats.sampled,
            over_threshold = stats.over_threshold,
            sent = stats.sent,
            suppressed = stats.suppressed,
            delivery_failures = stats.delivery_failures,
            "Snapshot evaluated"
        );
        self.last_cycle = stats;
        approved
    }

    /// Render and deliver one alert within the timeout
    async fn dispatch(&self, sample: &UsageSample, now: DateTime<Local>) -> Result<(), NotifyError> {
        let text = render_alert_message(
            &self.hostname,
            &sample.account_id,
            sample.cpu_percent,
            self.policy.threshold_cpu,
            now,
        );

        match tokio::time::timeout(self.notify_timeout, self.notifier.send(&text)).await {
            Ok(result) => result,
            Err(_) => Err(NotifyError::Timeout(self.notify_timeout)),
        }
    }

    /// Write current state; returns false if the write failed
    fn persist(&self) -> bool {
        match self.store.save(&self.state) {
            Ok(()) => true,
            Err(e) => {
                self.metrics.inc_state_persist_errors();
                self.logger.log_persist_failed(&e.to_string());
                false
            }
        }
    }
}
