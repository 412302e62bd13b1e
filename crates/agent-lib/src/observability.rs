//! Observability infrastructure for the alert daemon
//!
//! Provides:
//! - Prometheus metrics (cycle latency, alerts sent and suppressed, failures)
//! - Structured JSON logging with tracing

use prometheus::{
    register_histogram, register_int_counter, register_int_counter_vec, register_int_gauge,
    Histogram, IntCounter, IntCounterVec, IntGauge,
};
use std::sync::OnceLock;
use tracing::{info, warn};

/// Histogram buckets for cycle latency (in seconds)
const LATENCY_BUCKETS: &[f64] = &[0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0];

/// Global metrics instance (registered once)
static GLOBAL_METRICS: OnceLock<AgentMetricsInner> = OnceLock::new();

/// Inner metrics structure that holds the actual Prometheus metrics
struct AgentMetricsInner {
    cycle_latency_seconds: Histogram,
    cycles_total: IntCounter,
    accounts_sampled: IntGauge,
    high_usage_total: IntCounter,
    alerts_sent: IntCounter,
    alerts_suppressed: IntCounterVec,
    delivery_failures: IntCounter,
    usage_source_errors: IntCounter,
    state_persist_errors: IntCounter,
    hour_alert_count: IntGauge,
}

impl AgentMetricsInner {
    fn new() -> Self {
        Self {
            cycle_latency_seconds: register_histogram!(
                "notifyguard_cycle_latency_seconds",
                "Time spent sampling usage and evaluating alerts per cycle",
                LATENCY_BUCKETS.to_vec()
            )
            .expect("Failed to register cycle_latency_seconds"),

            cycles_total: register_int_counter!(
                "notifyguard_cycles_total",
                "Total number of completed scheduling cycles"
            )
            .expect("Failed to register cycles_total"),

            accounts_sampled: register_int_gauge!(
                "notifyguard_accounts_sampled",
                "Number of accounts in the most recent usage snapshot"
            )
            .expect("Failed to register accounts_sampled"),

            high_usage_total: register_int_counter!(
                "notifyguard_high_usage_total",
                "Readings at or above the CPU threshold"
            )
            .expect("Failed to register high_usage_total"),

            alerts_sent: register_int_counter!(
                "notifyguard_alerts_sent_total",
                "Alerts delivered successfully"
            )
            .expect("Failed to register alerts_sent"),

            alerts_suppressed: register_int_counter_vec!(
                "notifyguard_alerts_suppressed_total",
                "High-usage readings that were not alerted, by reason",
                &["reason"]
            )
            .expect("Failed to register alerts_suppressed"),

            delivery_failures: register_int_counter!(
                "notifyguard_delivery_failures_total",
                "Alert deliveries that failed or timed out"
            )
            .expect("Failed to register delivery_failures"),

            usage_source_errors: register_int_counter!(
                "notifyguard_usage_source_errors_total",
                "Cycles where the usage snapshot could not be read"
            )
            .expect("Failed to register usage_source_errors"),

            state_persist_errors: register_int_counter!(
                "notifyguard_state_persist_errors_total",
                "Failed writes of alert state"
            )
            .expect("Failed to register state_persist_errors"),

            hour_alert_count: register_int_gauge!(
                "notifyguard_hour_alert_count",
                "Alerts dispatched in the current hourly window"
            )
            .expect("Failed to register hour_alert_count"),
        }
    }
}

/// Agent metrics for Prometheus exposition
///
/// This is a lightweight handle to the global metrics instance.
/// Multiple clones share the same underlying metrics.
#[derive(Clone)]
pub struct AgentMetrics {
    _private: (),
}

impl Default for AgentMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl AgentMetrics {
    /// Create a new metrics handle (initializes global metrics if needed)
    pub fn new() -> Self {
        GLOBAL_METRICS.get_or_init(AgentMetricsInner::new);
        Self { _private: () }
    }

    fn inner(&self) -> &AgentMetricsInner {
        GLOBAL_METRICS.get().expect("Metrics not initialized")
    }

    /// Record a finished cycle
    pub fn observe_cycle(&self, duration_secs: f64, accounts: usize) {
        self.inner().cycle_latency_seconds.observe(duration_secs);
        self.inner().cycles_total.inc();
        self.inner().accounts_sampled.set(accounts as i64);
    }

    pub fn inc_high_usage(&self) {
        self.inner().high_usage_total.inc();
    }

    pub fn inc_alerts_sent(&self) {
        self.inner().alerts_sent.inc();
    }

    pub fn inc_alerts_suppressed(&self, reason: &str) {
        self.inner()
            .alerts_suppressed
            .with_label_values(&[reason])
            .inc();
    }

    pub fn inc_delivery_failures(&self) {
        self.inner().delivery_failures.inc();
    }

    pub fn inc_usage_source_errors(&self) {
        self.inner().usage_source_errors.inc();
    }

    pub fn inc_state_persist_errors(&self) {
        self.inner().state_persist_errors.inc();
    }

    pub fn set_hour_alert_count(&self, count: u32) {
        self.inner().hour_alert_count.set(count as i64);
    }
}

/// Structured logger for daemon events
///
/// Provides consistent JSON-formatted logging for alerts, suppressions
/// and lifecycle events.
#[derive(Clone)]
pub struct StructuredLogger {
    hostname: String,
}

impl StructuredLogger {
    pub fn new(hostname: impl Into<String>) -> Self {
        Self {
            hostname: hostname.into(),
        }
    }

    /// Log daemon startup with the effective alerting settings
    pub fn log_startup(
        &self,
        version: &str,
        threshold_cpu: f64,
        interval_secs: u64,
        cooldown_minutes: u64,
        quiet_hours: &str,
        max_alerts_per_hour: u32,
    ) {
        info!(
            event = "agent_started",
            host = %self.hostname,
            agent_version = %version,
            threshold_cpu = threshold_cpu,
            interval_secs = interval_secs,
            cooldown_minutes = cooldown_minutes,
            quiet_hours = %quiet_hours,
            max_alerts_per_hour = max_alerts_per_hour,
            "NotifyGuard daemon started"
        );
    }

    /// Log daemon shutdown
    pub fn log_shutdown(&self, reason: &str) {
        info!(
            event = "agent_shutdown",
            host = %self.hostname,
            reason = %reason,
            "NotifyGuard daemon shutting down"
        );
    }

    /// Log a reading at or above the threshold
    pub fn log_high_usage(&self, account_id: &str, cpu_percent: f64, threshold_cpu: f64) {
        info!(
            event = "high_cpu_detected",
            host = %self.hostname,
            account = %account_id,
            cpu_percent = cpu_percent,
            threshold_cpu = threshold_cpu,
            "High CPU detected"
        );
    }

    /// Log a delivered alert
    pub fn log_alert_sent(&self, account_id: &str, cpu_percent: f64, channel: &str) {
        info!(
            event = "alert_sent",
            host = %self.hostname,
            account = %account_id,
            cpu_percent = cpu_percent,
            channel = %channel,
            "Alert sent"
        );
    }

    /// Log a suppressed alert
    ///
    /// Cap exhaustion is a warning; quiet hours and cooldown are routine.
    pub fn log_suppressed(&self, account_id: &str, reason: &str, detail: &str) {
        if reason == "hourly_cap" {
            warn!(
                event = "alert_suppressed",
                host = %self.hostname,
                account = %account_id,
                reason = %reason,
                detail = %detail,
                "Skipping alert"
            );
        } else {
            info!(
                event = "alert_suppressed",
                host = %self.hostname,
                account = %account_id,
                reason = %reason,
                detail = %detail,
                "Skipping alert"
            );
        }
    }

    /// Log a failed or timed-out delivery
    pub fn log_delivery_failed(&self, account_id: &str, channel: &str, error: &str) {
        warn!(
            event = "alert_delivery_failed",
            host = %self.hostname,
            account = %account_id,
            channel = %channel,
            error = %error,
            "Alert delivery failed, will retry next cycle"
        );
    }

    /// Log a failed state write
    pub fn log_persist_failed(&self, error: &str) {
        warn!(
            event = "state_persist_failed",
            host = %self.hostname,
            error = %error,
            "Failed to persist alert state, continuing with in-memory state"
        );
    }
}
