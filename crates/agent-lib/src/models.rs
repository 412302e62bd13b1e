//! Core data models for the alert daemon

use serde::{Deserialize, Serialize};

/// One account's CPU reading from a usage snapshot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UsageSample {
    pub account_id: String,
    pub cpu_percent: f64,
}

impl UsageSample {
    pub fn new(account_id: impl Into<String>, cpu_percent: f64) -> Self {
        Self {
            account_id: account_id.into(),
            cpu_percent,
        }
    }

    /// True if this reading is at or above the threshold
    pub fn is_high(&self, threshold_cpu: f64) -> bool {
        self.cpu_percent >= threshold_cpu
    }
}

/// Snapshot of all accounts for a single scheduling cycle, in source order
pub type UsageSnapshot = Vec<UsageSample>;
