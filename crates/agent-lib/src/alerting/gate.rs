//! Rate and cooldown gate
//!
//! Decides whether one account may be alerted right now. Checks run in a
//! fixed order: quiet hours, hourly window upkeep, the global hourly cap,
//! then the per-account cooldown.

use super::quiet_hours::QuietHours;
use crate::settings::GuardSettings;
use crate::state::AlertState;
use chrono::{DateTime, Duration, Local, Utc};
use std::fmt;
use tracing::error;

/// Suppression rules applied to every high-usage reading
#[derive(Debug, Clone, PartialEq)]
pub struct AlertPolicy {
    pub threshold_cpu: f64,
    pub cooldown: Duration,
    pub quiet_hours: Option<QuietHours>,
    pub max_alerts_per_hour: u32,
}

impl Default for AlertPolicy {
    fn default() -> Self {
        Self {
            threshold_cpu: 90.0,
            cooldown: Duration::minutes(30),
            quiet_hours: None,
            max_alerts_per_hour: 10,
        }
    }
}

impl AlertPolicy {
    /// Build the policy from settings
    ///
    /// An unparsable quiet-hours value is logged and disables quiet hours.
    pub fn from_settings(settings: &GuardSettings) -> Self {
        let quiet_hours = match QuietHours::parse(&settings.quiet_hours) {
            Ok(window) => window,
            Err(e) => {
                error!(
                    quiet_hours = %settings.quiet_hours,
                    error = %e,
                    "Error parsing quiet hours, alerts will not be silenced"
                );
                None
            }
        };

        Self {
            threshold_cpu: settings.threshold_cpu,
            cooldown: settings.cooldown(),
            quiet_hours,
            max_alerts_per_hour: settings.max_alerts_per_hour,
        }
    }

    pub fn is_quiet(&self, now: DateTime<Local>) -> bool {
        self.quiet_hours
            .map(|window| window.contains(now.time()))
            .unwrap_or(false)
    }

    /// Gate one account
    ///
    /// Only the hourly window bookkeeping is touched here; the alert itself is
    /// recorded by the caller once delivery succeeds.
    pub fn permit(
        &self,
        state: &mut AlertState,
        account_id: &str,
        now: DateTime<Local>,
    ) -> GateDecision {
        if self.is_quiet(now) {
            return GateDecision::QuietHours;
        }

        let now_utc = now.with_timezone(&Utc);
        state.roll_window(now_utc);

        if state.hour_alert_count >= self.max_alerts_per_hour {
            return GateDecision::HourlyCapReached {
                limit: self.max_alerts_per_hour,
            };
        }

        if let Some(last) = state.last_alert(account_id) {
            // A last alert in the future (clock stepped back) counts as inside the cooldown
            let elapsed = now_utc.signed_duration_since(last);
            if elapsed < self.cooldown {
                return GateDecision::Cooldown {
                    remaining: self.cooldown.checked_sub(&elapsed).unwrap_or(self.cooldown),
                };
            }
        }

        GateDecision::Permit
    }
}

/// Outcome of gating one account
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateDecision {
    Permit,
    QuietHours,
    HourlyCapReached { limit: u32 },
    Cooldown { remaining: Duration },
}

impl GateDecision {
    pub fn is_permitted(&self) -> bool {
        matches!(self, GateDecision::Permit)
    }

    /// Short label used in logs and metrics
    pub fn reason(&self) -> &'static str {
        match self {
            GateDecision::Permit => "permitted",
            GateDecision::QuietHours => "quiet_hours",
            GateDecision::HourlyCapReached { .. } => "hourly_cap",
            GateDecision::Cooldown { .. } => "cooldown",
        }
    }
}

impl fmt::Display for GateDecision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GateDecision::Permit => write!(f, "permitted"),
            GateDecision::QuietHours => write!(f, "quiet hours"),
            GateDecision::HourlyCapReached { limit } => {
                write!(f, "max alerts per hour ({}) reached", limit)
            }
            GateDecision::Cooldown { remaining } => {
                write!(f, "cooldown period, {}s remaining", remaining.num_seconds())
            }
        }
    }
}
