//! Durable alert state
//!
//! Tracks when each account was last alerted and how many alerts went out in
//! the current hourly window. The state survives restarts through a
//! [`StateStore`]; the on-disk layout keeps the field names operators already
//! know (`last_alerts`, `alert_count_hour`, `alert_hour_start`).

mod store;

pub use store::{JsonFileStore, MemoryStateStore, StateStore, StoreError};

use chrono::{DateTime, Duration, Local, NaiveDateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::warn;

/// Length of the sliding alert-counting window
pub const HOUR_WINDOW_SECS: i64 = 3600;

/// In-memory alert state, mutated only by the decision engine
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AlertState {
    /// Last successful dispatch per account
    pub last_alert_at: BTreeMap<String, DateTime<Utc>>,
    /// Start of the current hourly counting window
    pub hour_window_start: Option<DateTime<Utc>>,
    /// Alerts dispatched since `hour_window_start`
    pub hour_alert_count: u32,
}

impl AlertState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn last_alert(&self, account_id: &str) -> Option<DateTime<Utc>> {
        self.last_alert_at.get(account_id).copied()
    }

    /// Open a window if none exists, or restart it once it is older than an hour
    ///
    /// Returns true when the state changed.
    pub fn roll_window(&mut self, now: DateTime<Utc>) -> bool {
        match self.hour_window_start {
            None => {
                self.hour_window_start = Some(now);
                true
            }
            Some(start) if now - start > Duration::seconds(HOUR_WINDOW_SECS) => {
                self.hour_window_start = Some(now);
                self.hour_alert_count = 0;
                true
            }
            Some(_) => false,
        }
    }

    /// Record a delivered alert
    ///
    /// The per-account timestamp never moves backwards, even if the clock did.
    pub fn record_alert(&mut self, account_id: &str, now: DateTime<Utc>) {
        self.last_alert_at
            .entry(account_id.to_string())
            .and_modify(|last| {
                if now > *last {
                    *last = now;
                }
            })
            .or_insert(now);
        self.hour_alert_count = self.hour_alert_count.saturating_add(1);
    }

    pub fn to_persisted(&self) -> PersistedState {
        PersistedState {
            last_alerts: self
                .last_alert_at
                .iter()
                .map(|(account, at)| (account.clone(), format_timestamp(*at)))
                .collect(),
            alert_count_hour: self.hour_alert_count,
            alert_hour_start: self.hour_window_start.map(format_timestamp),
        }
    }

    /// Build state from its stored form
    ///
    /// Entries with unreadable timestamps are dropped with a warning instead of
    /// discarding the whole record.
    pub fn from_persisted(persisted: PersistedState) -> Self {
        let mut last_alert_at = BTreeMap::new();
        for (account, raw) in persisted.last_alerts {
            match parse_timestamp(&raw) {
                Some(at) => {
                    last_alert_at.insert(account, at);
                }
                None => {
                    warn!(account = %account, value = %raw, "Dropping unreadable last-alert timestamp");
                }
            }
        }

        let hour_window_start = persisted.alert_hour_start.as_deref().and_then(|raw| {
            let parsed = parse_timestamp(raw);
            if parsed.is_none() {
                warn!(value = %raw, "Dropping unreadable alert_hour_start");
            }
            parsed
        });

        Self {
            last_alert_at,
            hour_alert_count: persisted.alert_count_hour,
            hour_window_start,
        }
    }
}

/// On-disk representation of [`AlertState`]
///
/// Unknown fields are ignored and missing ones default.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PersistedState {
    pub last_alerts: BTreeMap<String, String>,
    pub alert_count_hour: u32,
    pub alert_hour_start: Option<String>,
}

/// ISO-8601 with the local offset, e.g. `2025-11-10T15:42:23.123456+02:00`
pub fn format_timestamp(at: DateTime<Utc>) -> String {
    at.with_timezone(&Local).to_rfc3339()
}

/// Accepts RFC 3339 and offset-less ISO-8601 (read as local time)
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(at) = DateTime::parse_from_rfc3339(raw) {
        return Some(at.with_timezone(&Utc));
    }

    let naive: NaiveDateTime = raw.parse().ok()?;
    Local
        .from_local_datetime(&naive)
        .earliest()
        .map(|at| at.with_timezone(&Utc))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    #[test]
    fn test_roll_window_opens_and_resets() {
        let mut state = AlertState::new();
        assert!(state.roll_window(at(0)));
        assert_eq!(state.hour_window_start, Some(at(0)));

        state.hour_alert_count = 7;
        assert!(!state.roll_window(at(3600)));
        assert_eq!(state.hour_alert_count, 7);

        assert!(state.roll_window(at(3601)));
        assert_eq!(state.hour_alert_count, 0);
        assert_eq!(state.hour_window_start, Some(at(3601)));
    }

    #[test]
    fn test_record_alert_only_moves_forward() {
        let mut state = AlertState::new();
        state.record_alert("alice", at(100));
        state.record_alert("alice", at(50));
        assert_eq!(state.last_alert("alice"), Some(at(100)));
        assert_eq!(state.hour_alert_count, 2);

        state.record_alert("alice", at(200));
        assert_eq!(state.last_alert("alice"), Some(at(200)));
    }

    #[test]
    fn test_persisted_layout_field_names() {
        let mut state = AlertState::new();
        state.roll_window(at(0));
        state.record_alert("alice", at(10));

        let json = serde_json::to_value(state.to_persisted()).unwrap();
        assert!(json["last_alerts"]["alice"].is_string());
        assert_eq!(json["alert_count_hour"], 1);
        assert!(json["alert_hour_start"].is_string());

        let restored = AlertState::from_persisted(serde_json::from_value(json).unwrap());
        assert_eq!(restored, state);
    }

    #[test]
    fn test_missing_fields_default() {
        let persisted: PersistedState = serde_json::from_str(r#"{"extra": true}"#).unwrap();
        assert_eq!(AlertState::from_persisted(persisted), AlertState::new());
    }

    #[test]
    fn test_naive_iso_timestamps_are_accepted() {
        let persisted: PersistedState = serde_json::from_str(
            r#"{
                "last_alerts": {"bob": "2025-11-10T15:42:23.123456", "carol": "garbage"},
                "alert_count_hour": 3,
                "alert_hour_start": "2025-11-10T15:00:00"
            }"#,
        )
        .unwrap();

        let state = AlertState::from_persisted(persisted);
        assert!(state.last_alert("bob").is_some());
        assert!(state.last_alert("carol").is_none());
        assert_eq!(state.hour_alert_count, 3);
        assert!(state.hour_window_start.is_some());
    }

    #[test]
    fn test_count_without_window_is_kept() {
        let persisted = PersistedState {
            alert_count_hour: 5,
            alert_hour_start: None,
            ..Default::default()
        };
        let state = AlertState::from_persisted(persisted);
        assert_eq!(state.hour_alert_count, 5);
        assert_eq!(state.hour_window_start, None);
    }

    #[test]
    fn test_window_opened_over_stored_count_keeps_it() {
        let mut state = AlertState::from_persisted(PersistedState {
            alert_count_hour: 10,
            ..Default::default()
        });
        let now = Utc::now();

        assert!(state.roll_window(now));
        assert_eq!(state.hour_window_start, Some(now));
        assert_eq!(state.hour_alert_count, 10);
    }

    #[test]
    fn test_timestamp_round_trip_keeps_instant() {
        let original = Utc.timestamp_opt(1_731_253_343, 123_456_000).unwrap();
        assert_eq!(parse_timestamp(&format_timestamp(original)), Some(original));
    }
}
