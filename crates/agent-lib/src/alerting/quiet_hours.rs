//! Quiet-hours window evaluation
//!
//! A quiet window is a pair of clock times with inclusive bounds. When the
//! start is later than the end the window wraps past midnight.

use chrono::NaiveTime;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use tracing::error;

/// Errors produced while parsing a `"HH:MM-HH:MM"` quiet-hours range
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QuietHoursError {
    #[error("expected \"HH:MM-HH:MM\", got {0:?}")]
    InvalidFormat(String),

    #[error("invalid clock time {0:?}")]
    InvalidTime(String),
}

/// Daily quiet window
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuietHours {
    pub start: NaiveTime,
    pub end: NaiveTime,
}

impl QuietHours {
    pub fn new(start: NaiveTime, end: NaiveTime) -> Self {
        Self { start, end }
    }

    /// Parse a range string; an empty string means no quiet window
    pub fn parse(range: &str) -> Result<Option<Self>, QuietHoursError> {
        let range = range.trim();
        if range.is_empty() {
            return Ok(None);
        }
        range.parse().map(Some)
    }

    /// Window crosses midnight
    pub fn wraps_midnight(&self) -> bool {
        self.start > self.end
    }

    /// Whether `now` falls inside the window, bounds included
    pub fn contains(&self, now: NaiveTime) -> bool {
        if self.start <= self.end {
            self.start <= now && now <= self.end
        } else {
            now >= self.start || now <= self.end
        }
    }
}

impl FromStr for QuietHours {
    type Err = QuietHoursError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.split('-');
        let (start, end) = match (parts.next(), parts.next(), parts.next()) {
            (Some(start), Some(end), None) => (start, end),
            _ => return Err(QuietHoursError::InvalidFormat(s.to_string())),
        };

        Ok(Self {
            start: parse_clock(start)?,
            end: parse_clock(end)?,
        })
    }
}

impl fmt::Display for QuietHours {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}-{}",
            self.start.format("%H:%M"),
            self.end.format("%H:%M")
        )
    }
}

fn parse_clock(value: &str) -> Result<NaiveTime, QuietHoursError> {
    let value = value.trim();
    NaiveTime::parse_from_str(value, "%H:%M")
        .map_err(|_| QuietHoursError::InvalidTime(value.to_string()))
}

/// Check a raw range string against a clock time
///
/// Empty ranges are never quiet. A malformed range is logged and treated as
/// not quiet so a config typo cannot silence every alert.
pub fn is_quiet(range: &str, now: NaiveTime) -> bool {
    match QuietHours::parse(range) {
        Ok(Some(window)) => window.contains(now),
        Ok(None) => false,
        Err(e) => {
            error!(quiet_hours = %range, error = %e, "Error parsing quiet hours, ignoring");
            false
        }
    }
}
