//! CloudLinux LVE usage source
//!
//! Runs `lveinfo` for the last minute of per-user CPU usage:
//!
//! ```text
//! ID     LOGIN    aCPU
//! ----   -----    ----
//! 1001   alice    95.5%
//! 1002   bob      12%
//! ```
//!
//! The first two lines are headers; the second column is the account and the
//! third its CPU percentage.

use super::{async_trait, SourceError, UsageSource};
use crate::models::{UsageSample, UsageSnapshot};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::debug;

const LVEINFO_ARGS: &[&str] = &["--period=1m", "--display-username", "--show=cpu"];

const HEADER_LINES: usize = 2;

/// Samples usage by running the `lveinfo` command
#[derive(Debug, Clone)]
pub struct LveInfoSource {
    command: String,
    timeout: Duration,
}

impl LveInfoSource {
    pub fn new(command: impl Into<String>, timeout: Duration) -> Self {
        Self {
            command: command.into(),
            timeout,
        }
    }
}

#[async_trait]
impl UsageSource for LveInfoSource {
    async fn sample(&self) -> Result<UsageSnapshot, SourceError> {
        let child = Command::new(&self.command)
            .args(LVEINFO_ARGS)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output();

        let output = match tokio::time::timeout(self.timeout, child).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(SourceError::CommandNotFound(self.command.clone()));
            }
            Ok(Err(e)) => {
                return Err(SourceError::Spawn {
                    command: self.command.clone(),
                    source: e,
                });
            }
            Err(_) => {
                return Err(SourceError::Timeout {
                    command: self.command.clone(),
                    timeout: self.timeout,
                });
            }
        };

        if !output.status.success() {
            return Err(SourceError::CommandFailed {
                command: self.command.clone(),
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        let snapshot = parse_lveinfo_output(&stdout);
        debug!(accounts = snapshot.len(), "lveinfo snapshot parsed");
        Ok(snapshot)
    }

    fn name(&self) -> &str {
        "lveinfo"
    }
}

/// Parse `lveinfo` output into a snapshot, keeping row order
///
/// Rows with fewer than three columns or a non-numeric CPU value are skipped.
pub fn parse_lveinfo_output(output: &str) -> UsageSnapshot {
    output
        .trim()
        .lines()
        .skip(HEADER_LINES)
        .filter_map(|line| {
            let parts: Vec<&str> = line.split_whitespace().collect();
            if parts.len() < 3 {
                return None;
            }
            let cpu = parts[2].trim_end_matches('%').parse::<f64>().ok()?;
            if !cpu.is_finite() {
                return None;
            }
            Some(UsageSample::new(parts[1], cpu))
        })
        .collect()
}
