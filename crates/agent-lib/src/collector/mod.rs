//! Per-account CPU usage collection
//!
//! This module provides usage sources that produce one snapshot of
//! `(account, cpu%)` readings per scheduling cycle, and the loop that feeds
//! those snapshots to the alert engine.

mod lveinfo;
mod r#loop;

#[cfg(test)]
mod tests;

pub use lveinfo::{parse_lveinfo_output, LveInfoSource};
pub use r#loop::{MonitorLoop, MonitorLoopBuilder, ScheduleConfig};

use crate::models::UsageSnapshot;
use crate::settings::GuardSettings;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

pub use async_trait::async_trait;

/// Errors from reading a usage snapshot
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("{0} command not found. CloudLinux may not be installed.")]
    CommandNotFound(String),

    #[error("failed to run {command}: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{command} failed ({status}): {stderr}")]
    CommandFailed {
        command: String,
        status: String,
        stderr: String,
    },

    #[error("{command} timed out after {timeout:?}")]
    Timeout { command: String, timeout: Duration },
}

/// Source of per-account CPU snapshots
#[async_trait]
pub trait UsageSource: Send + Sync {
    /// Read the current snapshot; an empty snapshot is valid
    async fn sample(&self) -> Result<UsageSnapshot, SourceError>;

    /// Source name for logs
    fn name(&self) -> &str;
}

/// Source used when no usage backend is enabled; samples nothing
#[derive(Debug, Default, Clone, Copy)]
pub struct DisabledSource;

#[async_trait]
impl UsageSource for DisabledSource {
    async fn sample(&self) -> Result<UsageSnapshot, SourceError> {
        Ok(Vec::new())
    }

    fn name(&self) -> &str {
        "disabled"
    }
}

/// Create the usage source selected by settings
pub fn create_usage_source(settings: &GuardSettings) -> Arc<dyn UsageSource> {
    if settings.use_cloudlinux {
        tracing::info!(command = %settings.lveinfo_path, "Using CloudLinux lveinfo usage source");
        Arc::new(LveInfoSource::new(
            settings.lveinfo_path.clone(),
            settings.lveinfo_timeout(),
        ))
    } else {
        tracing::warn!("use_cloudlinux is disabled, no CPU usage will be sampled");
        Arc::new(DisabledSource)
    }
}
