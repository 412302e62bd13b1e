//! Alert delivery
//!
//! A [`Notifier`] takes a rendered message and reports whether it was
//! delivered. Delivery failures are never fatal; the caller decides what a
//! failure means for alert state.

mod message;
mod recording;
mod telegram;

pub use message::{render_alert_message, render_test_message, TIMESTAMP_FORMAT};
pub use recording::RecordingNotifier;
pub use telegram::TelegramNotifier;

pub use async_trait::async_trait;

use std::time::Duration;
use thiserror::Error;

/// Reasons a notification was not delivered
#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("notifications are disabled")]
    Disabled,

    #[error("bot token or chat id not configured")]
    NotConfigured,

    #[error("invalid API endpoint: {0}")]
    InvalidEndpoint(String),

    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("API error ({status}): {description}")]
    Api { status: u16, description: String },

    #[error("delivery timed out after {0:?}")]
    Timeout(Duration),

    #[error("delivery rejected: {0}")]
    Rejected(String),
}

/// Message delivery capability
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Deliver `text` to the configured destination
    async fn send(&self, text: &str) -> Result<(), NotifyError>;

    /// Channel name for logs
    fn name(&self) -> &str;
}
