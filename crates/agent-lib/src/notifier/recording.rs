//! Notifier that keeps messages in memory instead of sending them

use super::{async_trait, Notifier, NotifyError};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::time::Duration;

/// Captures every delivered message; can be told to fail or stall
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<String>>,
    failing: AtomicBool,
    delay: Option<Duration>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait `delay` before every delivery
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Reject deliveries until switched back
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Messages delivered so far, oldest first
    pub fn sent(&self) -> Vec<String> {
        self.sent
            .lock()
            .map(|messages| messages.clone())
            .unwrap_or_default()
    }

    pub fn sent_count(&self) -> usize {
        self.sent.lock().map(|messages| messages.len()).unwrap_or(0)
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn send(&self, text: &str) -> Result<(), NotifyError> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        if self.failing.load(Ordering::SeqCst) {
            return Err(NotifyError::Rejected("recording notifier set to fail".to_string()));
        }

        self.sent
            .lock()
            .map_err(|e| NotifyError::Rejected(e.to_string()))?
            .push(text.to_string());
        Ok(())
    }

    fn name(&self) -> &str {
        "recording"
    }
}
