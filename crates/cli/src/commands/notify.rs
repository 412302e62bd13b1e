//! Telegram connectivity test

use agent_lib::notifier::{render_test_message, Notifier, TelegramNotifier};
use agent_lib::settings::GuardSettings;
use anyhow::{Context, Result};
use chrono::Local;

use crate::output::{print_info, print_success};

/// Send the test message with the configured credentials
pub async fn test_notify(settings: &GuardSettings) -> Result<()> {
    let notifier = TelegramNotifier::new(&settings.telegram, settings.notify_timeout())
        .context("Failed to create Telegram notifier")?;

    print_info(&format!(
        "Sending test message to chat {}",
        settings.telegram.chat_id
    ));

    notifier
        .send(&render_test_message(Local::now()))
        .await
        .context("Test message was not delivered")?;

    print_success("Test message sent");
    Ok(())
}
