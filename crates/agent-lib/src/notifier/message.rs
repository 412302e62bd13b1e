//! Alert message templates

use chrono::{DateTime, Local};

/// Local timestamp layout used in messages
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Render the high-CPU alert for one account
pub fn render_alert_message(
    hostname: &str,
    account_id: &str,
    cpu_percent: f64,
    threshold_cpu: f64,
    at: DateTime<Local>,
) -> String {
    format!(
        "⚠️ High CPU Alert\nHost: {}\nUser: {}\nCPU: {:.1}% >= {}%\nTime: {}",
        hostname,
        account_id,
        cpu_percent,
        threshold_cpu,
        at.format(TIMESTAMP_FORMAT)
    )
}

/// Render the connectivity test message
pub fn render_test_message(at: DateTime<Local>) -> String {
    format!(
        "✅ NotifyGuard Test Message\n\nYour Telegram configuration is working correctly!\nTime: {}",
        at.format(TIMESTAMP_FORMAT)
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_alert_message_shape() {
        let at = Local.with_ymd_and_hms(2025, 11, 10, 15, 42, 23).unwrap();
        let message = render_alert_message("server01.example.com", "johndoe", 96.44, 90.0, at);

        assert_eq!(
            message,
            "⚠️ High CPU Alert\n\
             Host: server01.example.com\n\
             User: johndoe\n\
             CPU: 96.4% >= 90%\n\
             Time: 2025-11-10 15:42:23"
        );
    }

    #[test]
    fn test_fractional_threshold_is_kept() {
        let at = Local.with_ymd_and_hms(2025, 1, 2, 3, 4, 5).unwrap();
        let message = render_alert_message("h", "u", 100.0, 92.5, at);
        assert!(message.contains("CPU: 100.0% >= 92.5%"));
        assert!(message.ends_with("Time: 2025-01-02 03:04:05"));
    }

    #[test]
    fn test_test_message() {
        let at = Local.with_ymd_and_hms(2025, 11, 10, 8, 0, 0).unwrap();
        let message = render_test_message(at);
        assert!(message.starts_with("✅ NotifyGuard Test Message"));
        assert!(message.ends_with("Time: 2025-11-10 08:00:00"));
    }
}
