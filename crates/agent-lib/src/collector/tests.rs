//! Tests for usage collection and the monitoring loop
//!
//! The lveinfo tests run small shell scripts standing in for the real
//! command, so they only run on Unix.

use super::*;
use crate::alerting::{AlertEngine, AlertPolicy};
use crate::health::{components, ComponentStatus, HealthRegistry};
use crate::models::{UsageSample, UsageSnapshot};
use crate::notifier::RecordingNotifier;
use crate::state::MemoryStateStore;
use chrono::{Local, TimeZone};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

const SAMPLE_OUTPUT: &str = "\
ID      LOGIN     aCPU
------  --------  ------
1001    alice     95.5%
1002    bob       12%
1003    carol     n/a
1004
1005    dave      90
";

mod parse_tests {
    use super::*;

    #[test]
    fn test_parse_lveinfo_output() {
        let snapshot = parse_lveinfo_output(SAMPLE_OUTPUT);
        assert_eq!(
            snapshot,
            vec![
                UsageSample::new("alice", 95.5),
                UsageSample::new("bob", 12.0),
                UsageSample::new("dave", 90.0),
            ]
        );
    }

    #[test]
    fn test_parse_headers_only() {
        assert!(parse_lveinfo_output("ID LOGIN aCPU\n---- ---- ----\n").is_empty());
        assert!(parse_lveinfo_output("").is_empty());
    }

    #[test]
    fn test_parse_keeps_row_order() {
        let output = "h\nh\n1 zed 99%\n2 amy 98%\n3 bob 97%\n";
        let accounts: Vec<_> = parse_lveinfo_output(output)
            .into_iter()
            .map(|s| s.account_id)
            .collect();
        assert_eq!(accounts, vec!["zed", "amy", "bob"]);
    }
}

#[cfg(unix)]
mod lveinfo_command_tests {
    use super::*;
    use std::os::unix::fs::PermissionsExt;
    use std::path::PathBuf;
    use tempfile::TempDir;

    fn fake_command(dir: &TempDir, script: &str) -> PathBuf {
        let path = dir.path().join("lveinfo");
        std::fs::write(&path, format!("#!/bin/sh\n{}\n", script)).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    #[tokio::test]
    async fn test_sample_runs_command() {
        let dir = TempDir::new().unwrap();
        let command = fake_command(
            &dir,
            &format!("cat <<'OUT'\n{}OUT", SAMPLE_OUTPUT),
        );

        let source = LveInfoSource::new(command.to_string_lossy(), Duration::from_secs(5));
        let snapshot = source.sample().await.unwrap();
        assert_eq!(snapshot.len(), 3);
        assert_eq!(snapshot[0], UsageSample::new("alice", 95.5));
    }

    #[tokio::test]
    async fn test_non_zero_exit_is_error() {
        let dir = TempDir::new().unwrap();
        let command = fake_command(&dir, "echo 'lve not available' >&2\nexit 3");

        let source = LveInfoSource::new(command.to_string_lossy(), Duration::from_secs(5));
        match source.sample().await {
            Err(SourceError::CommandFailed { stderr, .. }) => {
                assert_eq!(stderr, "lve not available");
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_missing_command() {
        let source = LveInfoSource::new("/nonexistent/lveinfo", Duration::from_secs(5));
        assert!(matches!(
            source.sample().await,
            Err(SourceError::CommandNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_command_timeout() {
        let dir = TempDir::new().unwrap();
        let command = fake_command(&dir, "sleep 5");

        let source = LveInfoSource::new(command.to_string_lossy(), Duration::from_millis(100));
        assert!(matches!(
            source.sample().await,
            Err(SourceError::Timeout { .. })
        ));
    }
}

mod loop_tests {
    use super::*;

    /// Source that replays a fixed snapshot, or fails when empty-handed
    struct StaticSource {
        snapshot: Option<UsageSnapshot>,
        calls: AtomicUsize,
    }

    impl StaticSource {
        fn returning(snapshot: UsageSnapshot) -> Self {
            Self {
                snapshot: Some(snapshot),
                calls: AtomicUsize::new(0),
            }
        }

        fn failing() -> Self {
            Self {
                snapshot: None,
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl UsageSource for StaticSource {
        async fn sample(&self) -> Result<UsageSnapshot, SourceError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.snapshot.clone().ok_or_else(|| SourceError::CommandFailed {
                command: "static".to_string(),
                status: "exit status: 1".to_string(),
                stderr: "unavailable".to_string(),
            })
        }

        fn name(&self) -> &str {
            "static"
        }
    }

    /// Source that panics on its first `panics` calls
    struct PanickingSource {
        panics: usize,
        calls: AtomicUsize,
    }

    impl PanickingSource {
        fn new(panics: usize) -> Self {
            Self {
                panics,
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl UsageSource for PanickingSource {
        async fn sample(&self) -> Result<UsageSnapshot, SourceError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call < self.panics {
                panic!("lveinfo output exploded");
            }
            Ok(Vec::new())
        }

        fn name(&self) -> &str {
            "panicking"
        }
    }

    fn engine(notifier: Arc<RecordingNotifier>) -> AlertEngine {
        AlertEngine::new(
            AlertPolicy::default(),
            Arc::new(MemoryStateStore::new()),
            notifier,
            "server01",
        )
    }

    #[test]
    fn test_schedule_config_default() {
        assert_eq!(ScheduleConfig::default().interval, Duration::from_secs(120));
    }

    #[test]
    fn test_builder_requires_parts() {
        let notifier = Arc::new(RecordingNotifier::new());

        assert!(MonitorLoopBuilder::new()
            .engine(engine(notifier.clone()))
            .build()
            .is_err());
        assert!(MonitorLoopBuilder::new()
            .source(Arc::new(DisabledSource))
            .build()
            .is_err());
        assert!(MonitorLoopBuilder::new()
            .source(Arc::new(DisabledSource))
            .engine(engine(notifier.clone()))
            .interval(Duration::ZERO)
            .build()
            .is_err());
        assert!(MonitorLoopBuilder::new()
            .source(Arc::new(DisabledSource))
            .engine(engine(notifier))
            .interval(Duration::from_secs(5))
            .build()
            .is_ok());
    }

    #[tokio::test]
    async fn test_cycle_alerts_high_accounts() {
        let notifier = Arc::new(RecordingNotifier::new());
        let source = Arc::new(StaticSource::returning(vec![
            UsageSample::new("alice", 95.5),
            UsageSample::new("bob", 10.0),
        ]));
        let health = HealthRegistry::new();
        health.register(components::NOTIFIER).await;

        let mut monitor = MonitorLoopBuilder::new()
            .source(source)
            .engine(engine(notifier.clone()))
            .health(health.clone())
            .build()
            .unwrap();

        let now = Local.with_ymd_and_hms(2025, 11, 10, 12, 0, 0).unwrap();
        let alerted = monitor.run_cycle_at(now).await;

        assert_eq!(alerted, vec![UsageSample::new("alice", 95.5)]);
        assert_eq!(notifier.sent_count(), 1);
        assert_eq!(monitor.engine().last_cycle().sampled, 2);

        let report = health.health().await;
        assert_eq!(report.status, ComponentStatus::Healthy);
    }

    #[tokio::test]
    async fn test_source_failure_degrades_and_continues() {
        let notifier = Arc::new(RecordingNotifier::new());
        let health = HealthRegistry::new();

        let mut monitor = MonitorLoop::new(
            Arc::new(StaticSource::failing()),
            engine(notifier.clone()),
            ScheduleConfig::default(),
        )
        .with_health(health.clone());

        let alerted = monitor.run_cycle().await;
        assert!(alerted.is_empty());
        assert_eq!(notifier.sent_count(), 0);

        let report = health.health().await;
        assert_eq!(
            report.components[components::USAGE_SOURCE].status,
            ComponentStatus::Degraded
        );
        assert_eq!(
            report.components[components::SCHEDULER].status,
            ComponentStatus::Healthy
        );
    }

    #[tokio::test]
    async fn test_delivery_failure_degrades_notifier() {
        let notifier = Arc::new(RecordingNotifier::new());
        notifier.set_failing(true);
        let health = HealthRegistry::new();

        let mut monitor = MonitorLoop::new(
            Arc::new(StaticSource::returning(vec![UsageSample::new("alice", 99.0)])),
            engine(notifier.clone()),
            ScheduleConfig::default(),
        )
        .with_health(health.clone());

        monitor.run_cycle().await;

        let report = health.health().await;
        assert_eq!(report.status, ComponentStatus::Degraded);
        assert_eq!(
            report.components[components::NOTIFIER].status,
            ComponentStatus::Degraded
        );
    }

    #[tokio::test]
    async fn test_run_stops_on_shutdown() {
        let notifier = Arc::new(RecordingNotifier::new());
        let source = Arc::new(StaticSource::returning(Vec::new()));

        let monitor = MonitorLoop::new(
            source.clone(),
            engine(notifier),
            ScheduleConfig {
                interval: Duration::from_millis(20),
            },
        );

        let (shutdown_tx, shutdown_rx) = tokio::sync::broadcast::channel(1);
        let handle = tokio::spawn(monitor.run(shutdown_rx));

        tokio::time::sleep(Duration::from_millis(100)).await;
        shutdown_tx.send(()).unwrap();

        tokio::time::timeout(Duration::from_secs(2), handle)
            .await
            .expect("loop did not stop")
            .unwrap();

        assert!(source.calls.load(Ordering::SeqCst) >= 2);
    }

    async fn run_briefly(source: Arc<PanickingSource>, health: HealthRegistry) {
        let monitor = MonitorLoop::new(
            source,
            engine(Arc::new(RecordingNotifier::new())),
            ScheduleConfig {
                interval: Duration::from_millis(20),
            },
        )
        .with_health(health);

        let (shutdown_tx, shutdown_rx) = tokio::sync::broadcast::channel(1);
        let handle = tokio::spawn(monitor.run(shutdown_rx));

        tokio::time::sleep(Duration::from_millis(100)).await;
        shutdown_tx.send(()).unwrap();

        tokio::time::timeout(Duration::from_secs(2), handle)
            .await
            .expect("loop did not stop")
            .expect("loop task panicked");
    }

    #[tokio::test]
    async fn test_panicking_cycle_keeps_loop_running() {
        let source = Arc::new(PanickingSource::new(usize::MAX));
        let health = HealthRegistry::new();

        run_briefly(source.clone(), health.clone()).await;

        assert!(source.calls.load(Ordering::SeqCst) >= 2);
        let report = health.health().await;
        let scheduler = &report.components[components::SCHEDULER];
        assert_eq!(scheduler.status, ComponentStatus::Unhealthy);
        assert_eq!(
            scheduler.message.as_deref(),
            Some("Cycle panicked: lveinfo output exploded")
        );
        assert!(report.last_cycle_at.is_none());
    }

    #[tokio::test]
    async fn test_scheduler_recovers_after_panic() {
        let source = Arc::new(PanickingSource::new(1));
        let health = HealthRegistry::new();

        run_briefly(source.clone(), health.clone()).await;

        assert!(source.calls.load(Ordering::SeqCst) >= 2);
        let report = health.health().await;
        assert_eq!(
            report.components[components::SCHEDULER].status,
            ComponentStatus::Healthy
        );
        assert!(report.last_cycle_at.is_some());
    }

    #[tokio::test]
    async fn test_disabled_source_samples_nothing() {
        assert!(DisabledSource.sample().await.unwrap().is_empty());
        assert_eq!(DisabledSource.name(), "disabled");
    }

    #[test]
    fn test_create_usage_source_respects_setting() {
        let settings = crate::settings::GuardSettings {
            use_cloudlinux: false,
            ..Default::default()
        };
        assert_eq!(create_usage_source(&settings).name(), "disabled");

        let settings = crate::settings::GuardSettings::default();
        assert_eq!(create_usage_source(&settings).name(), "lveinfo");
    }
}
