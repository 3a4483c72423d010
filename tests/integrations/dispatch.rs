//! Dispatch cycle behaviour against a real log file and mock collaborators.

#[path = "../helpers/mod.rs"]
mod helpers;

use helpers::{
    at, before_all, default_severity, fs_watch::append_lines, mock_directory::MemoryDirectory,
    mock_transport::RecordingTransport,
};
use logrelay::{
    dispatch::{DispatchEngine, EngineSettings},
    formatting::DisplayZone,
    signal::ChangeSignal,
    RelayError,
};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

struct Fixture {
    dir: TempDir,
    directory: MemoryDirectory,
    transport: RecordingTransport,
}

impl Fixture {
    fn new(subscribers: &[(&str, &str)]) -> Self {
        Self {
            dir: tempfile::tempdir().unwrap(),
            directory: MemoryDirectory::with(subscribers),
            transport: RecordingTransport::new(),
        }
    }

    fn log_path(&self) -> PathBuf {
        self.dir.path().join("logs.log")
    }

    fn engine(&self, send_timeout: Duration) -> DispatchEngine {
        let settings = EngineSettings {
            log_path: self.log_path(),
            poll_interval: Duration::from_millis(20),
            send_timeout,
            epsilon: chrono::Duration::milliseconds(100),
            display_zone: DisplayZone::Utc,
        };
        DispatchEngine::new(
            settings,
            default_severity(),
            Arc::new(self.directory.clone()),
            Arc::new(self.transport.clone()),
            ChangeSignal::new(),
            before_all(),
        )
    }

    async fn write(&self, lines: &[&str]) {
        append_lines(self.log_path(), lines).await.unwrap();
    }
}

#[tokio::test]
async fn error_line_reaches_every_permitted_subscriber() {
    let fixture = Fixture::new(&[("A", "ERROR"), ("B", "DEBUG")]);
    fixture.write(&["2024-01-01T00:00:00Z [ERROR] disk full"]).await;
    let mut engine = fixture.engine(Duration::from_secs(1));

    let report = engine.run_cycle().await.unwrap();

    assert_eq!(report.deliveries, 2);
    let expected = "2024-01-01 00:00:00 [ERROR]: disk full";
    assert_eq!(fixture.transport.sent_to("A"), vec![expected]);
    assert_eq!(fixture.transport.sent_to("B"), vec![expected]);
}

#[tokio::test]
async fn debug_line_only_reaches_verbose_subscribers() {
    let fixture = Fixture::new(&[("A", "ERROR"), ("B", "DEBUG")]);
    fixture.write(&["2024-01-01T00:00:00Z [DEBUG] heartbeat"]).await;
    let mut engine = fixture.engine(Duration::from_secs(1));

    engine.run_cycle().await.unwrap();

    assert!(fixture.transport.sent_to("A").is_empty());
    assert_eq!(
        fixture.transport.sent_to("B"),
        vec!["2024-01-01 00:00:00 [DEBUG]: heartbeat"]
    );
}

#[tokio::test]
async fn watermark_moves_past_the_newest_line() {
    let fixture = Fixture::new(&[("A", "DEBUG")]);
    fixture
        .write(&[
            "2024-01-01T00:00:01Z [INFO] one",
            "2024-01-01T00:00:03Z [INFO] three",
            "2024-01-01T00:00:02Z [INFO] two",
        ])
        .await;
    let mut engine = fixture.engine(Duration::from_secs(1));

    let report = engine.run_cycle().await.unwrap();

    assert_eq!(report.lines_selected, 3);
    assert_eq!(
        engine.watermark(),
        at(0, 0, 3) + chrono::Duration::milliseconds(100)
    );
}

#[tokio::test]
async fn lines_sharing_a_timestamp_are_all_delivered_once() {
    let fixture = Fixture::new(&[("A", "DEBUG")]);
    fixture
        .write(&[
            "2024-01-01T00:00:05Z [INFO] first",
            "2024-01-01T00:00:05Z [INFO] second",
        ])
        .await;
    let mut engine = fixture.engine(Duration::from_secs(1));

    engine.run_cycle().await.unwrap();
    engine.run_cycle().await.unwrap();

    assert_eq!(fixture.transport.sent_to("A").len(), 2);
}

#[tokio::test]
async fn second_cycle_only_sends_new_lines() {
    let fixture = Fixture::new(&[("A", "DEBUG")]);
    fixture.write(&["2024-01-01T00:00:01Z [INFO] old"]).await;
    let mut engine = fixture.engine(Duration::from_secs(1));
    engine.run_cycle().await.unwrap();

    fixture.write(&["2024-01-01T00:00:02Z [INFO] new"]).await;
    let report = engine.run_cycle().await.unwrap();

    assert_eq!(report.lines_read, 2);
    assert_eq!(report.lines_selected, 1);
    assert_eq!(
        fixture.transport.sent_to("A"),
        vec![
            "2024-01-01 00:00:01 [INFO]: old",
            "2024-01-01 00:00:02 [INFO]: new"
        ]
    );
}

#[tokio::test]
async fn bad_lines_are_skipped_without_aborting_the_cycle() {
    let fixture = Fixture::new(&[("A", "DEBUG")]);
    fixture
        .write(&[
            "",
            "2024-01-01T00:00:00Z [TRACE] too chatty",
            "not a log line",
            "2024-01-01T00:00:00Z [INFO] service started",
        ])
        .await;
    let mut engine = fixture.engine(Duration::from_secs(1));

    let report = engine.run_cycle().await.unwrap();

    assert_eq!(report.lines_dropped, 2);
    assert_eq!(
        fixture.transport.sent_to("A"),
        vec!["2024-01-01 00:00:00 [INFO]: service started"]
    );
}

#[tokio::test]
async fn lines_before_the_starting_watermark_are_not_sent() {
    let fixture = Fixture::new(&[("A", "DEBUG")]);
    fixture.write(&["2023-06-01T00:00:00Z [ERROR] ancient"]).await;
    let mut engine = fixture.engine(Duration::from_secs(1));

    let report = engine.run_cycle().await.unwrap();

    assert_eq!(report.lines_selected, 0);
    assert!(fixture.transport.sent().is_empty());
    assert_eq!(engine.watermark(), before_all());
}

#[tokio::test]
async fn one_failing_subscriber_does_not_block_the_others() {
    let fixture = Fixture::new(&[("A", "DEBUG"), ("B", "DEBUG")]);
    fixture.transport.fail_for("A");
    fixture.write(&["2024-01-01T00:00:00Z [ERROR] disk full"]).await;
    let mut engine = fixture.engine(Duration::from_secs(1));

    let report = engine.run_cycle().await.unwrap();

    assert_eq!(report.deliveries, 1);
    assert_eq!(report.delivery_failures, 1);
    assert_eq!(fixture.transport.sent_to("B").len(), 1);

    // At-most-once: the failed send is not retried on the next cycle.
    engine.run_cycle().await.unwrap();
    assert!(fixture.transport.sent_to("A").is_empty());
    assert_eq!(fixture.transport.sent_to("B").len(), 1);
}

#[tokio::test]
async fn stalled_send_is_cut_off_by_the_timeout() {
    let fixture = Fixture::new(&[("slow", "DEBUG"), ("fast", "DEBUG")]);
    fixture.transport.delay_for("slow", Duration::from_secs(30));
    fixture.write(&["2024-01-01T00:00:00Z [ERROR] disk full"]).await;
    let mut engine = fixture.engine(Duration::from_millis(100));

    let report = tokio::time::timeout(Duration::from_secs(5), engine.run_cycle())
        .await
        .expect("cycle should not wait for the stalled send")
        .unwrap();

    assert_eq!(report.delivery_failures, 1);
    assert_eq!(fixture.transport.sent_to("fast").len(), 1);
}

#[tokio::test]
async fn missing_file_fails_the_cycle_and_keeps_the_watermark() {
    let fixture = Fixture::new(&[("A", "DEBUG")]);
    let mut engine = fixture.engine(Duration::from_secs(1));

    let err = engine.run_cycle().await.unwrap_err();

    assert!(matches!(err, RelayError::FileUnavailable { .. }), "{err:?}");
    assert_eq!(engine.watermark(), before_all());

    // The file appearing later is picked up normally.
    fixture.write(&["2024-01-01T00:00:00Z [ERROR] back"]).await;
    engine.run_cycle().await.unwrap();
    assert_eq!(fixture.transport.sent_to("A").len(), 1);
}

#[tokio::test]
async fn truncated_file_is_read_without_resending_old_lines() {
    let fixture = Fixture::new(&[("A", "DEBUG")]);
    fixture
        .write(&[
            "2024-01-01T00:00:01Z [INFO] one",
            "2024-01-01T00:00:02Z [INFO] two",
        ])
        .await;
    let mut engine = fixture.engine(Duration::from_secs(1));
    engine.run_cycle().await.unwrap();

    // Rotation replaces the file with shorter content.
    tokio::fs::write(fixture.log_path(), "2024-01-01T00:00:09Z [INFO] after\n")
        .await
        .unwrap();
    let report = engine.run_cycle().await.unwrap();

    assert!(report.truncated);
    assert_eq!(report.lines_selected, 1);
    assert_eq!(
        fixture.transport.sent_to("A").last().map(String::as_str),
        Some("2024-01-01 00:00:09 [INFO]: after")
    );
    assert_eq!(fixture.transport.sent_to("A").len(), 3);
}

#[tokio::test]
async fn directory_failure_skips_the_cycle_and_retries_later() {
    let fixture = Fixture::new(&[("A", "DEBUG")]);
    fixture.directory.set_fail(true);
    fixture.write(&["2024-01-01T00:00:00Z [ERROR] disk full"]).await;
    let mut engine = fixture.engine(Duration::from_secs(1));

    let err = engine.run_cycle().await.unwrap_err();
    assert!(matches!(err, RelayError::Store(_)), "{err:?}");
    assert_eq!(engine.watermark(), before_all());

    fixture.directory.set_fail(false);
    engine.run_cycle().await.unwrap();
    assert_eq!(fixture.transport.sent_to("A").len(), 1);
}

#[tokio::test]
async fn no_subscribers_still_advances_the_watermark() {
    let fixture = Fixture::new(&[]);
    fixture.write(&["2024-01-01T00:00:04Z [ERROR] nobody listening"]).await;
    let mut engine = fixture.engine(Duration::from_secs(1));

    let report = engine.run_cycle().await.unwrap();

    assert_eq!(report.deliveries, 0);
    assert!(engine.watermark() > at(0, 0, 4));
}
