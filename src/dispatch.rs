//! The dispatch engine: reads the log on change, selects new lines and fans
//! them out to subscribers whose threshold permits them.
//!
//! The whole file is re-read every cycle. That keeps the engine independent
//! of byte offsets, at the cost of O(file size) work per cycle; it is a known
//! scaling limit for large logs.

use crate::classifier::LineClassifier;
use crate::config::Config;
use crate::core::{LogLine, Subscriber, SubscriberDirectory, Transport};
use crate::error::RelayError;
use crate::formatting::{DisplayZone, MessageFormatter, PlainTextFormatter};
use crate::severity::SeverityModel;
use crate::signal::ChangeSignal;
use crate::watermark::WatermarkTracker;
use chrono::{DateTime, Utc};
use futures::future::join_all;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, instrument, warn};

/// Tunables for the dispatch loop.
#[derive(Debug, Clone)]
pub struct EngineSettings {
    pub log_path: PathBuf,
    pub poll_interval: Duration,
    pub send_timeout: Duration,
    pub epsilon: chrono::Duration,
    pub display_zone: DisplayZone,
}

impl EngineSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            log_path: config.log_path(),
            poll_interval: Duration::from_secs_f64(config.dispatch.poll_interval_seconds),
            send_timeout: Duration::from_millis(config.dispatch.send_timeout_ms),
            epsilon: WatermarkTracker::epsilon_from_secs(config.dispatch.epsilon_seconds),
            display_zone: config.dispatch.display_time_zone,
        }
    }
}

/// Counts describing one dispatch cycle.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CycleReport {
    pub lines_read: usize,
    /// Lines dropped as malformed or carrying an unknown level.
    pub lines_dropped: usize,
    /// Lines at or above the watermark.
    pub lines_selected: usize,
    pub deliveries: usize,
    pub delivery_failures: usize,
    /// The file was shorter than in the previous cycle.
    pub truncated: bool,
}

pub struct DispatchEngine {
    settings: EngineSettings,
    classifier: LineClassifier,
    severity: Arc<SeverityModel>,
    watermark: WatermarkTracker,
    directory: Arc<dyn SubscriberDirectory>,
    transport: Arc<dyn Transport>,
    formatter: Box<dyn MessageFormatter>,
    signal: ChangeSignal,
    last_len: Option<u64>,
}

impl DispatchEngine {
    /// Creates an engine whose watermark starts at `start`.
    pub fn new(
        settings: EngineSettings,
        severity: Arc<SeverityModel>,
        directory: Arc<dyn SubscriberDirectory>,
        transport: Arc<dyn Transport>,
        signal: ChangeSignal,
        start: DateTime<Utc>,
    ) -> Self {
        Self {
            classifier: LineClassifier::new(severity.clone()),
            watermark: WatermarkTracker::new(start, settings.epsilon),
            formatter: Box::new(PlainTextFormatter::new(settings.display_zone)),
            settings,
            severity,
            directory,
            transport,
            signal,
            last_len: None,
        }
    }

    pub fn watermark(&self) -> DateTime<Utc> {
        self.watermark.boundary()
    }

    /// Polls the change signal until shutdown, running one cycle per signal.
    pub async fn run(mut self, mut shutdown_rx: watch::Receiver<bool>) {
        let mut ticker = interval(self.settings.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!(
            path = %self.settings.log_path.display(),
            poll_ms = self.settings.poll_interval.as_millis() as u64,
            watermark = %self.watermark.boundary(),
            "Dispatch engine started"
        );

        loop {
            tokio::select! {
                biased;
                _ = shutdown_rx.changed() => {
                    info!("Dispatch engine received shutdown signal.");
                    break;
                }
                _ = ticker.tick() => {}
            }

            if !self.signal.take() {
                continue;
            }

            match self.run_cycle().await {
                Ok(report) => {
                    if report.lines_selected > 0 || report.delivery_failures > 0 {
                        info!(?report, "Dispatch cycle complete");
                    } else {
                        debug!(?report, "Dispatch cycle complete");
                    }
                }
                Err(e) => warn!(error = %e, "Skipping dispatch cycle"),
            }
        }
        info!("Dispatch engine finished.");
    }

    /// Runs one read-classify-filter-send pass and advances the watermark.
    ///
    /// # Returns
    /// * `Ok(CycleReport)` once every send has been attempted
    /// * `Err(FileUnavailable)` if the log cannot be read; nothing is sent
    ///   and the watermark is unchanged
    /// * `Err(Store)` if the subscriber snapshot cannot be taken
    #[instrument(skip(self), fields(path = %self.settings.log_path.display()))]
    pub async fn run_cycle(&mut self) -> Result<CycleReport, RelayError> {
        let started = Instant::now();
        let mut report = CycleReport::default();

        let bytes = tokio::fs::read(&self.settings.log_path)
            .await
            .map_err(|source| RelayError::FileUnavailable {
                path: self.settings.log_path.clone(),
                source,
            })?;
        let len = bytes.len() as u64;
        if let Some(previous) = self.last_len {
            if len < previous {
                info!(previous, current = len, "Log file shrank; reading replacement content");
                report.truncated = true;
            }
        }
        self.last_len = Some(len);

        let content = String::from_utf8_lossy(&bytes);
        let snapshot = self.watermark.snapshot();
        let mut selected: Vec<LogLine> = Vec::new();
        for raw in content.lines() {
            report.lines_read += 1;
            match self.classifier.classify(raw) {
                Ok(Some(line)) => {
                    metrics::counter!("lines_classified_total").increment(1);
                    if snapshot.should_dispatch(&line) {
                        selected.push(line);
                    }
                }
                Ok(None) => {}
                Err(e) => {
                    report.lines_dropped += 1;
                    metrics::counter!("lines_dropped_total", "reason" => e.kind()).increment(1);
                    debug!(error = %e, line = raw, "Dropping log line");
                }
            }
        }
        report.lines_selected = selected.len();

        if !selected.is_empty() {
            let subscribers = self.directory.list().await?;
            for line in &selected {
                self.fan_out(line, &subscribers, &mut report).await;
            }
        }

        self.watermark.advance(selected.iter());
        metrics::gauge!("watermark_unix_seconds").set(self.watermark.boundary().timestamp() as f64);
        metrics::histogram!("dispatch_cycle_duration_seconds").record(started.elapsed().as_secs_f64());
        Ok(report)
    }

    /// Sends one line to every permitted subscriber concurrently. Failures
    /// are logged per subscriber and never abort the cycle.
    async fn fan_out(&self, line: &LogLine, subscribers: &[Subscriber], report: &mut CycleReport) {
        let text = self.formatter.format_line(line);
        let recipients: Vec<&Subscriber> = subscribers
            .iter()
            .filter(|s| self.severity.permits(&s.threshold, &line.level))
            .collect();

        let sends = recipients.iter().map(|s| self.deliver(&s.id, &text));
        for result in join_all(sends).await {
            match result {
                Ok(()) => {
                    report.deliveries += 1;
                    metrics::counter!("deliveries_total", "outcome" => "sent").increment(1);
                }
                Err(e) => {
                    report.delivery_failures += 1;
                    metrics::counter!("deliveries_total", "outcome" => "failed").increment(1);
                    warn!(error = %e, "Notification not delivered; it will not be retried");
                }
            }
        }
    }

    async fn deliver(&self, subscriber_id: &str, text: &str) -> Result<(), RelayError> {
        match tokio::time::timeout(
            self.settings.send_timeout,
            self.transport.send(subscriber_id, text),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(RelayError::TransportFailure {
                subscriber: subscriber_id.to_string(),
                reason: format!(
                    "{} send timed out after {}ms",
                    self.transport.name(),
                    self.settings.send_timeout.as_millis()
                ),
            }),
        }
    }
}
