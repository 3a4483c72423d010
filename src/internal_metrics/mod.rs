//! # Internal Metrics Module
//!
//! Metrics are recorded through the `metrics` facade at their call sites.
//! When enabled, `MetricsBuilder` installs a Prometheus recorder and returns
//! a `MetricsServer` exposing `/metrics`; otherwise the facade is a no-op.

use crate::config::MetricsConfig;
use crate::internal_metrics::server::MetricsServer;
use metrics::Unit;
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder};
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::error;

pub mod server;

/// Registers descriptions for every metric the relay records.
pub fn describe() {
    metrics::describe_counter!("lines_classified_total", Unit::Count, "Log lines that parsed into a known severity.");
    metrics::describe_counter!("lines_dropped_total", Unit::Count, "Log lines dropped during classification, labeled by reason.");
    metrics::describe_counter!("deliveries_total", Unit::Count, "Notification sends, labeled by outcome.");
    metrics::describe_counter!("change_events_total", Unit::Count, "Log file change notifications, labeled by debounce outcome.");
    metrics::describe_gauge!("watermark_unix_seconds", Unit::Seconds, "The current dispatch watermark as a Unix timestamp.");
    metrics::describe_histogram!("dispatch_cycle_duration_seconds", Unit::Seconds, "Time taken by one dispatch cycle, including sends.");
}

/// Builder for the metrics system.
pub struct MetricsBuilder {
    config: MetricsConfig,
}

impl MetricsBuilder {
    pub fn new(config: MetricsConfig) -> Self {
        Self { config }
    }

    /// Installs the Prometheus recorder and binds the metrics listener.
    ///
    /// Returns `None` when metrics are disabled or cannot be set up; the
    /// relay keeps running without them.
    pub fn build(self, shutdown_rx: watch::Receiver<bool>) -> Option<(MetricsServer, SocketAddr)> {
        if !self.config.enabled {
            return None;
        }

        let recorder = match PrometheusBuilder::new().set_buckets_for_metric(
            Matcher::Suffix("duration_seconds".to_string()),
            &[0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0],
        ) {
            Ok(builder) => builder.build_recorder(),
            Err(e) => {
                error!("Failed to configure Prometheus recorder: {}", e);
                return None;
            }
        };
        let handle = recorder.handle();

        // Bind before installing the recorder so a bad address leaves the
        // facade untouched.
        let listener = match std::net::TcpListener::bind(self.config.listen_address)
            .and_then(|l| l.set_nonblocking(true).map(|_| l))
            .and_then(TcpListener::from_std)
        {
            Ok(listener) => listener,
            Err(e) => {
                error!(
                    "Failed to bind metrics server to {}: {}",
                    self.config.listen_address, e
                );
                return None;
            }
        };
        let addr = match listener.local_addr() {
            Ok(addr) => addr,
            Err(e) => {
                error!("Failed to get local address for metrics server: {}", e);
                return None;
            }
        };

        if let Err(e) = metrics::set_global_recorder(recorder) {
            error!("Failed to install Prometheus recorder: {}", e);
            return None;
        }
        describe();

        Some((MetricsServer::new(listener, handle, shutdown_rx), addr))
    }
}
