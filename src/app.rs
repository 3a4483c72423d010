//! The main application logic, decoupled from the entry point.

use crate::{
    commands::{command_menu, CommandHandler},
    config::Config,
    core::{SubscriberDirectory, Transport},
    detector::ChangeDetector,
    dispatch::{DispatchEngine, EngineSettings},
    internal_metrics::MetricsBuilder,
    notification::{
        poller::CommandPoller,
        telegram::{TelegramClient, TelegramTransport},
    },
    severity::SeverityModel,
    signal::ChangeSignal,
    store::JsonSubscriberStore,
    task_manager::TaskManager,
};
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use std::net::SocketAddr;
use std::{sync::Arc, time::Duration};
use tokio::sync::watch;
use tracing::{info, instrument, warn};

/// A handle to the running application, containing all its task handles.
pub struct App {
    task_manager: TaskManager,
    metrics_addr: Option<SocketAddr>,
}

impl App {
    /// Creates a new `AppBuilder` to construct an `App`.
    pub fn builder(config: Config) -> AppBuilder {
        AppBuilder::new(config)
    }

    pub fn metrics_addr(&self) -> Option<SocketAddr> {
        self.metrics_addr
    }

    /// Waits for the shutdown signal and then gracefully shuts down all tasks.
    ///
    /// Returns an error if shutdown was caused by a fatal task failure.
    pub async fn run(self) -> Result<()> {
        let mut shutdown_rx = self.task_manager.get_shutdown_rx();
        if !*shutdown_rx.borrow() {
            shutdown_rx.changed().await.ok();
        }
        info!("Shutdown signal received. Waiting for tasks to complete...");

        let failure = self.task_manager.clone();
        self.task_manager.shutdown().await;

        match failure.failure() {
            Some(reason) => Err(anyhow::anyhow!("relay stopped after a fatal error: {}", reason)),
            None => Ok(()),
        }
    }
}

/// Builder for the main application.
///
/// Separates constructing the components from running them, and lets tests
/// replace the external collaborators.
pub struct AppBuilder {
    config: Config,
    directory_override: Option<Arc<dyn SubscriberDirectory>>,
    transport_override: Option<Arc<dyn Transport>>,
    watermark_start: Option<DateTime<Utc>>,
}

impl AppBuilder {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            directory_override: None,
            transport_override: None,
            watermark_start: None,
        }
    }

    /// Overrides the subscriber directory for testing.
    pub fn directory_override(mut self, directory: Arc<dyn SubscriberDirectory>) -> Self {
        self.directory_override = Some(directory);
        self
    }

    /// Overrides the outbound transport for testing.
    pub fn transport_override(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport_override = Some(transport);
        self
    }

    /// Starts the watermark somewhere other than "now".
    pub fn watermark_start(mut self, start: DateTime<Utc>) -> Self {
        self.watermark_start = Some(start);
        self
    }

    /// Builds and starts all components, returning a runnable `App`.
    #[instrument(skip_all)]
    pub async fn build(self, shutdown_tx: Arc<watch::Sender<bool>>) -> Result<App> {
        let config = self.config;
        config.validate()?;
        let task_manager = TaskManager::new(shutdown_tx);

        // Everything that can fail runs before the first task is spawned, so
        // a failed build leaves nothing running.

        // =========================================================================
        // 1. Severity order and subscriber directory
        // =========================================================================
        let severity = Arc::new(SeverityModel::new(&config.severity.levels())?);
        let default_threshold = severity.parse_loose(&config.subscribers.default_threshold)?;

        let directory = match self.directory_override {
            Some(directory) => directory,
            None => Arc::new(
                JsonSubscriberStore::open(&config.subscribers.store_path)
                    .await
                    .context("failed to open the subscriber store")?,
            ) as Arc<dyn SubscriberDirectory>,
        };

        // =========================================================================
        // 2. Chat service client and outbound transport
        // =========================================================================
        let send_timeout = Duration::from_millis(config.dispatch.send_timeout_ms);
        let telegram = if config.telegram.enabled {
            let token = config.telegram_token()?;
            Some(Arc::new(TelegramClient::new(
                config.telegram.api_url.clone(),
                token,
                send_timeout,
            )))
        } else {
            None
        };

        let transport: Arc<dyn Transport> = match (self.transport_override, &telegram) {
            (Some(transport), _) => transport,
            (None, Some(client)) => Arc::new(TelegramTransport::new(client.as_ref().clone())),
            (None, None) => anyhow::bail!("no transport configured: enable [telegram]"),
        };

        // =========================================================================
        // 3. Change detector registration
        // =========================================================================
        let signal = ChangeSignal::new();
        let detector = ChangeDetector::new(
            config.watch.log_dir.clone(),
            config.watch.file_name.clone(),
            Duration::from_millis(config.watch.debounce_ms),
            signal.clone(),
        )
        .start()
        .with_context(|| format!("cannot watch {}", config.watch.log_dir.display()))?;

        // =========================================================================
        // 4. Spawn the long-running tasks
        // =========================================================================
        if let Some(client) = telegram {
            if let Err(e) = client.set_my_commands(&command_menu(&severity)).await {
                warn!(error = %e, "Failed to register the bot command menu");
            }
            let handler = CommandHandler::new(directory.clone(), severity.clone(), default_threshold);
            let poller = CommandPoller::new(
                client,
                handler,
                Duration::from_secs(config.telegram.poll_timeout_seconds),
            );
            task_manager.spawn("CommandPoller", poller.run(task_manager.get_shutdown_rx()));
        }

        task_manager.spawn_critical("ChangeDetector", detector.run(task_manager.get_shutdown_rx()));

        let engine = DispatchEngine::new(
            EngineSettings::from_config(&config),
            severity,
            directory,
            transport,
            signal,
            self.watermark_start.unwrap_or_else(Utc::now),
        );
        task_manager.spawn("DispatchEngine", engine.run(task_manager.get_shutdown_rx()));

        // =========================================================================
        // 5. Metrics
        // =========================================================================
        let metrics_addr = match MetricsBuilder::new(config.metrics.clone())
            .build(task_manager.get_shutdown_rx())
        {
            Some((server, addr)) => {
                info!(%addr, "Serving metrics");
                task_manager.spawn("MetricsServer", server.run());
                Some(addr)
            }
            None => None,
        };

        info!(path = %config.log_path().display(), "Log relay initialized. Watching for new lines...");

        Ok(App {
            task_manager,
            metrics_addr,
        })
    }
}
