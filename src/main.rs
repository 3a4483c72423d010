//! LogRelay - Log Notification Relay
//!
//! Watches an application log file and relays new lines to Telegram
//! subscribers according to each subscriber's severity threshold.

use anyhow::Result;
use clap::Parser;
use logrelay::{app::App, cli::Cli, config::Config};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Load configuration by layering sources: defaults, file, environment, and CLI args.
    let config = Config::load(&cli).unwrap_or_else(|err| {
        tracing_subscriber::fmt().init();
        error!("Failed to load configuration: {:#}", err);
        std::process::exit(1);
    });

    // RUST_LOG wins over the configured level.
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.log_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("LogRelay starting up...");
    info!("-------------------- Configuration --------------------");
    info!("Log Level: {}", config.log_level);
    info!("Log File: {}", config.log_path().display());
    info!("Debounce: {}ms", config.watch.debounce_ms);
    info!("Poll Interval: {}s", config.dispatch.poll_interval_seconds);
    info!("Watermark Epsilon: {}s", config.dispatch.epsilon_seconds);
    info!("Send Timeout: {}ms", config.dispatch.send_timeout_ms);
    info!("Display Time Zone: {}", config.dispatch.display_time_zone);
    info!("Subscriber Store: {}", config.subscribers.store_path.display());
    info!("Default Threshold: {}", config.subscribers.default_threshold);
    info!(
        "Telegram: {}",
        if config.telegram.enabled { "Enabled" } else { "Disabled" }
    );
    if config.metrics.enabled {
        info!("Metrics: {}", config.metrics.listen_address);
    } else {
        info!("Metrics: Disabled");
    }
    info!("-------------------------------------------------------");

    let (shutdown_tx, _) = watch::channel(false);
    let shutdown_tx = Arc::new(shutdown_tx);

    let app = match App::builder(config).build(shutdown_tx.clone()).await {
        Ok(app) => app,
        Err(e) => {
            error!("Failed to start: {:#}", e);
            std::process::exit(1);
        }
    };

    tokio::spawn(async move {
        wait_for_termination().await;
        info!("Termination requested. Shutting down gracefully...");
        shutdown_tx.send_replace(true);
    });

    if let Err(e) = app.run().await {
        error!("{:#}", e);
        std::process::exit(1);
    }

    info!("All tasks shut down. Exiting.");
    Ok(())
}

#[cfg(unix)]
async fn wait_for_termination() {
    use tokio::signal::unix::{signal, SignalKind};
    match signal(SignalKind::terminate()) {
        Ok(mut sigterm) => {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {}
                _ = sigterm.recv() => {}
            }
        }
        Err(e) => {
            error!("Cannot listen for SIGTERM: {}", e);
            let _ = tokio::signal::ctrl_c().await;
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_termination() {
    let _ = tokio::signal::ctrl_c().await;
}
