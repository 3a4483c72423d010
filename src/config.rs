//! Configuration management for the relay
//!
//! This module defines the main `Config` struct and its sub-structs,
//! responsible for holding all application settings. It uses the `figment`
//! crate to layer defaults, a `logrelay.toml` file, `LOGRELAY_` environment
//! variables and command-line arguments.

use crate::cli::Cli;
use crate::formatting::DisplayZone;
use crate::severity::{default_levels, SeverityModel};
use anyhow::{Context, Result};
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

/// The config file read when `--config` is not given.
pub const DEFAULT_CONFIG_FILE: &str = "logrelay.toml";

const POLL_INTERVAL_RANGE: std::ops::RangeInclusive<f64> = 0.001..=86_400.0;
const EPSILON_RANGE: std::ops::RangeInclusive<f64> = 0.001..=3_600.0;
const MAX_DEBOUNCE_MS: u64 = 3_600_000;

/// The main configuration struct for the application.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Config {
    /// The logging level for the relay itself.
    pub log_level: String,
    pub watch: WatchConfig,
    pub dispatch: DispatchConfig,
    pub subscribers: SubscribersConfig,
    pub severity: SeverityConfig,
    pub telegram: TelegramConfig,
    pub metrics: MetricsConfig,
}

/// Which file to watch and how change bursts are coalesced.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct WatchConfig {
    /// The directory containing the log file.
    pub log_dir: PathBuf,
    /// The exact file name to react to inside `log_dir`.
    pub file_name: String,
    /// Quiet window after a change signal, in milliseconds.
    pub debounce_ms: u64,
}

/// Cadence and delivery settings for the dispatch loop.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct DispatchConfig {
    /// How often the loop checks for a change signal.
    pub poll_interval_seconds: f64,
    /// Offset added past the newest dispatched timestamp.
    pub epsilon_seconds: f64,
    /// Upper bound on a single send.
    pub send_timeout_ms: u64,
    /// Time zone used for timestamps in notifications.
    pub display_time_zone: DisplayZone,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct SubscribersConfig {
    /// JSON file holding subscriptions.
    pub store_path: PathBuf,
    /// Threshold assigned on subscribe.
    pub default_threshold: String,
}

#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct SeverityConfig {
    /// Level token to rank; higher ranks are more verbose. A configured
    /// table replaces the built-in levels rather than extending them.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub levels: Option<BTreeMap<String, u8>>,
}

impl SeverityConfig {
    /// The configured levels, or the built-in ERROR/INFO/DEBUG set.
    pub fn levels(&self) -> BTreeMap<String, u8> {
        self.levels.clone().unwrap_or_else(default_levels)
    }
}

/// Configuration for the Telegram bot.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct TelegramConfig {
    /// Whether to deliver through Telegram and accept commands.
    pub enabled: bool,
    /// The bot token. Takes precedence over `token_file`.
    pub token: Option<String>,
    /// A file whose first line is the bot token.
    pub token_file: PathBuf,
    /// The Bot API base URL.
    pub api_url: String,
    /// Long-poll timeout for `getUpdates`.
    pub poll_timeout_seconds: u64,
}

/// Configuration for the Prometheus endpoint.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct MetricsConfig {
    pub enabled: bool,
    pub listen_address: SocketAddr,
}

impl Config {
    /// Loads the configuration by layering sources: defaults, file,
    /// environment, and CLI args.
    pub fn load(cli: &Cli) -> Result<Self> {
        let config_path = cli
            .config
            .clone()
            .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE));
        let config: Config = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Toml::file(&config_path))
            // e.g. LOGRELAY_WATCH__DEBOUNCE_MS=500
            .merge(Env::prefixed("LOGRELAY_").split("__"))
            .merge(cli.clone())
            .extract()
            .with_context(|| format!("invalid configuration (file: {})", config_path.display()))?;
        config.validate()?;
        Ok(config)
    }

    /// Rejects values the relay cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.watch.file_name.is_empty() || self.watch.file_name.contains(['/', '\\']) {
            anyhow::bail!("watch.file_name must be a bare file name, got '{}'", self.watch.file_name);
        }
        if self.watch.debounce_ms > MAX_DEBOUNCE_MS {
            anyhow::bail!("watch.debounce_ms must be at most {MAX_DEBOUNCE_MS}");
        }
        // NaN fails `contains`, infinities fall outside the range.
        if !POLL_INTERVAL_RANGE.contains(&self.dispatch.poll_interval_seconds) {
            anyhow::bail!(
                "dispatch.poll_interval_seconds must be between {} and {}, got {}",
                POLL_INTERVAL_RANGE.start(),
                POLL_INTERVAL_RANGE.end(),
                self.dispatch.poll_interval_seconds
            );
        }
        if !EPSILON_RANGE.contains(&self.dispatch.epsilon_seconds) {
            anyhow::bail!(
                "dispatch.epsilon_seconds must be between {} and {}, got {}",
                EPSILON_RANGE.start(),
                EPSILON_RANGE.end(),
                self.dispatch.epsilon_seconds
            );
        }
        if self.dispatch.send_timeout_ms == 0 {
            anyhow::bail!("dispatch.send_timeout_ms must be positive");
        }
        let severity = SeverityModel::new(&self.severity.levels())
            .context("invalid severity.levels")?;
        if severity.parse_loose(&self.subscribers.default_threshold).is_err() {
            anyhow::bail!(
                "subscribers.default_threshold '{}' is not a configured severity level",
                self.subscribers.default_threshold
            );
        }
        Ok(())
    }

    /// The full path of the watched log file.
    pub fn log_path(&self) -> PathBuf {
        self.watch.log_dir.join(&self.watch.file_name)
    }

    /// Resolves the bot token from `telegram.token` or the token file.
    pub fn telegram_token(&self) -> Result<String> {
        if let Some(token) = self.telegram.token.as_ref().filter(|t| !t.trim().is_empty()) {
            return Ok(token.trim().to_string());
        }
        read_token_file(&self.telegram.token_file)
    }
}

fn read_token_file(path: &Path) -> Result<String> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("cannot read Telegram token file {}", path.display()))?;
    content
        .lines()
        .next()
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .with_context(|| format!("Telegram token file {} is empty", path.display()))
}

// Provide a default implementation for tests and easy setup.
impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            watch: WatchConfig {
                log_dir: PathBuf::from("logs/"),
                file_name: "logs.log".to_string(),
                debounce_ms: 200,
            },
            dispatch: DispatchConfig {
                poll_interval_seconds: 1.0,
                epsilon_seconds: 0.1,
                send_timeout_ms: 10_000,
                display_time_zone: DisplayZone::Local,
            },
            subscribers: SubscribersConfig {
                store_path: PathBuf::from("subscribers.json"),
                default_threshold: "ERROR".to_string(),
            },
            severity: SeverityConfig::default(),
            telegram: TelegramConfig {
                enabled: true,
                token: None,
                token_file: PathBuf::from("TOKEN.txt"),
                api_url: "https://api.telegram.org".to_string(),
                poll_timeout_seconds: 30,
            },
            metrics: MetricsConfig {
                enabled: false,
                listen_address: ([127, 0, 0, 1], 9090).into(),
            },
        }
    }
}
