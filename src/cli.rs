//! Command-Line Interface (CLI) argument parsing.
//!
//! This module defines the command-line arguments for the application using the
//! `clap` crate. These arguments are parsed at startup and then merged with
//! the configuration from the `logrelay.toml` file and environment variables.

use clap::Parser;
use figment::{
    value::{Dict, Map, Value},
    Error, Metadata, Profile, Provider,
};
use std::path::PathBuf;

/// Relays new log lines to chat subscribers, filtered by severity.
#[derive(Parser, Debug, Clone, Default)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Path to the TOML configuration file.
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Directory containing the log file to watch.
    #[arg(long, value_name = "DIR")]
    pub log_dir: Option<PathBuf>,

    /// How often the dispatch loop checks for changes, in seconds.
    #[arg(long, value_name = "SECONDS")]
    pub poll_interval: Option<f64>,

    /// Quiet window for coalescing bursts of writes, in milliseconds.
    #[arg(long, value_name = "MS")]
    pub debounce_ms: Option<u64>,

    /// Watermark offset past the newest dispatched line, in seconds.
    #[arg(long, value_name = "SECONDS")]
    pub epsilon: Option<f64>,

    /// Severity assigned to new subscribers.
    #[arg(long, value_name = "LEVEL")]
    pub default_threshold: Option<String>,

    /// Logging level for the relay (e.g. info, debug).
    #[arg(long, value_name = "LEVEL")]
    pub log_level: Option<String>,
}

impl Provider for Cli {
    fn metadata(&self) -> Metadata {
        Metadata::named("Command-Line Arguments")
    }

    fn data(&self) -> Result<Map<Profile, Dict>, Error> {
        let mut watch = Dict::new();
        if let Some(dir) = &self.log_dir {
            watch.insert("log_dir".into(), Value::from(dir.display().to_string()));
        }
        if let Some(ms) = self.debounce_ms {
            watch.insert("debounce_ms".into(), Value::from(ms));
        }

        let mut dispatch = Dict::new();
        if let Some(secs) = self.poll_interval {
            dispatch.insert("poll_interval_seconds".into(), Value::from(secs));
        }
        if let Some(secs) = self.epsilon {
            dispatch.insert("epsilon_seconds".into(), Value::from(secs));
        }

        let mut subscribers = Dict::new();
        if let Some(level) = &self.default_threshold {
            subscribers.insert("default_threshold".into(), Value::from(level.clone()));
        }

        // Nested sections must be dictionaries; dotted keys would not merge.
        let mut dict = Dict::new();
        for (name, section) in [("watch", watch), ("dispatch", dispatch), ("subscribers", subscribers)] {
            if !section.is_empty() {
                dict.insert(name.into(), Value::from(section));
            }
        }
        if let Some(level) = &self.log_level {
            dict.insert("log_level".into(), Value::from(level.clone()));
        }

        let mut map = Map::new();
        map.insert(Profile::Default, dict);
        Ok(map)
    }
}
