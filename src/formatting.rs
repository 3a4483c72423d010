// Rendering of log lines into outbound notification text.

use crate::core::LogLine;
use chrono::{Local, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// The time zone notification timestamps are shown in.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DisplayZone {
    /// The relay host's local time zone.
    #[default]
    Local,
    Utc,
}

impl fmt::Display for DisplayZone {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Local => write!(f, "local"),
            Self::Utc => write!(f, "utc"),
        }
    }
}

/// A trait for turning a classified line into the text sent to subscribers.
pub trait MessageFormatter: Send + Sync {
    fn format_line(&self, line: &LogLine) -> String;
}

/// Formats lines as `YYYY-MM-DD HH:MM:SS [LEVEL]: text`.
#[derive(Debug, Clone, Copy, Default)]
pub struct PlainTextFormatter {
    zone: DisplayZone,
}

impl PlainTextFormatter {
    pub fn new(zone: DisplayZone) -> Self {
        Self { zone }
    }
}

const DISPLAY_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

impl MessageFormatter for PlainTextFormatter {
    fn format_line(&self, line: &LogLine) -> String {
        let time = match self.zone {
            DisplayZone::Local => line
                .timestamp
                .with_timezone(&Local)
                .format(DISPLAY_FORMAT)
                .to_string(),
            DisplayZone::Utc => line
                .timestamp
                .with_timezone(&Utc)
                .format(DISPLAY_FORMAT)
                .to_string(),
        };
        format!("{} [{}]: {}", time, line.level, line.text)
    }
}
