//! Parsing of raw log lines into `LogLine` values.
//!
//! The accepted shape is `<YYYY-MM-DDTHH:MM:SSZ> [<LEVEL>] <text>`. Only the
//! first two fields are whitespace-delimited; the text keeps its inner
//! whitespace.

use crate::core::LogLine;
use crate::error::RelayError;
use crate::severity::SeverityModel;
use chrono::{DateTime, NaiveDateTime, Utc};
use std::sync::Arc;

/// The only timestamp format recognised in the log file.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%SZ";

/// Parses raw lines against a fixed severity order.
#[derive(Debug, Clone)]
pub struct LineClassifier {
    severity: Arc<SeverityModel>,
}

impl LineClassifier {
    pub fn new(severity: Arc<SeverityModel>) -> Self {
        Self { severity }
    }

    /// Classifies one newline-stripped line.
    ///
    /// # Returns
    /// * `Ok(None)` for lines that are blank after trimming
    /// * `Ok(Some(line))` for a well-formed line with a recognised level
    /// * `Err(MalformedLine)` if the structure or timestamp is invalid
    /// * `Err(UnknownSeverity)` if the bracketed level is not recognised
    pub fn classify(&self, raw: &str) -> Result<Option<LogLine>, RelayError> {
        let line = raw.trim();
        if line.is_empty() {
            return Ok(None);
        }

        let (time_token, rest) = split_token(line)
            .ok_or_else(|| RelayError::malformed("expected a level after the timestamp"))?;
        let (level_token, text) = split_token(rest)
            .ok_or_else(|| RelayError::malformed("expected text after the level"))?;

        let timestamp = parse_timestamp(time_token)?;
        let level_name = level_token
            .strip_prefix('[')
            .and_then(|t| t.strip_suffix(']'))
            .ok_or_else(|| {
                RelayError::malformed(format!("level '{}' is not bracketed", level_token))
            })?;
        let level = self.severity.parse(level_name)?;

        Ok(Some(LogLine {
            timestamp,
            level,
            text: text.to_string(),
        }))
    }
}

/// Splits off the first whitespace-delimited token. The remainder has its
/// leading whitespace removed and must be non-empty.
fn split_token(s: &str) -> Option<(&str, &str)> {
    let (head, tail) = s.split_once(char::is_whitespace)?;
    let tail = tail.trim_start();
    if tail.is_empty() {
        None
    } else {
        Some((head, tail))
    }
}

/// Parses a `YYYY-MM-DDTHH:MM:SSZ` token as a UTC instant.
pub fn parse_timestamp(token: &str) -> Result<DateTime<Utc>, RelayError> {
    NaiveDateTime::parse_from_str(token, TIMESTAMP_FORMAT)
        .map(|naive| naive.and_utc())
        .map_err(|e| RelayError::malformed(format!("bad timestamp '{}': {}", token, e)))
}

impl LogLine {
    /// Renders the line back into the log file format.
    pub fn to_raw(&self) -> String {
        format!(
            "{} [{}] {}",
            self.timestamp.format(TIMESTAMP_FORMAT),
            self.level,
            self.text
        )
    }
}
