//! The ordered set of severity levels.
//!
//! A higher rank means a more verbose level. A subscriber receives a line when
//! its threshold rank is at least the line's rank, so an `ERROR` subscriber
//! only sees errors while a `DEBUG` subscriber sees everything.

use crate::error::RelayError;
use std::collections::BTreeMap;
use std::fmt;

/// A recognised severity token, normalised to upper case.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Severity(String);

impl Severity {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Syslog-style ranks for the default level set.
pub fn default_levels() -> BTreeMap<String, u8> {
    BTreeMap::from([
        ("ERROR".to_string(), 3),
        ("INFO".to_string(), 6),
        ("DEBUG".to_string(), 7),
    ])
}

/// The severity order, fixed at startup and shared by the classifier, the
/// dispatch filter and the command surface.
#[derive(Debug, Clone)]
pub struct SeverityModel {
    /// Sorted ascending by rank.
    levels: Vec<(Severity, u8)>,
}

impl SeverityModel {
    /// Builds a model from `token -> rank` pairs.
    ///
    /// Tokens are upper-cased. Two tokens sharing a rank is rejected because
    /// the order must be strict.
    pub fn new(levels: &BTreeMap<String, u8>) -> anyhow::Result<Self> {
        if levels.is_empty() {
            anyhow::bail!("at least one severity level must be configured");
        }
        let mut sorted: Vec<(Severity, u8)> = levels
            .iter()
            .map(|(name, rank)| (Severity(name.trim().to_uppercase()), *rank))
            .collect();
        sorted.sort_by_key(|(_, rank)| *rank);
        for pair in sorted.windows(2) {
            if pair[0].1 == pair[1].1 {
                anyhow::bail!(
                    "severity levels {} and {} share rank {}",
                    pair[0].0,
                    pair[1].0,
                    pair[0].1
                );
            }
        }
        Ok(Self { levels: sorted })
    }

    /// The recognised levels with their rank, least verbose first.
    pub fn levels(&self) -> &[(Severity, u8)] {
        &self.levels
    }

    /// Resolves a raw token into a recognised level. Matching is exact.
    pub fn parse(&self, token: &str) -> Result<Severity, RelayError> {
        self.levels
            .iter()
            .find(|(level, _)| level.as_str() == token)
            .map(|(level, _)| level.clone())
            .ok_or_else(|| RelayError::UnknownSeverity(token.to_string()))
    }

    /// Case-insensitive lookup, used for user-typed commands and config.
    pub fn parse_loose(&self, token: &str) -> Result<Severity, RelayError> {
        self.parse(&token.trim().to_uppercase())
    }

    pub fn rank(&self, level: &str) -> Result<u8, RelayError> {
        self.levels
            .iter()
            .find(|(l, _)| l.as_str() == level)
            .map(|(_, rank)| *rank)
            .ok_or_else(|| RelayError::UnknownSeverity(level.to_string()))
    }

    /// Whether a subscriber at `threshold` receives a line at `line_level`.
    ///
    /// An unrecognised threshold (for example one persisted under an older
    /// level set) permits nothing.
    pub fn permits(&self, threshold: &str, line_level: &Severity) -> bool {
        match (self.rank(threshold), self.rank(line_level.as_str())) {
            (Ok(threshold), Ok(line)) => threshold >= line,
            _ => false,
        }
    }
}

impl Default for SeverityModel {
    fn default() -> Self {
        let mut levels: Vec<(Severity, u8)> = default_levels()
            .into_iter()
            .map(|(name, rank)| (Severity(name), rank))
            .collect();
        levels.sort_by_key(|(_, rank)| *rank);
        Self { levels }
    }
}
