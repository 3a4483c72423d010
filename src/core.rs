//! Core domain types and service traits for the relay
//!
//! This module defines the values that flow through a dispatch cycle and the
//! contracts of the collaborators the engine depends on.

use crate::error::RelayError;
use crate::severity::Severity;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// A classified log line. Transient: lives for one dispatch cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogLine {
    /// Second-precision UTC timestamp taken from the line.
    pub timestamp: DateTime<Utc>,
    pub level: Severity,
    /// The message body, everything after the level token.
    pub text: String,
}

/// A subscriber as held by the directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subscriber {
    /// Opaque chat or channel identifier.
    pub id: String,
    /// The most verbose level this subscriber wants to receive.
    pub threshold: String,
}

impl Subscriber {
    pub fn new(id: impl Into<String>, threshold: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            threshold: threshold.into(),
        }
    }
}

// =============================================================================
// Service Traits
// =============================================================================

/// Persistent registry of who receives notifications and at what threshold.
#[async_trait]
pub trait SubscriberDirectory: Send + Sync {
    /// Snapshot of all subscribers in insertion order.
    async fn list(&self) -> Result<Vec<Subscriber>, RelayError>;

    /// Adds a subscriber. A no-op if the id is already present.
    async fn insert(&self, id: &str, threshold: &str) -> Result<(), RelayError>;

    /// Adds a subscriber or resets an existing one's threshold, as one
    /// write.
    async fn upsert(&self, id: &str, threshold: &str) -> Result<(), RelayError>;

    /// Removes a subscriber. Returns whether it was present.
    async fn remove(&self, id: &str) -> Result<bool, RelayError>;

    /// Updates a subscriber's threshold. Returns whether it was present.
    async fn set_threshold(&self, id: &str, threshold: &str) -> Result<bool, RelayError>;

    /// Whether the id is currently subscribed.
    async fn contains(&self, id: &str) -> Result<bool, RelayError> {
        Ok(self.list().await?.iter().any(|s| s.id == id))
    }
}

/// Outbound messaging channel.
#[async_trait]
pub trait Transport: Send + Sync {
    /// A short name used in logs.
    fn name(&self) -> &str;

    /// Sends `text` to a subscriber.
    ///
    /// # Returns
    /// * `Ok(())` if the message was accepted
    /// * `Err(RelayError::TransportFailure)` for any transient failure; the
    ///   caller must not treat it as fatal
    async fn send(&self, subscriber_id: &str, text: &str) -> Result<(), RelayError>;
}

/// Receiver of raw filesystem change notifications for the watched file.
///
/// The watcher backend calls this from its own delivery thread, so
/// implementations must return quickly and never block.
pub trait FileChangeListener: Send + Sync {
    fn on_file_changed(&self, path: &Path);
}
