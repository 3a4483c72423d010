//! JSON-file-backed subscriber directory.
//!
//! Subscribers are held in memory in insertion order and the full set is
//! written after every mutation. Writes go to a sibling temp file which is
//! then renamed over the store, so a crash mid-write leaves the previous
//! state intact.

use crate::core::{Subscriber, SubscriberDirectory};
use crate::error::RelayError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;
use tracing::{debug, info};

/// Bumped when the on-disk layout changes incompatibly.
pub const STORE_VERSION: u32 = 1;

#[derive(Debug, Serialize, Deserialize)]
struct StoreFile {
    version: u32,
    #[serde(default)]
    subscribers: Vec<Subscriber>,
}

pub struct JsonSubscriberStore {
    path: PathBuf,
    subscribers: Mutex<Vec<Subscriber>>,
}

impl JsonSubscriberStore {
    /// Opens the store at `path`, starting empty if the file does not exist.
    ///
    /// A file that exists but cannot be parsed is an error rather than being
    /// silently replaced, so subscriptions are never lost by accident.
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self, RelayError> {
        let path = path.into();
        let subscribers = match tokio::fs::read_to_string(&path).await {
            Ok(content) => {
                let file: StoreFile = serde_json::from_str(&content).map_err(|e| {
                    RelayError::Store(format!("{} is malformed: {}", path.display(), e))
                })?;
                if file.version != STORE_VERSION {
                    return Err(RelayError::Store(format!(
                        "{} has version {}, expected {}",
                        path.display(),
                        file.version,
                        STORE_VERSION
                    )));
                }
                file.subscribers
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Vec::new(),
            Err(e) => {
                return Err(RelayError::Store(format!(
                    "cannot read {}: {}",
                    path.display(),
                    e
                )))
            }
        };
        info!(path = %path.display(), count = subscribers.len(), "Loaded subscribers");
        Ok(Self {
            path,
            subscribers: Mutex::new(subscribers),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Persists `next` and only then makes it the in-memory state, so a
    /// failed write leaves both memory and disk at the previous state.
    async fn commit(
        &self,
        current: &mut Vec<Subscriber>,
        next: Vec<Subscriber>,
    ) -> Result<(), RelayError> {
        self.persist(&next).await?;
        *current = next;
        Ok(())
    }

    async fn persist(&self, subscribers: &[Subscriber]) -> Result<(), RelayError> {
        let file = StoreFile {
            version: STORE_VERSION,
            subscribers: subscribers.to_vec(),
        };
        let json = serde_json::to_string_pretty(&file)
            .map_err(|e| RelayError::Store(format!("failed to serialise subscribers: {}", e)))?;

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await.map_err(|e| {
                RelayError::Store(format!("cannot create {}: {}", parent.display(), e))
            })?;
        }

        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, json.as_bytes()).await.map_err(|e| {
            RelayError::Store(format!("cannot write {}: {}", tmp.display(), e))
        })?;
        if let Err(e) = tokio::fs::rename(&tmp, &self.path).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(RelayError::Store(format!(
                "cannot replace {}: {}",
                self.path.display(),
                e
            )));
        }
        debug!(path = %self.path.display(), count = subscribers.len(), "Subscribers saved");
        Ok(())
    }
}

#[async_trait]
impl SubscriberDirectory for JsonSubscriberStore {
    async fn list(&self) -> Result<Vec<Subscriber>, RelayError> {
        Ok(self.subscribers.lock().await.clone())
    }

    async fn insert(&self, id: &str, threshold: &str) -> Result<(), RelayError> {
        let mut subscribers = self.subscribers.lock().await;
        if subscribers.iter().any(|s| s.id == id) {
            return Ok(());
        }
        let mut next = subscribers.clone();
        next.push(Subscriber::new(id, threshold));
        self.commit(&mut subscribers, next).await
    }

    async fn upsert(&self, id: &str, threshold: &str) -> Result<(), RelayError> {
        let mut subscribers = self.subscribers.lock().await;
        let mut next = subscribers.clone();
        match next.iter_mut().find(|s| s.id == id) {
            Some(subscriber) => subscriber.threshold = threshold.to_string(),
            None => next.push(Subscriber::new(id, threshold)),
        }
        self.commit(&mut subscribers, next).await
    }

    async fn remove(&self, id: &str) -> Result<bool, RelayError> {
        let mut subscribers = self.subscribers.lock().await;
        if !subscribers.iter().any(|s| s.id == id) {
            return Ok(false);
        }
        let next = subscribers.iter().filter(|s| s.id != id).cloned().collect();
        self.commit(&mut subscribers, next).await?;
        Ok(true)
    }

    async fn set_threshold(&self, id: &str, threshold: &str) -> Result<bool, RelayError> {
        let mut subscribers = self.subscribers.lock().await;
        let Some(index) = subscribers.iter().position(|s| s.id == id) else {
            return Ok(false);
        };
        let mut next = subscribers.clone();
        next[index].threshold = threshold.to_string();
        self.commit(&mut subscribers, next).await?;
        Ok(true)
    }

    async fn contains(&self, id: &str) -> Result<bool, RelayError> {
        Ok(self.subscribers.lock().await.iter().any(|s| s.id == id))
    }
}
