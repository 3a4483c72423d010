use async_trait::async_trait;
use logrelay::{RelayError, Subscriber, SubscriberDirectory};
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc, Mutex,
};

/// An in-memory subscriber directory that can be told to fail.
#[derive(Clone, Debug, Default)]
pub struct MemoryDirectory {
    subscribers: Arc<Mutex<Vec<Subscriber>>>,
    fail: Arc<AtomicBool>,
}

impl MemoryDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(subscribers: &[(&str, &str)]) -> Self {
        let directory = Self::new();
        directory.subscribers.lock().unwrap().extend(
            subscribers
                .iter()
                .map(|(id, threshold)| Subscriber::new(*id, *threshold)),
        );
        directory
    }

    /// Makes every subsequent call return a store error.
    pub fn set_fail(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    pub fn snapshot(&self) -> Vec<Subscriber> {
        self.subscribers.lock().unwrap().clone()
    }

    fn check(&self) -> Result<(), RelayError> {
        if self.fail.load(Ordering::SeqCst) {
            Err(RelayError::Store("directory unavailable".to_string()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl SubscriberDirectory for MemoryDirectory {
    async fn list(&self) -> Result<Vec<Subscriber>, RelayError> {
        self.check()?;
        Ok(self.snapshot())
    }

    async fn insert(&self, id: &str, threshold: &str) -> Result<(), RelayError> {
        self.check()?;
        let mut subscribers = self.subscribers.lock().unwrap();
        if !subscribers.iter().any(|s| s.id == id) {
            subscribers.push(Subscriber::new(id, threshold));
        }
        Ok(())
    }

    async fn upsert(&self, id: &str, threshold: &str) -> Result<(), RelayError> {
        self.check()?;
        let mut subscribers = self.subscribers.lock().unwrap();
        match subscribers.iter_mut().find(|s| s.id == id) {
            Some(subscriber) => subscriber.threshold = threshold.to_string(),
            None => subscribers.push(Subscriber::new(id, threshold)),
        }
        Ok(())
    }

    async fn remove(&self, id: &str) -> Result<bool, RelayError> {
        self.check()?;
        let mut subscribers = self.subscribers.lock().unwrap();
        let before = subscribers.len();
        subscribers.retain(|s| s.id != id);
        Ok(subscribers.len() != before)
    }

    async fn set_threshold(&self, id: &str, threshold: &str) -> Result<bool, RelayError> {
        self.check()?;
        let mut subscribers = self.subscribers.lock().unwrap();
        match subscribers.iter_mut().find(|s| s.id == id) {
            Some(subscriber) => {
                subscriber.threshold = threshold.to_string();
                Ok(true)
            }
            None => Ok(false),
        }
    }
}
