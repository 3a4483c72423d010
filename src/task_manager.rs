//! Manages the lifecycle of all spawned tasks in the application.
use crate::error::RelayError;
use futures::future::join_all;
use std::sync::{Arc, Mutex};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// A centralized manager for all spawned tasks.
///
/// This struct is responsible for:
/// - Spawning tasks and keeping track of their `JoinHandle`s.
/// - Turning a fatal task error into an application-wide shutdown.
/// - Awaiting all tasks during graceful shutdown.
#[derive(Clone, Debug)]
pub struct TaskManager {
    handles: Arc<Mutex<Vec<(&'static str, JoinHandle<()>)>>>,
    shutdown_tx: Arc<watch::Sender<bool>>,
    failure: Arc<Mutex<Option<String>>>,
}

impl TaskManager {
    pub fn new(shutdown_tx: Arc<watch::Sender<bool>>) -> Self {
        Self {
            handles: Arc::new(Mutex::new(Vec::new())),
            shutdown_tx,
            failure: Arc::new(Mutex::new(None)),
        }
    }

    /// Spawns a task and adds its handle to the manager.
    pub fn spawn<F>(&self, name: &'static str, future: F)
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        debug!(task_name = name, "Spawning task");
        let handle = tokio::spawn(future);
        self.lock_handles().push((name, handle));
    }

    /// Spawns a task whose fatal errors take the application down: the error
    /// is recorded and every task is asked to shut down.
    pub fn spawn_critical<F>(&self, name: &'static str, future: F)
    where
        F: std::future::Future<Output = Result<(), RelayError>> + Send + 'static,
    {
        let manager = self.clone();
        self.spawn(name, async move {
            match future.await {
                Ok(()) => {}
                Err(e) if e.is_fatal() => {
                    error!(task_name = name, error = %e, "Critical task failed; shutting down");
                    manager.record_failure(format!("{name}: {e}"));
                    manager.trigger_shutdown();
                }
                Err(e) => warn!(task_name = name, error = %e, "Task stopped with an error"),
            }
        });
    }

    /// Returns a new receiver for the shutdown broadcast.
    pub fn get_shutdown_rx(&self) -> watch::Receiver<bool> {
        self.shutdown_tx.subscribe()
    }

    /// Broadcasts shutdown to every task.
    pub fn trigger_shutdown(&self) {
        self.shutdown_tx.send_replace(true);
    }

    /// The first fatal failure, if any task reported one.
    pub fn failure(&self) -> Option<String> {
        self.failure.lock().unwrap_or_else(|p| p.into_inner()).clone()
    }

    fn record_failure(&self, message: String) {
        let mut failure = self.failure.lock().unwrap_or_else(|p| p.into_inner());
        if failure.is_none() {
            *failure = Some(message);
        }
    }

    fn lock_handles(&self) -> std::sync::MutexGuard<'_, Vec<(&'static str, JoinHandle<()>)>> {
        self.handles.lock().unwrap_or_else(|p| p.into_inner())
    }

    /// Waits for all managed tasks to complete.
    pub async fn shutdown(self) {
        let handles = self.lock_handles().drain(..).collect::<Vec<_>>();
        info!(
            "TaskManager shutting down. Waiting for {} tasks to complete...",
            handles.len()
        );

        let task_names: Vec<&'static str> = handles.iter().map(|(name, _)| *name).collect();
        debug!(tasks = ?task_names, "Awaiting all tasks.");

        let results = join_all(handles.into_iter().map(|(_, handle)| handle)).await;

        let mut panicked = Vec::new();
        for (task_name, result) in task_names.iter().zip(results) {
            match result {
                Ok(()) => debug!(task_name, "Task shut down gracefully."),
                Err(e) => {
                    error!(task_name, error = %e, "Task panicked during shutdown.");
                    panicked.push(*task_name);
                }
            }
        }

        if panicked.is_empty() {
            info!("All tasks shut down gracefully.");
        } else {
            error!(tasks = ?panicked, "{} tasks panicked during shutdown", panicked.len());
        }
    }
}
