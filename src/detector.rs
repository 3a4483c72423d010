//! Change detection for the watched log file.
//!
//! The containing directory is watched non-recursively with `notify`. Raw
//! events are narrowed to the exact file name on the watcher's own thread and
//! forwarded over an unbounded channel, so the notification delivery path
//! never blocks. A task then debounces them into the shared `ChangeSignal`.

use crate::core::FileChangeListener;
use crate::error::RelayError;
use crate::signal::ChangeSignal;
use notify::{event::EventKind, Config, Event, RecommendedWatcher, RecursiveMode, Watcher};
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::time::{sleep_until, Instant};
use tracing::{debug, error, info, trace};

/// Messages from the watcher thread to the debounce task.
#[derive(Debug)]
enum Notification {
    Changed,
    Failed(String),
}

/// Forwards change notifications for one file name, dropping the rest.
struct FileNameFilter {
    file_name: OsString,
    tx: mpsc::UnboundedSender<Notification>,
}

impl FileChangeListener for FileNameFilter {
    fn on_file_changed(&self, path: &Path) {
        if path.file_name() == Some(self.file_name.as_os_str()) {
            trace!(path = %path.display(), "Log file change observed");
            // The receiver is gone only during shutdown.
            let _ = self.tx.send(Notification::Changed);
        }
    }
}

/// Whether a filesystem event can mean new content in the file.
fn is_content_change(kind: &EventKind) -> bool {
    matches!(kind, EventKind::Modify(_) | EventKind::Create(_))
}

/// Watches `log_dir` for modifications of `file_name`.
pub struct ChangeDetector {
    log_dir: PathBuf,
    file_name: OsString,
    debounce: Duration,
    signal: ChangeSignal,
}

impl ChangeDetector {
    pub fn new(
        log_dir: impl Into<PathBuf>,
        file_name: impl Into<OsString>,
        debounce: Duration,
        signal: ChangeSignal,
    ) -> Self {
        Self {
            log_dir: log_dir.into(),
            file_name: file_name.into(),
            debounce,
            signal,
        }
    }

    /// Registers the directory watch.
    ///
    /// # Returns
    /// * `Ok(RunningDetector)` once events are being delivered
    /// * `Err(WatcherFailure)` if the directory cannot be watched
    pub fn start(self) -> Result<RunningDetector, RelayError> {
        let (tx, rx) = mpsc::unbounded_channel();
        let listener: Arc<dyn FileChangeListener> = Arc::new(FileNameFilter {
            file_name: self.file_name.clone(),
            tx: tx.clone(),
        });

        let mut watcher = RecommendedWatcher::new(
            move |res: Result<Event, notify::Error>| match res {
                Ok(event) => {
                    if is_content_change(&event.kind) {
                        for path in &event.paths {
                            listener.on_file_changed(path);
                        }
                    }
                }
                Err(e) => {
                    let _ = tx.send(Notification::Failed(e.to_string()));
                }
            },
            Config::default(),
        )?;
        watcher.watch(&self.log_dir, RecursiveMode::NonRecursive)?;
        info!(
            dir = %self.log_dir.display(),
            file = ?self.file_name,
            debounce_ms = self.debounce.as_millis() as u64,
            "Watching for log file changes"
        );

        Ok(RunningDetector {
            _watcher: watcher,
            rx,
            debouncer: Debouncer::new(self.debounce, self.signal),
        })
    }
}

/// A registered watch plus its debounce state.
pub struct RunningDetector {
    // Dropping the watcher stops event delivery.
    _watcher: RecommendedWatcher,
    rx: mpsc::UnboundedReceiver<Notification>,
    debouncer: Debouncer,
}

impl RunningDetector {
    /// Debounces change notifications into the signal until shutdown.
    ///
    /// Returns `Err(WatcherFailure)` if the watcher reports an error; no
    /// further signals can arrive after that.
    pub async fn run(mut self, mut shutdown_rx: watch::Receiver<bool>) -> Result<(), RelayError> {
        loop {
            let deadline = self.debouncer.trailing_deadline();
            let trailing = async move {
                match deadline {
                    Some(at) => sleep_until(at).await,
                    None => std::future::pending::<()>().await,
                }
            };

            tokio::select! {
                biased;
                _ = shutdown_rx.changed() => {
                    info!("Change detector received shutdown signal.");
                    break;
                }
                notification = self.rx.recv() => match notification {
                    Some(Notification::Changed) => {
                        let outcome = self.debouncer.on_change(Instant::now());
                        debug!(?outcome, "Log file change");
                        metrics::counter!("change_events_total", "outcome" => outcome.label()).increment(1);
                    }
                    Some(Notification::Failed(reason)) => {
                        error!(%reason, "File watcher reported an error");
                        return Err(RelayError::WatcherFailure(reason));
                    }
                    None => {
                        return Err(RelayError::WatcherFailure("event channel closed".to_string()));
                    }
                },
                _ = trailing => {
                    if self.debouncer.on_deadline(Instant::now()) {
                        debug!("Raised deferred change signal");
                    }
                }
            }
        }
        Ok(())
    }
}

/// What happened to a change notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DebounceOutcome {
    /// The signal was raised.
    Signaled,
    /// Within the quiet window and the signal is still pending, so the next
    /// cycle will cover this change.
    Coalesced,
    /// Within the quiet window but the previous signal was already consumed;
    /// the signal is raised again when the window ends.
    Deferred,
}

impl DebounceOutcome {
    fn label(&self) -> &'static str {
        match self {
            Self::Signaled => "signaled",
            Self::Coalesced => "coalesced",
            Self::Deferred => "deferred",
        }
    }
}

/// Leading-edge debounce over a `ChangeSignal`.
#[derive(Debug)]
pub struct Debouncer {
    window: Duration,
    signal: ChangeSignal,
    quiet_until: Option<Instant>,
    deferred: bool,
}

impl Debouncer {
    pub fn new(window: Duration, signal: ChangeSignal) -> Self {
        Self {
            window,
            signal,
            quiet_until: None,
            deferred: false,
        }
    }

    pub fn on_change(&mut self, now: Instant) -> DebounceOutcome {
        match self.quiet_until {
            Some(until) if now < until => {
                if self.signal.is_set() {
                    DebounceOutcome::Coalesced
                } else {
                    self.deferred = true;
                    DebounceOutcome::Deferred
                }
            }
            _ => {
                self.raise(now);
                DebounceOutcome::Signaled
            }
        }
    }

    /// When a deferred change must be signaled, if any.
    pub fn trailing_deadline(&self) -> Option<Instant> {
        if self.deferred {
            self.quiet_until
        } else {
            None
        }
    }

    /// Raises a deferred signal once the window has elapsed.
    pub fn on_deadline(&mut self, now: Instant) -> bool {
        let elapsed = self.quiet_until.map_or(true, |until| now >= until);
        if self.deferred && elapsed {
            self.raise(now);
            true
        } else {
            false
        }
    }

    fn raise(&mut self, now: Instant) {
        self.signal.set();
        self.quiet_until = Some(now + self.window);
        self.deferred = false;
    }
}
