//! File change notifications.
//!
//! A [`WatchService`] arms one [`WatchHandle`] per path. Handles are tagged with a
//! [`WatchId`] so a consumer can tell events of the current watch from events of a
//! watch it already replaced.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use notify::{RecommendedWatcher, RecursiveMode, Watcher};
use notify_debouncer_mini::{new_debouncer, DebounceEventResult, DebouncedEventKind, Debouncer};

use crate::error::ViewerError;

/// Generation number of an armed watch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WatchId(u64);

impl WatchId {
    pub fn new(raw: u64) -> Self {
        Self(raw)
    }
}

/// The watched file was modified externally.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchEvent {
    pub id: WatchId,
    pub path: PathBuf,
}

/// An armed watch. Dropping it cancels it.
pub trait WatchHandle {
    fn id(&self) -> WatchId;
    /// Stops delivery. Calling it again is a no-op.
    fn cancel(&mut self);
    fn is_active(&self) -> bool;
}

pub trait WatchService {
    fn watch(&mut self, path: &Path) -> Result<Box<dyn WatchHandle>, ViewerError>;
}

/// Where change notifications are delivered. Called from the watcher thread.
pub type EventSink = Arc<Mutex<dyn FnMut(WatchEvent) + Send>>;

/// [`WatchService`] backed by the platform watcher.
///
/// Raw OS events are debounced: everything reported for the path inside one
/// debounce window arrives as a single [`WatchEvent`], so saves closer together
/// than the window are merged. Continuous-write notifications are not forwarded.
pub struct NotifyWatchService {
    sink: EventSink,
    debounce: Duration,
    next_id: u64,
}

impl NotifyWatchService {
    pub fn new(debounce: Duration, sink: impl FnMut(WatchEvent) + Send + 'static) -> Self {
        Self {
            sink: Arc::new(Mutex::new(sink)),
            debounce,
            next_id: 0,
        }
    }

    /// Service whose events are collected on a channel.
    pub fn with_channel(debounce: Duration) -> (Self, Receiver<WatchEvent>) {
        let (tx, rx) = mpsc::channel();
        let service = Self::new(debounce, move |event| {
            // Receiver gone means nobody is listening anymore.
            let _ = tx.send(event);
        });
        (service, rx)
    }
}

impl WatchService for NotifyWatchService {
    fn watch(&mut self, path: &Path) -> Result<Box<dyn WatchHandle>, ViewerError> {
        self.next_id += 1;
        let id = WatchId(self.next_id);
        let active = Arc::new(AtomicBool::new(true));
        let error_reported = AtomicBool::new(false);

        let handler = {
            let active = Arc::clone(&active);
            let sink = Arc::clone(&self.sink);
            let path = path.to_path_buf();
            move |result: DebounceEventResult| {
                if !active.load(Ordering::Acquire) {
                    return;
                }
                match result {
                    Ok(events) => {
                        // AnyContinuous only marks a write still in progress
                        if !events.iter().any(|e| e.kind == DebouncedEventKind::Any) {
                            return;
                        }
                        log::debug!("File change detected: {:?}", path);
                        if let Ok(mut deliver) = sink.lock() {
                            (&mut *deliver)(WatchEvent {
                                id,
                                path: path.clone(),
                            });
                        }
                    }
                    Err(e) => {
                        if !error_reported.swap(true, Ordering::Relaxed) {
                            log::error!("File watcher error for {:?}: {}", path, e);
                        }
                    }
                }
            }
        };

        let watch_failure = |source| ViewerError::WatchFailure {
            path: path.to_path_buf(),
            source,
        };

        let mut debouncer = new_debouncer(self.debounce, handler).map_err(watch_failure)?;
        debouncer
            .watcher()
            .watch(path, RecursiveMode::NonRecursive)
            .map_err(watch_failure)?;

        log::info!("Started watching file: {:?}", path);
        Ok(Box::new(NotifyWatch {
            id,
            path: path.to_path_buf(),
            active,
            debouncer: Some(debouncer),
        }))
    }
}

struct NotifyWatch {
    id: WatchId,
    path: PathBuf,
    active: Arc<AtomicBool>,
    debouncer: Option<Debouncer<RecommendedWatcher>>,
}

impl WatchHandle for NotifyWatch {
    fn id(&self) -> WatchId {
        self.id
    }

    fn cancel(&mut self) {
        self.active.store(false, Ordering::Release);
        if self.debouncer.take().is_some() {
            log::info!("Stopped watching file: {:?}", self.path);
        }
    }

    fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }
}

impl Drop for NotifyWatch {
    fn drop(&mut self) {
        self.cancel();
    }
}
