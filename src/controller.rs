//! Keeps the displayed page in sync with one markdown file on disk.

use std::fs;
use std::path::{Path, PathBuf};

use crate::config::{APP_TITLE, BASE_REFERENCE};
use crate::error::ViewerError;
use crate::markdown::Render;
use crate::template;
use crate::watcher::{WatchEvent, WatchHandle, WatchId, WatchService};

/// Shows a finished HTML page.
pub trait HtmlView {
    fn display(&mut self, html: &str, base_reference: &str) -> Result<(), ViewerError>;
    fn set_title(&mut self, title: &str, subtitle: Option<&str>);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViewState {
    /// No document, blank page shown.
    Empty,
    /// Document shown and (unless arming failed) watched.
    Loaded,
    /// Shut down; no further loads or callbacks.
    Disposed,
}

/// The file being shown and the text last read from it.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Document {
    pub path: Option<PathBuf>,
    pub raw_text: String,
}

/// Owns the current [`Document`] and its watch, and composes read, render and
/// display into one open/refresh operation.
pub struct DocumentViewController<R, V, W> {
    renderer: R,
    view: V,
    watcher: W,
    document: Document,
    watch: Option<Box<dyn WatchHandle>>,
    state: ViewState,
    // oldest watch whose events still belong to the current document
    accept_from: Option<WatchId>,
    // path whose watch failure was already reported
    watch_failure_reported: Option<PathBuf>,
}

impl<R: Render, V: HtmlView, W: WatchService> DocumentViewController<R, V, W> {
    pub fn new(renderer: R, view: V, watcher: W) -> Self {
        Self {
            renderer,
            view,
            watcher,
            document: Document::default(),
            watch: None,
            state: ViewState::Empty,
            accept_from: None,
            watch_failure_reported: None,
        }
    }

    pub fn state(&self) -> ViewState {
        self.state
    }

    pub fn document(&self) -> &Document {
        &self.document
    }

    pub fn path(&self) -> Option<&Path> {
        self.document.path.as_deref()
    }

    /// Id of the armed watch, if any.
    pub fn watch_id(&self) -> Option<WatchId> {
        self.watch
            .as_ref()
            .filter(|w| w.is_active())
            .map(|w| w.id())
    }

    /// Loads `path` (or nothing) and shows it.
    ///
    /// A missing path shows a blank document. Read and render failures are shown
    /// inline and also returned so the caller can log them; they never leave the
    /// controller in a broken state.
    pub fn open(&mut self, path: Option<&Path>) -> Result<(), ViewerError> {
        if self.state == ViewState::Disposed {
            log::debug!("Ignoring open after dispose");
            return Ok(());
        }

        self.cancel_watch();

        let Some(path) = path.filter(|p| !p.as_os_str().is_empty()) else {
            self.show_empty();
            return self.refresh_and_display();
        };

        if !path.exists() {
            log::info!("{}", ViewerError::PathNotFound(path.to_path_buf()));
            self.show_empty();
            return self.refresh_and_display();
        }

        let path = path.canonicalize().unwrap_or_else(|_| path.to_path_buf());
        if self.document.path.as_deref() != Some(path.as_path()) {
            self.accept_from = None;
        }
        // armed before the read so a save landing in between still notifies
        self.arm_watch(&path);
        let read = fs::read_to_string(&path);

        self.set_title_for(&path);
        self.document.path = Some(path.clone());
        self.state = ViewState::Loaded;

        match read {
            Ok(text) => {
                log::info!("Loaded file: {:?} ({} bytes)", path, text.len());
                self.document.raw_text = text;
                self.refresh_and_display()
            }
            Err(source) => {
                // the file existed a moment ago; show why it can't be read
                self.document.raw_text.clear();
                let err = ViewerError::ReadFailure { path, source };
                log::error!("{}", err);
                self.view.display(&template::error_page(&err), BASE_REFERENCE)?;
                Err(err)
            }
        }
    }

    /// Renders the current text into the full page.
    pub fn refresh(&self) -> Result<String, ViewerError> {
        let body = self.renderer.render(&self.document.raw_text)?;
        Ok(template::page(&body))
    }

    /// Reloads the current file after an external modification.
    ///
    /// Every event for the current document reloads, including events queued
    /// before an earlier reload re-armed the watch. Events from watches of a
    /// document that has since been replaced are dropped.
    pub fn on_external_change(&mut self, event: &WatchEvent) -> Result<(), ViewerError> {
        if self.state != ViewState::Loaded {
            log::debug!("Ignoring change event in state {:?}", self.state);
            return Ok(());
        }
        let current = self.document.path.as_deref() == Some(event.path.as_path())
            && self.accept_from.is_some_and(|first| event.id >= first);
        if !current {
            log::debug!("Ignoring stale change event for {:?}", event.path);
            return Ok(());
        }

        let path = self.document.path.clone();
        log::info!("Reloading file: {:?}", path);
        self.open(path.as_deref())
    }

    /// Re-reads the current file on user request.
    pub fn reload(&mut self) -> Result<(), ViewerError> {
        let path = self.document.path.clone();
        self.open(path.as_deref())
    }

    /// Cancels the watch. Nothing is loaded or displayed afterwards.
    pub fn dispose(&mut self) {
        if self.state == ViewState::Disposed {
            return;
        }
        self.cancel_watch();
        self.state = ViewState::Disposed;
        log::debug!("Document view disposed");
    }

    fn show_empty(&mut self) {
        self.document = Document::default();
        self.accept_from = None;
        self.state = ViewState::Empty;
        self.view.set_title(APP_TITLE, None);
    }

    fn refresh_and_display(&mut self) -> Result<(), ViewerError> {
        match self.refresh() {
            Ok(html) => self.view.display(&html, BASE_REFERENCE),
            Err(err) => {
                log::error!("{}", err);
                let page = template::raw_text_page(&err, &self.document.raw_text);
                self.view.display(&page, BASE_REFERENCE)?;
                Err(err)
            }
        }
    }

    fn set_title_for(&mut self, path: &Path) {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| path.display().to_string());
        self.view.set_title(&name, Some(&path.display().to_string()));
    }

    fn arm_watch(&mut self, path: &Path) {
        match self.watcher.watch(path) {
            Ok(handle) => {
                self.accept_from.get_or_insert(handle.id());
                self.watch = Some(handle);
                self.watch_failure_reported = None;
            }
            Err(err) => {
                // degrade to no auto-refresh, warn once per path
                if self.watch_failure_reported.as_deref() != Some(path) {
                    log::warn!("{}; live reload disabled", err);
                    self.watch_failure_reported = Some(path.to_path_buf());
                }
            }
        }
    }

    fn cancel_watch(&mut self) {
        if let Some(mut handle) = self.watch.take() {
            handle.cancel();
        }
    }
}

impl<R, V, W> Drop for DocumentViewController<R, V, W> {
    fn drop(&mut self) {
        if let Some(mut handle) = self.watch.take() {
            handle.cancel();
        }
    }
}
