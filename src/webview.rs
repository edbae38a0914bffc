//! The window and embedded web view that show the page.

use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use tao::window::Window;
use tempfile::TempDir;
use url::Url;
use wry::WebView;

use crate::config::APP_TITLE;
use crate::controller::HtmlView;
use crate::error::ViewerError;

/// Commands posted by the page over the IPC channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(tag = "cmd", rename_all = "snake_case")]
pub enum IpcCommand {
    Open,
    Reload,
    Quit,
}

impl IpcCommand {
    pub fn parse(message: &str) -> Option<Self> {
        match serde_json::from_str(message) {
            Ok(cmd) => Some(cmd),
            Err(e) => {
                log::warn!("Ignoring unknown IPC message {:?}: {}", message, e);
                None
            }
        }
    }
}

/// Installed in every page: Ctrl+O open, Ctrl+R / F5 reload, Ctrl+Q quit.
pub const KEY_BINDINGS: &str = r#"
window.addEventListener('keydown', function (e) {
    var mod = e.ctrlKey || e.metaKey;
    var key = e.key.toLowerCase();
    var cmd = null;
    if (mod && key === 'o') {
        cmd = 'open';
    } else if (mod && key === 'q') {
        cmd = 'quit';
    } else if (e.key === 'F5' || (mod && key === 'r')) {
        cmd = 'reload';
    }
    if (cmd !== null) {
        e.preventDefault();
        window.ipc.postMessage(JSON.stringify({ cmd: cmd }));
    }
});
"#;

pub fn is_markdown_file(path: &Path) -> bool {
    path.extension()
        .map(|ext| {
            let ext = ext.to_string_lossy().to_lowercase();
            ext == "md" || ext == "markdown" || ext == "txt"
        })
        .unwrap_or(false)
}

/// First markdown file among dropped paths.
pub fn dropped_markdown(paths: &[PathBuf]) -> Option<&Path> {
    paths.iter().map(PathBuf::as_path).find(|p| is_markdown_file(p))
}

/// Adds a `<base>` element so relative links resolve against `base`.
pub fn with_base(html: &str, base: &str) -> String {
    let tag = format!("<base href=\"{}\">", base);
    match html.find("<head>") {
        Some(at) => {
            let at = at + "<head>".len();
            let mut out = String::with_capacity(html.len() + tag.len());
            out.push_str(&html[..at]);
            out.push_str(&tag);
            out.push_str(&html[at..]);
            out
        }
        None => format!("{tag}{html}"),
    }
}

pub fn window_title(title: &str, subtitle: Option<&str>) -> String {
    match subtitle {
        Some(sub) => format!("{title} - {sub}"),
        None => title.to_string(),
    }
}

/// Pages written to disk so the web view loads them with a `file://` origin.
///
/// An HTML string loaded directly gets an opaque origin, and such a page may not
/// fetch local images or follow local links. Every page gets a fresh file name so
/// the view never serves a cached copy. The previous page is removed.
pub struct PageFiles {
    dir: TempDir,
    written: u64,
    current: Option<PathBuf>,
}

impl PageFiles {
    pub fn new() -> Result<Self, ViewerError> {
        let dir = tempfile::Builder::new()
            .prefix("md-live-")
            .tempdir()
            .map_err(|e| ViewerError::Display(format!("create page directory: {e}")))?;
        Ok(Self {
            dir,
            written: 0,
            current: None,
        })
    }

    /// Writes `html` to a new file and returns its URL.
    pub fn write(&mut self, html: &str) -> Result<Url, ViewerError> {
        self.written += 1;
        let path = self.dir.path().join(format!("page-{}.html", self.written));
        fs::write(&path, html)
            .map_err(|e| ViewerError::Display(format!("write {}: {e}", path.display())))?;
        let url = Url::from_file_path(&path)
            .map_err(|()| ViewerError::Display(format!("no file URL for {}", path.display())))?;

        if let Some(old) = self.current.replace(path) {
            if let Err(e) = fs::remove_file(&old) {
                log::debug!("Could not remove old page {:?}: {}", old, e);
            }
        }
        Ok(url)
    }
}

/// [`HtmlView`] backed by a wry web view inside a tao window.
pub struct WebViewDisplay {
    window: Window,
    webview: WebView,
    pages: PageFiles,
}

impl WebViewDisplay {
    pub fn new(window: Window, webview: WebView) -> Result<Self, ViewerError> {
        Ok(Self {
            window,
            webview,
            pages: PageFiles::new()?,
        })
    }
}

impl HtmlView for WebViewDisplay {
    fn display(&mut self, html: &str, base_reference: &str) -> Result<(), ViewerError> {
        let url = self.pages.write(&with_base(html, base_reference))?;
        self.webview
            .load_url(url.as_str())
            .map_err(|e| ViewerError::Display(e.to_string()))
    }

    fn set_title(&mut self, title: &str, subtitle: Option<&str>) {
        let title = if title.is_empty() { APP_TITLE } else { title };
        self.window.set_title(&window_title(title, subtitle));
    }
}
