//! Markdown file previewer with live reload.
//!
//! [`DocumentViewController`] reads a markdown file, renders it with
//! [`MarkdownRenderer`], places the result in the page [`template`] and hands it
//! to an [`HtmlView`]. A [`WatchService`] reports external modifications, each
//! of which triggers a full reload.

pub mod config;
pub mod controller;
pub mod error;
pub mod markdown;
pub mod template;
pub mod watcher;
pub mod webview;

pub use config::{Args, Config, APP_TITLE, BASE_REFERENCE};
pub use controller::{Document, DocumentViewController, HtmlView, ViewState};
pub use error::ViewerError;
pub use markdown::{Extension, MarkdownRenderer, Render, EXTENSIONS};
pub use watcher::{NotifyWatchService, WatchEvent, WatchHandle, WatchId, WatchService};
pub use webview::{IpcCommand, WebViewDisplay};
