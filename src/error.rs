use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Everything that can go wrong while showing a document.
///
/// All variants are recovered inside the controller; none of them ends the process.
#[derive(Debug, Error)]
pub enum ViewerError {
    #[error("File not found: {}", .0.display())]
    PathNotFound(PathBuf),

    #[error("Failed to read {}: {source}", path.display())]
    ReadFailure {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Failed to render markdown: {0}")]
    RenderFailure(String),

    #[error("Failed to watch {}: {source}", path.display())]
    WatchFailure {
        path: PathBuf,
        #[source]
        source: notify::Error,
    },

    #[error("Failed to display document: {0}")]
    Display(String),
}

impl ViewerError {
    /// Short label shown above the detail in the inline error notice.
    pub fn title(&self) -> &'static str {
        match self {
            ViewerError::PathNotFound(_) => "File not found",
            ViewerError::ReadFailure { source, .. } => match source.kind() {
                io::ErrorKind::PermissionDenied => "Permission denied",
                io::ErrorKind::NotFound => "File disappeared",
                io::ErrorKind::InvalidData => "Not valid UTF-8",
                _ => "Failed to load file",
            },
            ViewerError::RenderFailure(_) => "Markdown could not be rendered",
            ViewerError::WatchFailure { .. } => "Live reload unavailable",
            ViewerError::Display(_) => "Display error",
        }
    }
}
