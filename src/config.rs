use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;

/// Window title when no document is loaded.
pub const APP_TITLE: &str = "Markdown Live";

/// Base reference handed to the display so relative links resolve against the
/// filesystem root.
pub const BASE_REFERENCE: &str = "file:///";

#[derive(Parser, Debug)]
#[command(name = "md-live")]
#[command(about = "Render markdown files", long_about = None)]
pub struct Args {
    /// Markdown file to open
    #[arg(short, long)]
    pub file: Option<PathBuf>,
}

/// Startup settings.
#[derive(Debug, Clone)]
pub struct Config {
    pub file: Option<PathBuf>,
    pub title: String,
    pub window_size: (f64, f64),
    pub debounce: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            file: None,
            title: APP_TITLE.to_string(),
            window_size: (800.0, 600.0),
            debounce: Duration::from_millis(200),
        }
    }
}

impl From<Args> for Config {
    fn from(args: Args) -> Self {
        Self {
            file: args.file,
            ..Self::default()
        }
    }
}
