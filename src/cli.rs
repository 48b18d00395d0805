use clap::Parser;
use std::path::PathBuf;

use crate::files::DEFAULT_EXTENSIONS;
use crate::viewer::ViewerConfig;

pub const HELP_KEYS: &str = "\
Key Bindings:
  Esc / q       : Quit
  Left / h      : Previous photo (wraps)
  Right / l     : Next photo (wraps)
  Space         : Next photo
  Home / End    : First / last photo
  p             : Toggle write protection (photo and its sidecars)
  r             : Retry a photo that failed to decode
  i             : Toggle info line
";

#[derive(Parser)]
#[command(name = "photoview", about = "Browse the photos of a directory", after_help = HELP_KEYS)]
pub struct Cli {
    /// Directory to browse, or a photo to start at
    pub path: PathBuf,

    /// Number of slots to keep warm ahead of the current photo
    #[arg(short, long, default_value = "10")]
    pub window: usize,

    /// Decode worker threads. Default: available cores, clamped to 4..=16.
    #[arg(short = 'j', long)]
    pub threads: Option<usize>,

    /// Accepted extensions, matched case-insensitively (repeatable)
    #[arg(short, long = "ext", value_name = "EXT")]
    pub extensions: Vec<String>,

    /// Total decode attempts allowed per photo, including retries
    #[arg(long, default_value = "3")]
    pub max_attempts: u32,

    /// Log per-navigation timings at trace level instead of debug
    #[arg(long)]
    pub quiet_timings: bool,
}

impl Cli {
    pub fn to_config(&self) -> ViewerConfig {
        let extensions = if self.extensions.is_empty() {
            DEFAULT_EXTENSIONS.iter().map(|s| s.to_string()).collect()
        } else {
            self.extensions
                .iter()
                .map(|e| e.trim_start_matches('.').to_string())
                .collect()
        };
        ViewerConfig {
            extensions,
            prefetch_window: self.window,
            workers: self.threads.unwrap_or_else(default_workers),
            max_attempts: self.max_attempts,
            quiet_timings: self.quiet_timings,
        }
    }
}

pub fn default_workers() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4)
        .clamp(4, 16)
}
