use std::fs::{self, OpenOptions};
use std::path::{Path, PathBuf};

use tracing_subscriber::EnvFilter;

/// Install the global subscriber. With a path, append there without colour;
/// otherwise write to stderr. `RUST_LOG` overrides the `info` default.
pub fn init_logging(path: Option<&Path>) {
    let filter = EnvFilter::builder()
        .with_default_directive(tracing::Level::INFO.into())
        .from_env_lossy();

    if let Some(path) = path {
        if let Some(parent) = path.parent() {
            let _ = fs::create_dir_all(parent);
        }
        if let Ok(file) = OpenOptions::new().create(true).append(true).open(path) {
            let _ = tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_target(true)
                .with_ansi(false)
                .with_writer(file)
                .try_init();
            return;
        }
    }

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .try_init();
}

/// The console owns the terminal, so its logs always go to a file.
pub fn default_log_path() -> Option<PathBuf> {
    crate::persist::cache_dir().map(|dir| dir.join("volley_review.log"))
}
