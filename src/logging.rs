// ABOUTME: Process-wide tracing setup
// ABOUTME: Console output plus JSON log files for all records and for errors only

use anyhow::{Context, Result};
use std::fs::{self, File, OpenOptions};
use std::path::Path;
use std::sync::Mutex;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter, Layer};

pub const COMBINED_LOG: &str = "combined.log";
pub const ERROR_LOG: &str = "error.log";

/// Default to INFO level if RUST_LOG is not set
fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
}

/// Open (appending) the combined and error-only log files under `dir`
pub fn open_log_files(dir: &Path) -> Result<(File, File)> {
    fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create log directory {}", dir.display()))?;
    let open = |name: &str| {
        let path = dir.join(name);
        OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .with_context(|| format!("Failed to open log file {}", path.display()))
    };
    Ok((open(COMBINED_LOG)?, open(ERROR_LOG)?))
}

/// Install the global subscriber
///
/// When the log files cannot be opened only console output is installed and
/// a warning says why.
pub fn init(log_dir: &Path) {
    let console = fmt::layer().with_filter(env_filter());

    let (combined, errors, failure) = match open_log_files(log_dir) {
        Ok((combined, errors)) => (
            Some(
                fmt::layer()
                    .json()
                    .with_ansi(false)
                    .with_writer(Mutex::new(combined))
                    .with_filter(env_filter()),
            ),
            Some(
                fmt::layer()
                    .json()
                    .with_ansi(false)
                    .with_writer(Mutex::new(errors))
                    .with_filter(LevelFilter::ERROR),
            ),
            None,
        ),
        Err(e) => (None, None, Some(e)),
    };

    tracing_subscriber::registry()
        .with(console)
        .with(combined)
        .with(errors)
        .init();

    if let Some(e) = failure {
        tracing::warn!(error = %format!("{:#}", e), "File logging disabled");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::tempdir;

    #[test]
    fn creates_directory_and_appends() {
        let dir = tempdir().unwrap();
        let log_dir = dir.path().join("logs");
        let (mut combined, _) = open_log_files(&log_dir).unwrap();
        writeln!(combined, "first").unwrap();
        drop(combined);

        let (mut combined, _) = open_log_files(&log_dir).unwrap();
        writeln!(combined, "second").unwrap();
        drop(combined);

        let content = fs::read_to_string(log_dir.join(COMBINED_LOG)).unwrap();
        assert_eq!(content, "first\nsecond\n");
        assert!(log_dir.join(ERROR_LOG).exists());
    }

    #[test]
    fn unusable_directory_is_an_error() {
        let dir = tempdir().unwrap();
        let blocker = dir.path().join("not-a-dir");
        fs::write(&blocker, "").unwrap();
        assert!(open_log_files(&blocker).is_err());
    }
}
