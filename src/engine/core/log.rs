use anyhow::{Context, Result};
use chrono::Local;
use std::fs::{self, OpenOptions};
use std::path::PathBuf;
use std::sync::Mutex;
use tracing::Level;

/// Directory holding the daily log files
pub fn log_dir() -> Result<PathBuf> {
    let base = dirs::data_local_dir().context("Could not determine local data directory")?;
    Ok(base.join("screenrec").join("logs"))
}

/// Today's log file, `screenrec_YYYYMMDD.log`
pub fn log_file_path() -> Result<PathBuf> {
    let name = format!("screenrec_{}.log", Local::now().format("%Y%m%d"));
    Ok(log_dir()?.join(name))
}

/// Install the global tracing subscriber.
///
/// Logs go to today's file unless `to_stderr` is set or the file can't be
/// opened. Returns the file path when logging to a file.
pub fn init_logging(verbose: bool, to_stderr: bool) -> Option<PathBuf> {
    let level = if verbose { Level::DEBUG } else { Level::INFO };

    if !to_stderr {
        match open_log_file() {
            Ok((path, file)) => {
                let installed = tracing_subscriber::fmt()
                    .with_max_level(level)
                    .with_ansi(false)
                    .with_writer(Mutex::new(file))
                    .try_init()
                    .is_ok();
                return installed.then_some(path);
            }
            Err(e) => eprintln!("Logging to stderr: {:#}", e),
        }
    }

    let _ = tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .try_init();
    None
}

fn open_log_file() -> Result<(PathBuf, fs::File)> {
    let path = log_file_path()?;
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create log directory: {}", parent.display()))?;
    }
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .with_context(|| format!("Failed to open log file: {}", path.display()))?;
    Ok((path, file))
}
