use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use std::process::Command;
use tracing::{info, warn};

use crate::engine::process::find_in_path;

#[cfg(windows)]
const FFMPEG_EXE: &str = "ffmpeg.exe";
#[cfg(not(windows))]
const FFMPEG_EXE: &str = "ffmpeg";

/// Check that `ffmpeg` runs and return the first line of its version banner
pub fn ffmpeg_version(ffmpeg: &Path) -> Result<String> {
    let output = Command::new(ffmpeg)
        .arg("-version")
        .output()
        .with_context(|| format!("Failed to execute {}. Is ffmpeg installed?", ffmpeg.display()))?;

    if !output.status.success() {
        anyhow::bail!("ffmpeg command failed with status: {}", output.status);
    }

    let version_output = String::from_utf8_lossy(&output.stdout);
    let first_line = version_output.lines().next().unwrap_or("Unknown version");

    Ok(first_line.to_string())
}

/// Directories searched after the bundled copy and PATH
fn common_install_dirs() -> Vec<PathBuf> {
    let mut candidates = Vec::new();
    if cfg!(windows) {
        candidates.push(PathBuf::from("C:/ffmpeg/bin"));
        candidates.push(PathBuf::from("C:/Program Files/ffmpeg/bin"));
        candidates.push(PathBuf::from("C:/Program Files (x86)/ffmpeg/bin"));
    }
    if let Some(home) = dirs::home_dir() {
        candidates.push(home.join("ffmpeg").join("bin"));
    }
    candidates
}

/// Copy shipped next to the running executable (`<exe dir>/ffmpeg` or `<exe dir>/assets/ffmpeg`)
fn bundled_ffmpeg() -> Option<PathBuf> {
    let exe = std::env::current_exe().ok()?;
    let dir = exe.parent()?;
    [dir.join(FFMPEG_EXE), dir.join("assets").join(FFMPEG_EXE)]
        .into_iter()
        .find(|path| path.is_file())
}

/// Find the FFmpeg executable.
///
/// Order: explicit override, bundled copy, PATH, common install directories.
/// An override that doesn't exist is reported and skipped.
pub fn locate_ffmpeg(override_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = override_path {
        if path.is_file() {
            info!("Using configured FFmpeg at {}", path.display());
            return Some(path.to_path_buf());
        }
        warn!("Configured FFmpeg path {} does not exist", path.display());
    }

    if let Some(path) = bundled_ffmpeg() {
        info!("Using bundled FFmpeg from {}", path.display());
        return Some(path);
    }

    if let Some(path) = find_in_path("ffmpeg") {
        info!("Using system FFmpeg from {}", path.display());
        return Some(path);
    }

    let found = common_install_dirs()
        .into_iter()
        .map(|dir| dir.join(FFMPEG_EXE))
        .find(|path| path.is_file());

    match &found {
        Some(path) => info!("Found FFmpeg in {}", path.display()),
        None => warn!("FFmpeg not found in standard locations"),
    }
    found
}
