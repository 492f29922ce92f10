// Live recording statistics and formatting helpers

use serde::Serialize;
use std::time::Duration;

use crate::engine::TelemetryUpdate;

/// Snapshot of a running recording. Fields are overwritten in place by
/// telemetry and by the once-a-second poller.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RecorderStats {
    /// Wall-clock time since the recording started, or media time from telemetry
    pub elapsed: Duration,

    /// Size of the output file in bytes
    pub file_size: u64,

    pub dropped_frames: u64,

    /// Instantaneous encoding fps
    pub fps: f64,

    /// Instantaneous bitrate in kbit/s
    pub bitrate_kbps: f64,

    /// FFmpeg name of the encoder in use
    pub encoder: String,
}

impl RecorderStats {
    pub fn new(encoder: impl Into<String>) -> Self {
        Self {
            encoder: encoder.into(),
            ..Self::default()
        }
    }

    /// Copy the fields present in `update`; absent fields keep their value
    pub fn apply(&mut self, update: &TelemetryUpdate) {
        if let Some(fps) = update.fps {
            self.fps = fps;
        }
        if let Some(bitrate) = update.bitrate_kbps {
            self.bitrate_kbps = bitrate;
        }
        if let Some(elapsed) = update
            .elapsed_secs
            .and_then(|secs| Duration::try_from_secs_f64(secs).ok())
        {
            self.elapsed = elapsed;
        }
        if let Some(dropped) = update.dropped_frames {
            self.dropped_frames = dropped;
        }
    }

    /// One-line status for terminals, e.g. `00:01:05 | 12.40 MB | 60.0 fps | 8000 kbps | 0 dropped`
    pub fn status_line(&self) -> String {
        format!(
            "{} | {} | {:.1} fps | {:.0} kbps | {} dropped",
            format_clock(self.elapsed),
            format_bytes(self.file_size),
            self.fps,
            self.bitrate_kbps,
            self.dropped_frames
        )
    }
}

/// Format bytes as human-readable size
pub fn format_bytes(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;
    const TB: u64 = GB * 1024;

    if bytes >= TB {
        format!("{:.2} TB", bytes as f64 / TB as f64)
    } else if bytes >= GB {
        format!("{:.2} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.2} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.2} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
}

/// Format duration in seconds as human-readable time
pub fn format_duration(seconds: f64) -> String {
    let total_secs = seconds as u64;
    let hours = total_secs / 3600;
    let minutes = (total_secs % 3600) / 60;
    let secs = total_secs % 60;

    if hours > 0 {
        format!("{}h {}m", hours, minutes)
    } else if minutes > 0 {
        format!("{}m {}s", minutes, secs)
    } else {
        format!("{}s", secs)
    }
}

/// `HH:MM:SS` recording clock
pub fn format_clock(elapsed: Duration) -> String {
    let total = elapsed.as_secs();
    format!("{:02}:{:02}:{:02}", total / 3600, (total % 3600) / 60, total % 60)
}
