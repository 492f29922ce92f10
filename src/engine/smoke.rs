//! One-frame smoke test that confirms a listed encoder really runs here.
//!
//! FFmpeg builds routinely list NVENC/QSV/AMF encoders on machines without the
//! matching GPU or driver, so being listed in `-encoders` is not enough.

use serde::Serialize;
use std::path::Path;
use std::process::{Command, Stdio};
use std::time::Duration;
use tracing::debug;

use crate::engine::process::wait_child_timeout;

pub const SMOKE_TEST_TIMEOUT: Duration = Duration::from_secs(5);

/// Synthetic source: a short test pattern at 1 fps
const SMOKE_SOURCE: &str = "testsrc=duration=0.1:size=320x240:rate=1";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SmokeStatus {
    Passed,
    Failed { code: Option<i32> },
    TimedOut,
    SpawnFailed,
}

/// Arguments for encoding a single synthetic frame with `encoder` into the null muxer
pub fn smoke_test_args(encoder: &str) -> Vec<String> {
    [
        "-hide_banner",
        "-loglevel",
        "error",
        "-f",
        "lavfi",
        "-i",
        SMOKE_SOURCE,
        "-c:v",
        encoder,
        "-pix_fmt",
        "yuv420p", // Required for hardware encoders
        "-frames:v",
        "1",
        "-f",
        "null",
        "-",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

pub fn run_smoke_test(ffmpeg: &Path, encoder: &str, timeout: Duration) -> SmokeStatus {
    let mut child = match Command::new(ffmpeg)
        .args(smoke_test_args(encoder))
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
    {
        Ok(child) => child,
        Err(e) => {
            debug!(encoder, "Failed to spawn smoke test: {}", e);
            return SmokeStatus::SpawnFailed;
        }
    };

    match wait_child_timeout(&mut child, timeout) {
        Ok(Some(status)) if status.success() => SmokeStatus::Passed,
        Ok(Some(status)) => SmokeStatus::Failed {
            code: status.code(),
        },
        Ok(None) => {
            let _ = child.kill();
            let _ = child.wait();
            SmokeStatus::TimedOut
        }
        Err(e) => {
            debug!(encoder, "Failed to wait for smoke test: {}", e);
            let _ = child.kill();
            let _ = child.wait();
            SmokeStatus::Failed { code: None }
        }
    }
}
