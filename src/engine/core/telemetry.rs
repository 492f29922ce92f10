//! Parser for the progress tokens FFmpeg prints on stderr.
//!
//! Progress lines look like
//! `frame= 1234 fps= 60 q=23.0 size=  10240kB time=00:00:20.56 bitrate=4080.1kbits/s dup=0 drop=3 speed=1x`
//! and are terminated with `\r`, not `\n`.

use serde::Serialize;

/// Fields found in one chunk of diagnostic output. `None` means "not present",
/// and the caller keeps whatever value it had before.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct TelemetryUpdate {
    pub fps: Option<f64>,
    pub bitrate_kbps: Option<f64>,
    /// Encoded media time in seconds
    pub elapsed_secs: Option<f64>,
    pub dropped_frames: Option<u64>,
}

impl TelemetryUpdate {
    pub fn is_empty(&self) -> bool {
        self.fps.is_none()
            && self.bitrate_kbps.is_none()
            && self.elapsed_secs.is_none()
            && self.dropped_frames.is_none()
    }

    /// Overlay `other` on top of `self`; fields present in `other` win
    fn merge(&mut self, other: TelemetryUpdate) {
        self.fps = other.fps.or(self.fps);
        self.bitrate_kbps = other.bitrate_kbps.or(self.bitrate_kbps);
        self.elapsed_secs = other.elapsed_secs.or(self.elapsed_secs);
        self.dropped_frames = other.dropped_frames.or(self.dropped_frames);
    }
}

/// Split raw stderr text into lines on either `\r` or `\n`
pub fn split_lines(text: &str) -> impl Iterator<Item = &str> {
    text.split(['\r', '\n']).filter(|line| !line.trim().is_empty())
}

/// Parse every progress field in `text`. Later lines override earlier ones.
pub fn parse_chunk(text: &str) -> TelemetryUpdate {
    let mut update = TelemetryUpdate::default();
    for line in split_lines(text) {
        update.merge(parse_line(line));
    }
    update
}

/// Parse a single diagnostic line
pub fn parse_line(line: &str) -> TelemetryUpdate {
    TelemetryUpdate {
        fps: extract_value(line, "fps=").and_then(|v| v.parse::<f64>().ok()),
        bitrate_kbps: extract_value(line, "bitrate=")
            .and_then(|v| v.strip_suffix("kbits/s"))
            .and_then(|v| v.parse::<f64>().ok()),
        elapsed_secs: extract_value(line, "time=").and_then(parse_timestamp),
        dropped_frames: parse_dropped(line),
    }
}

/// Value following `key`, tolerating padding spaces after the `=`
fn extract_value<'a>(line: &'a str, key: &str) -> Option<&'a str> {
    let start = find_key(line, key)?;
    let after_key = line[start + key.len()..].trim_start();
    let end = after_key
        .find(char::is_whitespace)
        .unwrap_or(after_key.len());
    let value = &after_key[..end];
    (!value.is_empty() && value != "N/A").then_some(value)
}

/// Position of `key` as a whole token (not the tail of e.g. `out_time=`)
fn find_key(line: &str, key: &str) -> Option<usize> {
    line.match_indices(key)
        .map(|(idx, _)| idx)
        .find(|&idx| {
            line[..idx]
                .chars()
                .next_back()
                .is_none_or(|c| !(c.is_ascii_alphanumeric() || c == '_'))
        })
}

/// `HH:MM:SS.ms` -> seconds
fn parse_timestamp(value: &str) -> Option<f64> {
    let mut parts = value.split(':');
    let hours: u64 = parts.next()?.parse().ok()?;
    let minutes: u64 = parts.next()?.parse().ok()?;
    let seconds: f64 = parts.next()?.parse().ok()?;
    if parts.next().is_some() || !seconds.is_finite() || seconds < 0.0 {
        return None;
    }
    Some(hours as f64 * 3600.0 + minutes as f64 * 60.0 + seconds)
}

/// Drop count, only trusted when the frame/dup/drop triplet appears together
fn parse_dropped(line: &str) -> Option<u64> {
    let frame = find_key(line, "frame=")?;
    let dup = find_key(line, "dup=")?;
    let drop = find_key(line, "drop=")?;
    if !(frame < dup && dup < drop) {
        return None;
    }
    extract_value(line, "frame=")?.parse::<u64>().ok()?;
    extract_value(line, "dup=")?.parse::<u64>().ok()?;
    extract_value(line, "drop=")?.parse().ok()
}
