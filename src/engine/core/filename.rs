use chrono::NaiveDateTime;
use std::path::PathBuf;

use super::types::RecordingConfig;

/// Segment index suffix appended to the stem when the segment muxer is used
pub const SEGMENT_SUFFIX: &str = "_%03d";

/// Substitute the filename tokens in `pattern` and append the container extension.
///
/// Tokens are replaced literally and case-sensitively; unknown `{...}` tokens are
/// left untouched.
pub fn render_filename(pattern: &str, config: &RecordingConfig, now: NaiveDateTime) -> String {
    let replacements = [
        ("{date}", now.format("%Y%m%d").to_string()),
        ("{time}", now.format("%H%M%S").to_string()),
        ("{codec}", config.codec_token().to_string()),
        ("{res}", config.resolution_token()),
        ("{fps}", config.source.fps.to_string()),
    ];

    let mut stem = pattern.to_string();
    for (token, value) in &replacements {
        stem = stem.replace(token, value);
    }

    format!("{}.{}", stem, config.output.container.extension())
}

/// Full output path for a recording started at `now`.
///
/// With segmentation enabled the path carries a `%03d` index placeholder that
/// FFmpeg's segment muxer fills in.
pub fn output_path(config: &RecordingConfig, now: NaiveDateTime) -> PathBuf {
    let pattern = if config.output.segment_seconds().is_some() {
        format!("{}{}", config.output.file_pattern, SEGMENT_SUFFIX)
    } else {
        config.output.file_pattern.clone()
    };

    config
        .output
        .directory
        .join(render_filename(&pattern, config, now))
}

/// Filename prefix shared by all segments of `output`, up to and including
/// the `_` before `%03d`
pub fn segment_prefix(output: &std::path::Path) -> Option<String> {
    let name = output.file_name()?.to_str()?;
    name.find(SEGMENT_SUFFIX).map(|idx| name[..=idx].to_string())
}

/// True when `name` is `<prefix><digits>.<extension>`
pub fn is_segment_name(name: &str, prefix: &str, extension: &str) -> bool {
    name.strip_prefix(prefix)
        .and_then(|rest| rest.strip_suffix(extension))
        .and_then(|rest| rest.strip_suffix('.'))
        .is_some_and(|index| !index.is_empty() && index.bytes().all(|b| b.is_ascii_digit()))
}
