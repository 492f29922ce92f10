mod ffmpeg_cmd;
mod ffmpeg_info;
mod filename;
mod log;
mod profile;
mod state;
mod telemetry;
mod types;

pub use ffmpeg_cmd::{MIX_PAD, build_args, format_command};
pub use ffmpeg_info::{ffmpeg_version, locate_ffmpeg};
pub use filename::{
    SEGMENT_SUFFIX, is_segment_name, output_path, render_filename, segment_prefix,
};
pub use log::{init_logging, log_dir, log_file_path};
pub use profile::Preset;
pub use state::{RecorderState, SharedState};
pub use telemetry::{TelemetryUpdate, parse_chunk, parse_line, split_lines};
pub use types::{
    AudioConfig, CaptureBackend, CaptureRect, Codec, Container, DEVICE_PLACEHOLDER,
    EncoderSelection, EncodingConfig, OutputConfig, RateControl, RecordingConfig, Resolution,
    SourceConfig, default_output_dir, is_placeholder_device,
};
