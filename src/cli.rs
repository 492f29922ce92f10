use clap::{Args, Parser, Subcommand};
use screenrec::engine::{CaptureRect, Codec, Container, RateControl, Resolution};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "screenrec")]
#[command(about = "Desktop screen recorder driving FFmpeg", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Log at debug level, including every FFmpeg diagnostic line
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Write the log to stderr instead of the daily log file
    #[arg(long, global = true)]
    pub log_stderr: bool,

    /// FFmpeg executable to use (overrides config and search)
    #[arg(long, global = true, value_name = "PATH")]
    pub ffmpeg: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Check that FFmpeg can be found and run
    CheckFfmpeg,

    /// List the encoders usable on this machine
    Encoders {
        /// Ignore the cached result and probe again
        #[arg(long)]
        refresh: bool,

        /// Print the detection result as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show the FFmpeg command a recording would run, without starting it
    DryRun {
        #[command(flatten)]
        options: RecordOptions,
    },

    /// Record the desktop until Enter is pressed or the duration elapses
    Record {
        #[command(flatten)]
        options: RecordOptions,

        /// Stop automatically after this many seconds
        #[arg(long, value_name = "SECONDS")]
        duration: Option<u64>,
    },

    /// List the built-in recording presets
    Presets,

    /// Show config status and location, or create default config if missing
    InitConfig,
}

/// Per-recording overrides on top of the `[recording]` config section
#[derive(Args, Debug, Clone, Default)]
pub struct RecordOptions {
    /// Built-in preset to apply before the other options
    #[arg(long, value_name = "NAME")]
    pub preset_name: Option<String>,

    /// Capture frame rate
    #[arg(long)]
    pub fps: Option<u32>,

    /// Capture rectangle as X,Y,WIDTH,HEIGHT
    #[arg(long, value_name = "X,Y,W,H", allow_hyphen_values = true)]
    pub region: Option<CaptureRect>,

    /// Monitor index (screen number on X11)
    #[arg(long)]
    pub monitor: Option<u32>,

    /// Hide the mouse cursor
    #[arg(long)]
    pub no_cursor: bool,

    /// FFmpeg encoder name, e.g. h264_nvenc
    #[arg(long, conflicts_with = "codec")]
    pub encoder: Option<String>,

    /// Pick the best detected encoder for this codec (h264, h265, av1)
    #[arg(long)]
    pub codec: Option<Codec>,

    /// Prefer hardware encoders when picking by codec
    #[arg(long, conflicts_with = "software")]
    pub hw: bool,

    /// Prefer software encoders when picking by codec
    #[arg(long)]
    pub software: bool,

    /// Rate control: cbr, vbr, crf or cq
    #[arg(long)]
    pub rate_control: Option<RateControl>,

    /// Target bitrate in kbps
    #[arg(long)]
    pub bitrate: Option<u32>,

    /// CRF / CQ quality value
    #[arg(long)]
    pub crf: Option<u32>,

    /// Encoder speed preset
    #[arg(long)]
    pub preset: Option<String>,

    /// Output resolution as WIDTHxHEIGHT
    #[arg(long)]
    pub scale: Option<Resolution>,

    /// System audio device (use "none" to disable system audio)
    #[arg(long, value_name = "DEVICE")]
    pub system_audio: Option<String>,

    /// Microphone device
    #[arg(long, value_name = "DEVICE")]
    pub mic: Option<String>,

    /// Container: mp4, mkv or mov
    #[arg(long)]
    pub container: Option<Container>,

    /// Directory recordings are written to
    #[arg(long)]
    pub output_dir: Option<PathBuf>,

    /// File name pattern ({date}, {time}, {codec}, {res}, {fps})
    #[arg(long)]
    pub pattern: Option<String>,

    /// Split the recording into segments of this many minutes
    #[arg(long, value_name = "MINUTES")]
    pub segment_minutes: Option<u32>,
}

pub fn parse() -> Cli {
    Cli::parse()
}
