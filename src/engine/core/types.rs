use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use crate::engine::hardware::{self, EncoderDescriptor};

/// Device string the UI stores before a real device has been picked
pub const DEVICE_PLACEHOLDER: &str = "default";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Codec {
    H264,
    H265,
    Av1,
}

impl Codec {
    /// Lowercase token used in filenames and on the command line
    pub fn token(&self) -> &'static str {
        match self {
            Self::H264 => "h264",
            Self::H265 => "h265",
            Self::Av1 => "av1",
        }
    }

    /// Human-facing label
    pub fn label(&self) -> &'static str {
        match self {
            Self::H264 => "H264",
            Self::H265 => "HEVC",
            Self::Av1 => "AV1",
        }
    }
}

impl fmt::Display for Codec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for Codec {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "h264" | "avc" => Ok(Self::H264),
            "h265" | "hevc" => Ok(Self::H265),
            "av1" => Ok(Self::Av1),
            other => Err(format!("unknown codec '{}' (expected h264, h265 or av1)", other)),
        }
    }
}

/// Bitrate-governing strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RateControl {
    Cbr,
    Vbr,
    Crf,
    Cq,
}

impl RateControl {
    pub const ALL: [RateControl; 4] = [Self::Cbr, Self::Vbr, Self::Crf, Self::Cq];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Cbr => "cbr",
            Self::Vbr => "vbr",
            Self::Crf => "crf",
            Self::Cq => "cq",
        }
    }
}

impl fmt::Display for RateControl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.as_str().to_ascii_uppercase())
    }
}

impl FromStr for RateControl {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "cbr" => Ok(Self::Cbr),
            "vbr" => Ok(Self::Vbr),
            "crf" => Ok(Self::Crf),
            "cq" => Ok(Self::Cq),
            other => Err(format!("unknown rate control '{}' (expected cbr, vbr, crf or cq)", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Container {
    #[default]
    Mp4,
    Mkv,
    Mov,
}

impl Container {
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Mp4 => "mp4",
            Self::Mkv => "mkv",
            Self::Mov => "mov",
        }
    }
}

impl FromStr for Container {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "mp4" => Ok(Self::Mp4),
            "mkv" => Ok(Self::Mkv),
            "mov" => Ok(Self::Mov),
            other => Err(format!("unknown container '{}' (expected mp4, mkv or mov)", other)),
        }
    }
}

/// FFmpeg input device family used to grab the desktop
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CaptureBackend {
    /// Windows GDI grabber (`-f gdigrab -i desktop`), audio via DirectShow
    Gdigrab,
    /// X11 grabber (`-f x11grab -i :0.0+X,Y`), audio via PulseAudio
    X11grab,
}

impl CaptureBackend {
    /// Backend matching the build target
    pub fn native() -> Self {
        if cfg!(windows) {
            Self::Gdigrab
        } else {
            Self::X11grab
        }
    }

    pub fn video_format(&self) -> &'static str {
        match self {
            Self::Gdigrab => "gdigrab",
            Self::X11grab => "x11grab",
        }
    }

    pub fn audio_format(&self) -> &'static str {
        match self {
            Self::Gdigrab => "dshow",
            Self::X11grab => "pulse",
        }
    }
}

impl Default for CaptureBackend {
    fn default() -> Self {
        Self::native()
    }
}

/// Sub-rectangle of the desktop to capture
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaptureRect {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

impl CaptureRect {
    pub fn new(x: i32, y: i32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn size(&self) -> Resolution {
        Resolution::new(self.width, self.height)
    }
}

impl FromStr for CaptureRect {
    type Err = String;

    /// Parses `X,Y,WIDTH,HEIGHT`
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.split(',').map(str::trim).collect();
        if parts.len() != 4 {
            return Err(format!("expected X,Y,WIDTH,HEIGHT, got '{}'", s));
        }
        let x = parts[0].parse().map_err(|_| format!("invalid x offset '{}'", parts[0]))?;
        let y = parts[1].parse().map_err(|_| format!("invalid y offset '{}'", parts[1]))?;
        let width = parts[2].parse().map_err(|_| format!("invalid width '{}'", parts[2]))?;
        let height = parts[3].parse().map_err(|_| format!("invalid height '{}'", parts[3]))?;
        Ok(Self::new(x, y, width, height))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

impl Resolution {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

impl FromStr for Resolution {
    type Err = String;

    /// Parses `WIDTHxHEIGHT`
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (w, h) = s
            .split_once(['x', 'X'])
            .ok_or_else(|| format!("expected WIDTHxHEIGHT, got '{}'", s))?;
        let width = w.trim().parse().map_err(|_| format!("invalid width '{}'", w))?;
        let height = h.trim().parse().map_err(|_| format!("invalid height '{}'", h))?;
        Ok(Self::new(width, height))
    }
}

/// Encoder chosen for a recording: either an already-resolved catalog entry or
/// a name that still has to be looked up.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum EncoderSelection {
    Resolved(&'static EncoderDescriptor),
    Named(String),
}

impl EncoderSelection {
    pub fn name(&self) -> &str {
        match self {
            Self::Resolved(desc) => desc.name,
            Self::Named(name) => name,
        }
    }

    /// Resolve against the static catalog
    pub fn resolve(&self) -> Option<&'static EncoderDescriptor> {
        match self {
            Self::Resolved(desc) => Some(desc),
            Self::Named(name) => hardware::lookup(name),
        }
    }
}

impl Default for EncoderSelection {
    fn default() -> Self {
        Self::Named(hardware::BASELINE_ENCODER.to_string())
    }
}

impl From<String> for EncoderSelection {
    fn from(name: String) -> Self {
        Self::Named(name)
    }
}

impl From<&'static EncoderDescriptor> for EncoderSelection {
    fn from(desc: &'static EncoderDescriptor) -> Self {
        Self::Resolved(desc)
    }
}

impl From<EncoderSelection> for String {
    fn from(selection: EncoderSelection) -> Self {
        selection.name().to_string()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceConfig {
    /// Monitor index as reported by the display enumerator (screen number for X11)
    pub monitor_index: u32,
    pub region: Option<CaptureRect>,
    pub fps: u32,
    pub show_cursor: bool,
    pub backend: CaptureBackend,
    /// X11 display name; `:0` when unset
    pub display: Option<String>,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            monitor_index: 0,
            region: None,
            fps: 60,
            show_cursor: true,
            backend: CaptureBackend::native(),
            display: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EncodingConfig {
    pub encoder: EncoderSelection,
    pub preset: String,
    pub rate_control: RateControl,
    pub bitrate_kbps: u32,
    pub max_bitrate_kbps: u32,
    pub buffer_size_kbps: u32,
    /// CRF / CQ value
    pub quality: u32,
    /// Keyframe interval in frames
    pub keyframe_interval: u32,
    pub profile: String,
    pub scale: Option<Resolution>,
}

impl Default for EncodingConfig {
    fn default() -> Self {
        Self {
            encoder: EncoderSelection::default(),
            preset: "veryfast".to_string(),
            rate_control: RateControl::Cbr,
            bitrate_kbps: 8000,
            max_bitrate_kbps: 8000,
            buffer_size_kbps: 16000,
            quality: 23,
            keyframe_interval: 120, // 2 seconds at 60fps
            profile: "high".to_string(),
            scale: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    pub system_enabled: bool,
    pub system_device: String,
    pub mic_enabled: bool,
    pub mic_device: String,
    pub bitrate_kbps: u32,
    pub sample_rate: u32,
    pub channels: u32,
    pub normalize: bool,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            system_enabled: true,
            system_device: DEVICE_PLACEHOLDER.to_string(),
            mic_enabled: false,
            mic_device: String::new(),
            bitrate_kbps: 160,
            sample_rate: 48000,
            channels: 2,
            normalize: true,
        }
    }
}

/// True when the device string still needs to be bound to a real device
pub fn is_placeholder_device(device: &str) -> bool {
    let trimmed = device.trim();
    trimmed.is_empty() || trimmed.eq_ignore_ascii_case(DEVICE_PLACEHOLDER)
}

impl AudioConfig {
    /// System-audio device to capture, if enabled and bound
    pub fn system_input(&self) -> Option<&str> {
        (self.system_enabled && !is_placeholder_device(&self.system_device))
            .then_some(self.system_device.as_str())
    }

    /// Microphone device to capture, if enabled and bound
    pub fn mic_input(&self) -> Option<&str> {
        (self.mic_enabled && !is_placeholder_device(&self.mic_device))
            .then_some(self.mic_device.as_str())
    }

    pub fn any_enabled(&self) -> bool {
        self.system_enabled || self.mic_enabled
    }

    /// Replace placeholder device strings with the identifiers of the actual
    /// default devices. `None` leaves the placeholder in place.
    pub fn resolve_placeholders(&mut self, system_default: Option<&str>, mic_default: Option<&str>) {
        if is_placeholder_device(&self.system_device) {
            if let Some(device) = system_default {
                self.system_device = device.to_string();
            }
        }
        if is_placeholder_device(&self.mic_device) {
            if let Some(device) = mic_default {
                self.mic_device = device.to_string();
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    pub container: Container,
    pub directory: PathBuf,
    /// Supports {date}, {time}, {codec}, {res}, {fps}
    pub file_pattern: String,
    pub segment_minutes: Option<u32>,
}

pub fn default_output_dir() -> PathBuf {
    dirs::video_dir()
        .or_else(|| dirs::home_dir().map(|home| home.join("Videos")))
        .unwrap_or_else(|| PathBuf::from("."))
        .join("ScreenRec")
}

impl OutputConfig {
    /// Segment length in seconds; `None` when segmentation is off
    pub fn segment_seconds(&self) -> Option<u32> {
        self.segment_minutes
            .filter(|minutes| *minutes > 0)
            .map(|minutes| minutes.saturating_mul(60))
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            container: Container::Mp4,
            directory: default_output_dir(),
            file_pattern: "{date}_{time}_{codec}_{res}_{fps}fps".to_string(),
            segment_minutes: None,
        }
    }
}

/// One capture intent; immutable for the lifetime of a recording
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecordingConfig {
    pub source: SourceConfig,
    pub encoding: EncodingConfig,
    pub audio: AudioConfig,
    pub output: OutputConfig,
}

impl RecordingConfig {
    /// Encoder descriptor for this config, if the selection resolves
    pub fn encoder(&self) -> Option<&'static EncoderDescriptor> {
        self.encoding.encoder.resolve()
    }

    /// Value of the `{codec}` filename token
    pub fn codec_token(&self) -> &'static str {
        self.encoder()
            .map(|desc| desc.codec.token())
            .unwrap_or(Codec::H264.token())
    }

    /// Value of the `{res}` filename token: output scale, then capture
    /// rectangle, then "desktop"
    pub fn resolution_token(&self) -> String {
        if let Some(scale) = self.encoding.scale {
            scale.to_string()
        } else if let Some(rect) = self.source.region {
            rect.size().to_string()
        } else {
            "desktop".to_string()
        }
    }
}
