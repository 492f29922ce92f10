use serde::Serialize;

use super::types::{EncoderSelection, RateControl, RecordingConfig, Resolution};

/// Named bundle of encoding settings applied on top of a [`RecordingConfig`]
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Preset {
    pub name: &'static str,
    pub scale: Resolution,
    pub fps: u32,
    pub encoder: &'static str,
    pub preset: &'static str,
    pub rate_control: RateControl,
    pub bitrate_kbps: u32,
    pub max_bitrate_kbps: u32,
    pub buffer_size_kbps: u32,
    pub keyframe_interval: u32,
    pub profile: &'static str,
}

static BUILTIN: [Preset; 3] = [
    Preset {
        name: "1080p60 Streaming",
        scale: Resolution {
            width: 1920,
            height: 1080,
        },
        fps: 60,
        encoder: "h264_nvenc",
        preset: "p5",
        rate_control: RateControl::Cbr,
        bitrate_kbps: 8000,
        max_bitrate_kbps: 8000,
        buffer_size_kbps: 16000,
        keyframe_interval: 120,
        profile: "high",
    },
    Preset {
        name: "1440p60 Gaming",
        scale: Resolution {
            width: 2560,
            height: 1440,
        },
        fps: 60,
        encoder: "h264_nvenc",
        preset: "p5",
        rate_control: RateControl::Cbr,
        bitrate_kbps: 14000,
        max_bitrate_kbps: 14000,
        buffer_size_kbps: 28000,
        keyframe_interval: 120,
        profile: "high",
    },
    Preset {
        name: "4K30 Quality",
        scale: Resolution {
            width: 3840,
            height: 2160,
        },
        fps: 30,
        encoder: "hevc_nvenc",
        preset: "p5",
        rate_control: RateControl::Cbr,
        bitrate_kbps: 32000,
        max_bitrate_kbps: 32000,
        buffer_size_kbps: 64000,
        keyframe_interval: 60, // 2 seconds at 30fps
        profile: "main",
    },
];

impl Preset {
    pub fn builtin() -> &'static [Preset] {
        &BUILTIN
    }

    /// Case-insensitive lookup by name
    pub fn get(name: &str) -> Option<&'static Preset> {
        BUILTIN
            .iter()
            .find(|preset| preset.name.eq_ignore_ascii_case(name.trim()))
    }

    /// Overwrite the video settings of `config`; audio, source region and
    /// output settings are left alone.
    pub fn apply(&self, config: &mut RecordingConfig) {
        config.source.fps = self.fps;

        let enc = &mut config.encoding;
        enc.scale = Some(self.scale);
        enc.encoder = EncoderSelection::Named(self.encoder.to_string());
        enc.preset = self.preset.to_string();
        enc.rate_control = self.rate_control;
        enc.bitrate_kbps = self.bitrate_kbps;
        enc.max_bitrate_kbps = self.max_bitrate_kbps;
        enc.buffer_size_kbps = self.buffer_size_kbps;
        enc.keyframe_interval = self.keyframe_interval;
        enc.profile = self.profile.to_string();
    }
}
