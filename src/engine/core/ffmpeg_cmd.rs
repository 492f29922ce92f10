//! Translate a [`RecordingConfig`] into an FFmpeg argument list.
//!
//! Stanza order is fixed: video input, audio inputs, audio mix graph, video
//! filter, stream mappings, video encoder, audio encoder, container flags,
//! segmentation, output path. Mappings refer to the mix pad, so the graph must
//! come first.

use std::fmt::Display;
use std::path::Path;
use tracing::{debug, warn};

use super::types::{CaptureBackend, Codec, Container, RateControl, RecordingConfig};
use crate::engine::hardware::{self, EncoderDescriptor, EncoderFamily, SoftwareFamily};

/// Output pad of the audio mix graph
pub const MIX_PAD: &str = "[aout]";

const DROPOUT_TRANSITION: u32 = 3;
const LOUDNESS_FILTER: &str = "dynaudnorm=f=150:g=31";
const SCALE_FLAGS: &str = "lanczos";

/// Intel has no separate VBR/CQ grammar; everything non-CBR uses this quality
const QSV_FALLBACK_QUALITY: u32 = 26;

// Used when the configured preset isn't in the encoder's vocabulary
const NVENC_DEFAULT_PRESET: &str = "p4";
const QSV_DEFAULT_PRESET: &str = "medium";
const AMF_DEFAULT_PRESET: &str = "balanced";
const X26X_DEFAULT_PRESET: &str = "veryfast";
const SVT_DEFAULT_PRESET: &str = "6";
const AOM_DEFAULT_CPU_USED: &str = "5";

fn push(args: &mut Vec<String>, flag: &str, value: impl Display) {
    args.push(flag.to_string());
    args.push(value.to_string());
}

fn kbps(value: u32) -> String {
    format!("{}k", value)
}

/// Build the full argument list (without the program name) for recording to `output`.
///
/// Never fails: an encoder that doesn't resolve falls back to libx264.
pub fn build_args(config: &RecordingConfig, output: &Path) -> Vec<String> {
    let mut args = Vec::new();

    push_video_input(&mut args, config);

    let audio_inputs = push_audio_inputs(&mut args, config);

    let mixed = audio_inputs.len() > 1;
    if mixed {
        push(
            &mut args,
            "-filter_complex",
            mix_graph(&audio_inputs, config.audio.normalize),
        );
    }

    if let Some(filter) = scale_filter(config) {
        push(&mut args, "-vf", filter);
    }

    push(&mut args, "-map", "0:v");
    if mixed {
        push(&mut args, "-map", MIX_PAD);
    } else if let Some(index) = audio_inputs.first() {
        push(&mut args, "-map", format!("{}:a", index));
    }

    push_video_encoder(&mut args, config);

    if !audio_inputs.is_empty() {
        push(&mut args, "-c:a", "aac");
        push(&mut args, "-b:a", kbps(config.audio.bitrate_kbps));
        push(&mut args, "-ar", config.audio.sample_rate);
        push(&mut args, "-ac", config.audio.channels);
    }

    if config.output.container == Container::Mp4 {
        push(&mut args, "-movflags", "+faststart");
    }

    if let Some(seconds) = config.output.segment_seconds() {
        push(&mut args, "-f", "segment");
        push(&mut args, "-segment_time", seconds);
        push(&mut args, "-reset_timestamps", "1");
    }

    args.push(output.to_string_lossy().into_owned());
    args
}

/// Shell-quoted command line for logs and dry runs
pub fn format_command(program: &Path, args: &[String]) -> String {
    let program = program.to_string_lossy();
    let words = std::iter::once(program.as_ref()).chain(args.iter().map(String::as_str));
    shlex::try_join(words.clone()).unwrap_or_else(|_| words.collect::<Vec<_>>().join(" "))
}

fn push_video_input(args: &mut Vec<String>, config: &RecordingConfig) {
    let source = &config.source;
    let backend = source.backend;

    push(args, "-f", backend.video_format());
    push(args, "-framerate", source.fps);

    match backend {
        CaptureBackend::Gdigrab => {
            if let Some(rect) = source.region {
                push(args, "-offset_x", rect.x);
                push(args, "-offset_y", rect.y);
                push(args, "-video_size", rect.size());
            }
            push(args, "-draw_mouse", u8::from(source.show_cursor));
            push(args, "-i", "desktop");
        }
        CaptureBackend::X11grab => {
            if let Some(rect) = source.region {
                push(args, "-video_size", rect.size());
            }
            push(args, "-draw_mouse", u8::from(source.show_cursor));

            let display = source.display.as_deref().unwrap_or(":0");
            let mut designator = if display.contains('.') {
                display.to_string()
            } else {
                format!("{}.{}", display, source.monitor_index)
            };
            if let Some(rect) = source.region {
                designator.push_str(&format!("+{},{}", rect.x, rect.y));
            }
            push(args, "-i", designator);
        }
    }
}

/// Push one input stanza per usable audio device; returns their input indices
fn push_audio_inputs(args: &mut Vec<String>, config: &RecordingConfig) -> Vec<usize> {
    let audio = &config.audio;
    let format = config.source.backend.audio_format();
    let mut indices = Vec::new();

    let devices = [
        ("system audio", audio.system_enabled, audio.system_input()),
        ("microphone", audio.mic_enabled, audio.mic_input()),
    ];

    for (label, enabled, device) in devices {
        match device {
            Some(device) => {
                push(args, "-f", format);
                let designator = match config.source.backend {
                    CaptureBackend::Gdigrab => format!("audio={}", device),
                    CaptureBackend::X11grab => device.to_string(),
                };
                push(args, "-i", designator);
                indices.push(indices.len() + 1);
            }
            None if enabled => {
                warn!("No {} device configured, recording without it", label);
            }
            None => {}
        }
    }

    indices
}

fn mix_graph(inputs: &[usize], normalize: bool) -> String {
    let pads: String = inputs.iter().map(|i| format!("[{}:a]", i)).collect();
    let mut graph = format!(
        "{}amix=inputs={}:duration=longest:dropout_transition={}",
        pads,
        inputs.len(),
        DROPOUT_TRANSITION
    );
    if normalize {
        graph.push(',');
        graph.push_str(LOUDNESS_FILTER);
    }
    graph.push_str(MIX_PAD);
    graph
}

/// Scale filter, only when the requested size differs from the captured one.
/// Full-desktop capture has no known size, so any explicit scale applies.
fn scale_filter(config: &RecordingConfig) -> Option<String> {
    let scale = config.encoding.scale?;
    if config.source.region.map(|rect| rect.size()) == Some(scale) {
        return None;
    }
    Some(format!(
        "scale={}:{}:flags={}",
        scale.width, scale.height, SCALE_FLAGS
    ))
}

fn resolve_encoder(config: &RecordingConfig) -> &'static EncoderDescriptor {
    config.encoder().unwrap_or_else(|| {
        warn!(
            encoder = config.encoding.encoder.name(),
            "Unknown encoder, falling back to {}",
            hardware::BASELINE_ENCODER
        );
        hardware::baseline()
    })
}

fn preset_or<'a>(desc: &EncoderDescriptor, preset: &'a str, fallback: &'a str) -> &'a str {
    if desc.has_preset(preset) {
        preset
    } else {
        debug!(encoder = desc.name, preset, fallback, "Preset not valid for encoder");
        fallback
    }
}

fn push_video_encoder(args: &mut Vec<String>, config: &RecordingConfig) {
    let desc = resolve_encoder(config);
    push(args, "-c:v", desc.name);

    match desc.family {
        EncoderFamily::Nvenc => push_nvenc(args, config, desc),
        EncoderFamily::Qsv => push_qsv(args, config, desc),
        EncoderFamily::Amf => push_amf(args, config, desc),
        EncoderFamily::Software(family) => push_software(args, config, desc, family),
    }
}

fn push_nvenc(args: &mut Vec<String>, config: &RecordingConfig, desc: &EncoderDescriptor) {
    let enc = &config.encoding;
    push(args, "-preset", preset_or(desc, &enc.preset, NVENC_DEFAULT_PRESET));
    push(args, "-tune", "hq");

    match enc.rate_control {
        RateControl::Cbr => {
            push(args, "-rc", "cbr");
            push(args, "-b:v", kbps(enc.bitrate_kbps));
            push(args, "-maxrate", kbps(enc.max_bitrate_kbps));
            push(args, "-bufsize", kbps(enc.buffer_size_kbps));
        }
        RateControl::Vbr => {
            push(args, "-rc", "vbr");
            push(args, "-b:v", kbps(enc.bitrate_kbps));
            push(args, "-maxrate", kbps(enc.max_bitrate_kbps));
        }
        RateControl::Crf | RateControl::Cq => {
            push(args, "-rc", "constqp");
            push(args, "-cq", enc.quality);
        }
    }

    push(args, "-g", enc.keyframe_interval);

    // av1_nvenc rejects B-frame and AQ options
    if desc.codec != Codec::Av1 {
        push(args, "-bf", 2);
        push(args, "-spatial-aq", 1);
        push(args, "-temporal-aq", 1);
    }

    if desc.codec == Codec::H264 {
        push(args, "-profile:v", &enc.profile);
    }

    push(args, "-pix_fmt", "yuv420p");
}

fn push_qsv(args: &mut Vec<String>, config: &RecordingConfig, desc: &EncoderDescriptor) {
    let enc = &config.encoding;
    push(args, "-preset:v", preset_or(desc, &enc.preset, QSV_DEFAULT_PRESET));

    match enc.rate_control {
        RateControl::Cbr => {
            push(args, "-b:v", kbps(enc.bitrate_kbps));
            push(args, "-maxrate", kbps(enc.max_bitrate_kbps));
            push(args, "-bufsize", kbps(enc.buffer_size_kbps));
        }
        RateControl::Vbr | RateControl::Crf | RateControl::Cq => {
            push(args, "-global_quality", QSV_FALLBACK_QUALITY);
        }
    }

    push(args, "-look_ahead", 1);
    push(args, "-g", enc.keyframe_interval);
    push(args, "-pix_fmt", "nv12");
}

fn push_amf(args: &mut Vec<String>, config: &RecordingConfig, desc: &EncoderDescriptor) {
    let enc = &config.encoding;
    push(args, "-quality", preset_or(desc, &enc.preset, AMF_DEFAULT_PRESET));

    let rc = match enc.rate_control {
        RateControl::Cbr => "cbr",
        RateControl::Vbr | RateControl::Crf | RateControl::Cq => "vbr_peak",
    };
    push(args, "-rc", rc);
    push(args, "-b:v", kbps(enc.bitrate_kbps));

    push(args, "-g", enc.keyframe_interval);
    push(args, "-pix_fmt", "yuv420p");
}

fn push_software(
    args: &mut Vec<String>,
    config: &RecordingConfig,
    desc: &EncoderDescriptor,
    family: SoftwareFamily,
) {
    let enc = &config.encoding;

    match family {
        SoftwareFamily::X264 | SoftwareFamily::X265 => {
            push(args, "-preset", preset_or(desc, &enc.preset, X26X_DEFAULT_PRESET));
        }
        SoftwareFamily::SvtAv1 => {
            push(args, "-preset", preset_or(desc, &enc.preset, SVT_DEFAULT_PRESET));
        }
        SoftwareFamily::AomAv1 => {
            push(args, "-cpu-used", preset_or(desc, &enc.preset, AOM_DEFAULT_CPU_USED));
        }
    }

    match enc.rate_control {
        RateControl::Crf | RateControl::Cq => {
            push(args, "-crf", enc.quality);
        }
        RateControl::Cbr | RateControl::Vbr => {
            push(args, "-b:v", kbps(enc.bitrate_kbps));
            push(args, "-maxrate", kbps(enc.max_bitrate_kbps));
            push(args, "-bufsize", kbps(enc.buffer_size_kbps));
        }
    }

    if family == SoftwareFamily::X264 {
        push(args, "-profile:v", &enc.profile);
    }

    push(args, "-g", enc.keyframe_interval);
    push(args, "-pix_fmt", "yuv420p");
}
