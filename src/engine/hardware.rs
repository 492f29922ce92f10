//! Encoder catalog and hardware encoder detection

use serde::Serialize;
use std::collections::{BTreeMap, HashSet};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use crate::engine::core::{Codec, RateControl, ffmpeg_version};
use crate::engine::smoke::{self, SmokeStatus};

/// Software H264 encoder that is always reported as available
pub const BASELINE_ENCODER: &str = "libx264";

const NVENC_PRESETS: &[&str] = &["p1", "p2", "p3", "p4", "p5", "p6", "p7"];

/// QSV preset options (veryfast to veryslow)
const QSV_PRESETS: &[&str] = &[
    "veryfast", "faster", "fast", "medium", "slow", "slower", "veryslow",
];

const AMF_PRESETS: &[&str] = &["speed", "balanced", "quality"];

const X26X_PRESETS: &[&str] = &[
    "ultrafast",
    "superfast",
    "veryfast",
    "faster",
    "fast",
    "medium",
    "slow",
    "slower",
    "veryslow",
];

const AOM_CPU_USED: &[&str] = &["0", "1", "2", "3", "4", "5", "6", "7", "8"];

const SVT_PRESETS: &[&str] = &[
    "0", "1", "2", "3", "4", "5", "6", "7", "8", "9", "10", "11", "12",
];

const HW_RATE_CONTROLS: &[RateControl] = &[RateControl::Cbr, RateControl::Vbr, RateControl::Cq];
const SW_RATE_CONTROLS: &[RateControl] = &[RateControl::Crf, RateControl::Cbr, RateControl::Vbr];

/// Encoder vendor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Vendor {
    Nvidia,
    Intel,
    Amd,
    Software,
}

impl Vendor {
    /// Preference order when hardware encoding is requested
    pub const PRIORITY: [Vendor; 4] = [Self::Nvidia, Self::Intel, Self::Amd, Self::Software];
}

/// Software encoder implementations; each has its own speed knob
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SoftwareFamily {
    X264,
    X265,
    SvtAv1,
    AomAv1,
}

/// Flag grammar an encoder speaks. The command builder dispatches on this.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EncoderFamily {
    Nvenc,
    Qsv,
    Amf,
    Software(SoftwareFamily),
}

impl EncoderFamily {
    pub fn vendor(&self) -> Vendor {
        match self {
            Self::Nvenc => Vendor::Nvidia,
            Self::Qsv => Vendor::Intel,
            Self::Amf => Vendor::Amd,
            Self::Software(_) => Vendor::Software,
        }
    }
}

/// Static description of one FFmpeg encoder
#[derive(Debug, PartialEq, Eq, Serialize)]
pub struct EncoderDescriptor {
    pub name: &'static str,
    pub codec: Codec,
    pub family: EncoderFamily,
    pub hardware: bool,
    /// Legal preset tokens, fastest first
    pub presets: &'static [&'static str],
    pub rate_controls: &'static [RateControl],
}

impl EncoderDescriptor {
    pub fn vendor(&self) -> Vendor {
        self.family.vendor()
    }

    pub fn supports(&self, rate_control: RateControl) -> bool {
        self.rate_controls.contains(&rate_control)
    }

    pub fn has_preset(&self, preset: &str) -> bool {
        self.presets.contains(&preset)
    }

    /// User-friendly name, e.g. "H264 (NVENC)" or "AV1 (SVT-AV1)"
    pub fn display_name(&self) -> String {
        let backend = match self.family {
            EncoderFamily::Nvenc => "NVENC",
            EncoderFamily::Qsv => "QSV",
            EncoderFamily::Amf => "AMF",
            EncoderFamily::Software(SoftwareFamily::SvtAv1) => "SVT-AV1",
            EncoderFamily::Software(SoftwareFamily::AomAv1) => "AOM",
            EncoderFamily::Software(_) => "CPU",
        };
        format!("{} ({})", self.codec, backend)
    }
}

const fn hw(
    name: &'static str,
    codec: Codec,
    family: EncoderFamily,
    presets: &'static [&'static str],
) -> EncoderDescriptor {
    EncoderDescriptor {
        name,
        codec,
        family,
        hardware: true,
        presets,
        rate_controls: HW_RATE_CONTROLS,
    }
}

const fn sw(
    name: &'static str,
    codec: Codec,
    family: SoftwareFamily,
    presets: &'static [&'static str],
) -> EncoderDescriptor {
    EncoderDescriptor {
        name,
        codec,
        family: EncoderFamily::Software(family),
        hardware: false,
        presets,
        rate_controls: SW_RATE_CONTROLS,
    }
}

/// Every encoder the recorder knows how to drive
pub static CATALOG: [EncoderDescriptor; 13] = [
    // NVIDIA NVENC
    hw("h264_nvenc", Codec::H264, EncoderFamily::Nvenc, NVENC_PRESETS),
    hw("hevc_nvenc", Codec::H265, EncoderFamily::Nvenc, NVENC_PRESETS),
    hw("av1_nvenc", Codec::Av1, EncoderFamily::Nvenc, NVENC_PRESETS),
    // Intel Quick Sync
    hw("h264_qsv", Codec::H264, EncoderFamily::Qsv, QSV_PRESETS),
    hw("hevc_qsv", Codec::H265, EncoderFamily::Qsv, QSV_PRESETS),
    hw("av1_qsv", Codec::Av1, EncoderFamily::Qsv, QSV_PRESETS),
    // AMD AMF
    hw("h264_amf", Codec::H264, EncoderFamily::Amf, AMF_PRESETS),
    hw("hevc_amf", Codec::H265, EncoderFamily::Amf, AMF_PRESETS),
    hw("av1_amf", Codec::Av1, EncoderFamily::Amf, AMF_PRESETS),
    // Software
    sw("libx264", Codec::H264, SoftwareFamily::X264, X26X_PRESETS),
    sw("libx265", Codec::H265, SoftwareFamily::X265, X26X_PRESETS),
    sw("libaom-av1", Codec::Av1, SoftwareFamily::AomAv1, AOM_CPU_USED),
    sw("libsvtav1", Codec::Av1, SoftwareFamily::SvtAv1, SVT_PRESETS),
];

const BASELINE_INDEX: usize = 9;

/// Look up a catalog entry by FFmpeg encoder name
pub fn lookup(name: &str) -> Option<&'static EncoderDescriptor> {
    CATALOG.iter().find(|desc| desc.name == name)
}

/// The software H264 encoder used whenever nothing else resolves
pub fn baseline() -> &'static EncoderDescriptor {
    &CATALOG[BASELINE_INDEX]
}

pub fn software_encoders() -> impl Iterator<Item = &'static EncoderDescriptor> {
    CATALOG.iter().filter(|desc| !desc.hardware)
}

// ============================================================================
// Detection
// ============================================================================

/// Collaborator that talks to the engine on behalf of the detector
pub trait EncoderProbe {
    /// Whether the engine executable can be run at all
    fn engine_available(&self) -> bool;

    /// Raw output of `ffmpeg -encoders`
    fn list_encoders(&self) -> anyhow::Result<String>;

    /// Run the one-frame smoke test for `encoder`; true if it exits cleanly in time
    fn smoke_test(&self, encoder: &EncoderDescriptor) -> bool;
}

/// Probe backed by a real FFmpeg executable
#[derive(Debug, Clone)]
pub struct FfmpegProbe {
    ffmpeg: PathBuf,
    timeout: Duration,
}

impl FfmpegProbe {
    pub fn new(ffmpeg: impl Into<PathBuf>) -> Self {
        Self {
            ffmpeg: ffmpeg.into(),
            timeout: smoke::SMOKE_TEST_TIMEOUT,
        }
    }
}

impl EncoderProbe for FfmpegProbe {
    fn engine_available(&self) -> bool {
        ffmpeg_version(&self.ffmpeg).is_ok()
    }

    fn list_encoders(&self) -> anyhow::Result<String> {
        use anyhow::Context;

        let output = std::process::Command::new(&self.ffmpeg)
            .args(["-hide_banner", "-encoders"])
            .output()
            .context("Failed to execute ffmpeg -encoders")?;

        if !output.status.success() {
            anyhow::bail!("ffmpeg -encoders failed with status: {}", output.status);
        }

        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }

    fn smoke_test(&self, encoder: &EncoderDescriptor) -> bool {
        match smoke::run_smoke_test(&self.ffmpeg, encoder.name, self.timeout) {
            SmokeStatus::Passed => true,
            status => {
                debug!(encoder = encoder.name, ?status, "Encoder smoke test failed");
                false
            }
        }
    }
}

/// Parse the video encoder names out of `ffmpeg -encoders` output.
///
/// Encoder lines look like ` V....D h264_nvenc  NVIDIA NVENC H.264 encoder`;
/// the header legend (` V..... = Video`) is skipped because its second token is `=`.
pub fn parse_encoder_list(output: &str) -> HashSet<String> {
    output
        .lines()
        .filter_map(|line| {
            let mut tokens = line.split_whitespace();
            let flags = tokens.next()?;
            let name = tokens.next()?;
            (flags.len() == 6 && flags.starts_with('V') && name != "=").then(|| name.to_string())
        })
        .collect()
}

/// Encoders this machine can actually run
#[derive(Debug, Clone, Serialize)]
pub struct DetectionResult {
    encoders: BTreeMap<&'static str, &'static EncoderDescriptor>,
    /// False when the engine could not be run and only software encoders were assumed
    pub engine_reachable: bool,
    /// Listed by the engine but failed the smoke test
    pub rejected: Vec<&'static str>,
}

impl DetectionResult {
    fn software_only(engine_reachable: bool) -> Self {
        Self {
            encoders: software_encoders().map(|desc| (desc.name, desc)).collect(),
            engine_reachable,
            rejected: Vec::new(),
        }
    }

    pub fn get(&self, name: &str) -> Option<&'static EncoderDescriptor> {
        self.encoders.get(name).copied()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.encoders.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.encoders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.encoders.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &'static EncoderDescriptor> + '_ {
        self.encoders.values().copied()
    }

    pub fn by_codec(&self, codec: Codec) -> Vec<&'static EncoderDescriptor> {
        self.iter().filter(|desc| desc.codec == codec).collect()
    }

    pub fn hardware_only(&self) -> Vec<&'static EncoderDescriptor> {
        self.iter().filter(|desc| desc.hardware).collect()
    }

    /// Best available encoder for `codec`.
    ///
    /// With `prefer_hardware` the vendors are walked NVIDIA > Intel > AMD > Software.
    /// Otherwise a software encoder is preferred, falling back to any match.
    pub fn best_for(&self, codec: Codec, prefer_hardware: bool) -> Option<&'static EncoderDescriptor> {
        let candidates = self.by_codec(codec);

        if prefer_hardware {
            for vendor in Vendor::PRIORITY {
                if let Some(desc) = candidates.iter().find(|desc| desc.vendor() == vendor) {
                    return Some(*desc);
                }
            }
        }

        candidates
            .iter()
            .find(|desc| !desc.hardware)
            .or_else(|| candidates.first())
            .copied()
    }
}

/// Owns the cached detection result. Nothing is probed until the first
/// `detect()`; later calls return the same result until `refresh()`.
pub struct EncoderDetector {
    probe: Box<dyn EncoderProbe + Send>,
    cache: Option<Arc<DetectionResult>>,
}

impl EncoderDetector {
    pub fn new(probe: impl EncoderProbe + Send + 'static) -> Self {
        Self {
            probe: Box::new(probe),
            cache: None,
        }
    }

    /// Detector that probes the given FFmpeg executable
    pub fn for_ffmpeg(ffmpeg: impl Into<PathBuf>) -> Self {
        Self::new(FfmpegProbe::new(ffmpeg))
    }

    pub fn detect(&mut self) -> Arc<DetectionResult> {
        if let Some(cached) = &self.cache {
            return Arc::clone(cached);
        }

        let result = Arc::new(self.run_detection());
        self.cache = Some(Arc::clone(&result));
        result
    }

    /// Drop the cached result and probe again
    pub fn refresh(&mut self) -> Arc<DetectionResult> {
        self.cache = None;
        self.detect()
    }

    pub fn is_cached(&self) -> bool {
        self.cache.is_some()
    }

    pub fn best_for(&mut self, codec: Codec, prefer_hardware: bool) -> Option<&'static EncoderDescriptor> {
        self.detect().best_for(codec, prefer_hardware)
    }

    pub fn by_codec(&mut self, codec: Codec) -> Vec<&'static EncoderDescriptor> {
        self.detect().by_codec(codec)
    }

    pub fn hardware_only(&mut self) -> Vec<&'static EncoderDescriptor> {
        self.detect().hardware_only()
    }

    fn run_detection(&self) -> DetectionResult {
        if !self.probe.engine_available() {
            error!("FFmpeg not available for encoder detection, assuming software encoders only");
            return DetectionResult::software_only(false);
        }

        let listed = match self.probe.list_encoders() {
            Ok(output) => parse_encoder_list(&output),
            Err(e) => {
                error!("Failed to list encoders: {:#}", e);
                return DetectionResult::software_only(true);
            }
        };

        let mut result = DetectionResult {
            encoders: BTreeMap::new(),
            engine_reachable: true,
            rejected: Vec::new(),
        };

        for desc in CATALOG.iter().filter(|desc| listed.contains(desc.name)) {
            if self.probe.smoke_test(desc) {
                info!(encoder = desc.name, "Detected encoder");
                result.encoders.insert(desc.name, desc);
            } else {
                debug!(encoder = desc.name, "Encoder listed but not usable");
                result.rejected.push(desc.name);
            }
        }

        if !result.contains(BASELINE_ENCODER) {
            warn!("{} not confirmed by detection, adding it as fallback", BASELINE_ENCODER);
            let desc = baseline();
            result.encoders.insert(desc.name, desc);
        }

        info!(count = result.len(), "Encoder detection complete");
        result
    }
}
