use crate::cli::{Cli, Commands, RecordOptions};
use anyhow::{Context, Result, bail};
use chrono::Local;
use screenrec::config::Config;
use screenrec::stats::{format_bytes, format_duration};
use screenrec::engine::{
    self, Codec, EncoderDescriptor, EncoderDetector, EncoderSelection, Preset, RecorderState,
    RecordingConfig, RecordingSession, SessionEvent,
};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::process;
use std::sync::mpsc::{self, Receiver};
use std::thread;
use std::time::{Duration, Instant};
use tracing::{info, warn};

/// `--system-audio` value that turns system audio off
const AUDIO_OFF: &str = "none";

const STATUS_INTERVAL: Duration = Duration::from_secs(1);
const EVENT_WAIT: Duration = Duration::from_millis(200);

pub fn run(cli: Cli) {
    if let Some(path) = engine::init_logging(cli.verbose, cli.log_stderr) {
        info!("Logging to {}", path.display());
    }

    // Commands that never touch FFmpeg
    match cli.command {
        Commands::InitConfig => return handle_init_config(),
        Commands::Presets => return handle_presets(),
        _ => {}
    }

    let config = Config::load().unwrap_or_else(|e| {
        eprintln!("Warning: {:#}", e);
        eprintln!("Using built-in defaults.");
        Config::default()
    });

    let override_path = cli.ffmpeg.as_deref().or(config.engine.ffmpeg_path.as_deref());
    let Some(ffmpeg) = engine::locate_ffmpeg(override_path) else {
        eprintln!("Error: FFmpeg not found. Install it or set engine.ffmpeg_path in the config.");
        process::exit(1);
    };
    info!("Using FFmpeg at {}", ffmpeg.display());

    match cli.command {
        Commands::CheckFfmpeg => handle_check_ffmpeg(&ffmpeg),
        Commands::Encoders { refresh, json } => handle_encoders(&ffmpeg, refresh, json),
        Commands::DryRun { options } => handle_dry_run(&ffmpeg, &config, &options),
        Commands::Record { options, duration } => {
            handle_record(&ffmpeg, config, &options, duration)
        }
        Commands::InitConfig | Commands::Presets => {}
    }
}

fn handle_check_ffmpeg(ffmpeg: &Path) {
    match engine::ffmpeg_version(ffmpeg) {
        Ok(version) => {
            println!("ffmpeg found: {}", version);
            println!("Location: {}", ffmpeg.display());
        }
        Err(e) => {
            eprintln!("Error: {:#}", e);
            process::exit(1);
        }
    }
}

fn handle_encoders(ffmpeg: &Path, refresh: bool, json: bool) {
    let mut detector = EncoderDetector::for_ffmpeg(ffmpeg);
    let result = if refresh {
        detector.refresh()
    } else {
        detector.detect()
    };

    if json {
        match serde_json::to_string_pretty(&*result) {
            Ok(text) => println!("{}", text),
            Err(e) => {
                eprintln!("Error: failed to serialize detection result: {}", e);
                process::exit(1);
            }
        }
        return;
    }

    if !result.engine_reachable {
        println!("FFmpeg could not be run; assuming software encoders only.");
    }
    println!("Available encoders:");
    for desc in result.iter() {
        println!(
            "  {:<12} {:<16} {}",
            desc.name,
            desc.display_name(),
            if desc.hardware { "hardware" } else { "software" }
        );
    }
    if !result.rejected.is_empty() {
        println!("Listed but not usable: {}", result.rejected.join(", "));
    }
}

fn handle_presets() {
    for preset in Preset::builtin() {
        println!(
            "{:<20} {} @ {}fps, {} {} {}kbps",
            preset.name,
            preset.scale,
            preset.fps,
            preset.encoder,
            preset.rate_control,
            preset.bitrate_kbps
        );
    }
}

fn handle_dry_run(ffmpeg: &Path, config: &Config, options: &RecordOptions) {
    let recording = recording_config_or_exit(ffmpeg, config, options);
    let output = engine::output_path(&recording, Local::now().naive_local());
    let args = engine::build_args(&recording, &output);
    println!("{}", engine::format_command(ffmpeg, &args));
}

fn handle_record(ffmpeg: &Path, mut config: Config, options: &RecordOptions, duration: Option<u64>) {
    let recording = recording_config_or_exit(ffmpeg, &config, options);

    let mut session = RecordingSession::new(ffmpeg);
    let events = session.subscribe();

    let output = match session.start(&recording) {
        Ok(output) => output,
        Err(e) => {
            eprintln!("Error: {}", e);
            process::exit(1);
        }
    };

    println!("Recording to {}", output.display());
    match duration {
        Some(secs) => println!("Press Enter to stop (stopping automatically after {}s)", secs),
        None => println!("Press Enter to stop"),
    }

    let stop_requests = spawn_enter_listener();
    let limit = duration.map(Duration::from_secs);
    let started = Instant::now();
    let mut last_status = Instant::now();
    let mut saved = Vec::new();

    loop {
        session.process_events_timeout(EVENT_WAIT);
        drain_events(&events, &mut saved);

        if session.state() != RecorderState::Recording {
            break;
        }

        let time_up = limit.is_some_and(|limit| started.elapsed() >= limit);
        if stop_requests.try_recv().is_ok() || time_up {
            println!();
            println!("Stopping...");
            session.stop();
            drain_events(&events, &mut saved);
            break;
        }

        if last_status.elapsed() >= STATUS_INTERVAL {
            print!("\r{}", session.stats().status_line());
            let _ = io::stdout().flush();
            last_status = Instant::now();
        }
    }
    println!();

    let stats = session.stats();
    println!(
        "Recorded {} ({})",
        format_duration(stats.elapsed.as_secs_f64()),
        format_bytes(stats.file_size)
    );

    for path in &saved {
        println!("Saved: {}", path.display());
        config.history.add_recent_file(path.clone());
    }
    if !saved.is_empty() {
        if let Err(e) = config.save() {
            warn!("Failed to update recent files: {:#}", e);
        }
    }

    if session.state() == RecorderState::Error {
        eprintln!(
            "Error: {}",
            session.last_error().unwrap_or("recording failed")
        );
        process::exit(1);
    }
}

/// Fires once when a line is read from stdin. EOF never fires, so a closed
/// stdin leaves `--duration` in charge.
fn spawn_enter_listener() -> Receiver<()> {
    let (tx, rx) = mpsc::channel();
    thread::spawn(move || {
        let mut line = String::new();
        if let Ok(n) = io::stdin().read_line(&mut line) {
            if n > 0 {
                let _ = tx.send(());
            }
        }
    });
    rx
}

fn drain_events(events: &Receiver<SessionEvent>, saved: &mut Vec<PathBuf>) {
    for event in events.try_iter() {
        match event {
            SessionEvent::OutputReady(path) => saved.push(path),
            SessionEvent::Error(message) => eprintln!("\nError: {}", message),
            SessionEvent::StateChanged(state) => info!("Recorder state: {}", state),
            SessionEvent::Stats(_) | SessionEvent::Log(_) => {}
        }
    }
}

fn recording_config_or_exit(ffmpeg: &Path, config: &Config, options: &RecordOptions) -> RecordingConfig {
    let prefer_hardware = if options.hw {
        true
    } else if options.software {
        false
    } else {
        config.engine.prefer_hardware
    };

    let mut detector = EncoderDetector::for_ffmpeg(ffmpeg);
    let pick = |codec: Codec| detector.best_for(codec, prefer_hardware);

    match build_recording_config(&config.recording, options, pick) {
        Ok(recording) => recording,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            process::exit(1);
        }
    }
}

/// Layer the command-line options over `base`. `pick` chooses an encoder
/// when a codec is requested instead of an encoder name.
fn build_recording_config<F>(base: &RecordingConfig, options: &RecordOptions, pick: F) -> Result<RecordingConfig>
where
    F: FnOnce(Codec) -> Option<&'static EncoderDescriptor>,
{
    let mut config = base.clone();

    if let Some(name) = &options.preset_name {
        let preset = Preset::get(name).with_context(|| format!("Unknown preset '{}'", name))?;
        preset.apply(&mut config);
    }

    let source = &mut config.source;
    if let Some(fps) = options.fps {
        if fps == 0 {
            bail!("Frame rate must be at least 1");
        }
        source.fps = fps;
    }
    if options.region.is_some() {
        source.region = options.region;
    }
    if let Some(monitor) = options.monitor {
        source.monitor_index = monitor;
    }
    if options.no_cursor {
        source.show_cursor = false;
    }

    let encoding = &mut config.encoding;
    if let Some(name) = &options.encoder {
        encoding.encoder = EncoderSelection::Named(name.clone());
    } else if let Some(codec) = options.codec {
        let desc = pick(codec).with_context(|| format!("No usable encoder for {}", codec))?;
        encoding.encoder = desc.into();
    }
    if config.encoder().is_none() {
        bail!("Unknown encoder '{}'", config.encoding.encoder.name());
    }

    let encoding = &mut config.encoding;
    if let Some(rate_control) = options.rate_control {
        encoding.rate_control = rate_control;
    }
    if let Some(bitrate) = options.bitrate {
        encoding.bitrate_kbps = bitrate;
        encoding.max_bitrate_kbps = bitrate;
        encoding.buffer_size_kbps = bitrate.saturating_mul(2);
    }
    if let Some(crf) = options.crf {
        encoding.quality = crf;
    }
    if let Some(preset) = &options.preset {
        encoding.preset = preset.clone();
    }
    if options.scale.is_some() {
        encoding.scale = options.scale;
    }

    let audio = &mut config.audio;
    match options.system_audio.as_deref() {
        Some(device) if device.eq_ignore_ascii_case(AUDIO_OFF) => audio.system_enabled = false,
        Some(device) => {
            audio.system_enabled = true;
            audio.system_device = device.to_string();
        }
        None => {}
    }
    if let Some(device) = &options.mic {
        audio.mic_enabled = true;
        audio.mic_device = device.clone();
    }

    let output = &mut config.output;
    if let Some(container) = options.container {
        output.container = container;
    }
    if let Some(dir) = &options.output_dir {
        output.directory = dir.clone();
    }
    if let Some(pattern) = &options.pattern {
        output.file_pattern = pattern.clone();
    }
    if options.segment_minutes.is_some() {
        output.segment_minutes = options.segment_minutes;
    }

    Ok(config)
}

fn handle_init_config() {
    match Config::config_path() {
        Ok(path) if path.exists() => match Config::load_from(&path) {
            Ok(cfg) => {
                println!("Config loaded successfully from {}", path.display());
                println!("{:#?}", cfg);
            }
            Err(e) => {
                eprintln!("Config invalid: {:#}", e);
                process::exit(1);
            }
        },
        Ok(path) => {
            println!("Creating default config...");
            if let Err(e) = Config::ensure_default() {
                eprintln!("Failed to save default config: {:#}", e);
                process::exit(1);
            }
            println!("Default config saved to {}", path.display());
        }
        Err(e) => {
            eprintln!("Error: {:#}", e);
            process::exit(1);
        }
    }
}
