// Stanza order and audio/segment handling of the command builder

use crate::common::assertions::*;
use crate::common::helpers::*;
use screenrec::engine::{
    CaptureBackend, CaptureRect, Container, MIX_PAD, Resolution, build_args, format_command,
};
use std::path::Path;

#[test]
fn test_system_and_mic_are_mixed() {
    let mut config = command_config(CaptureBackend::Gdigrab);
    config.audio.system_enabled = true;
    config.audio.system_device = "Stereo Mix (Realtek Audio)".to_string();
    config.audio.mic_enabled = true;
    config.audio.mic_device = "Microphone (USB)".to_string();

    let args = build_args(&config, &out_path());

    assert_flag_value(&args, "-i", "audio=Stereo Mix (Realtek Audio)");
    assert_flag_value(&args, "-i", "audio=Microphone (USB)");
    assert_eq!(count_flag(&args, "dshow"), 2);
    assert_flag_value(
        &args,
        "-filter_complex",
        "[1:a][2:a]amix=inputs=2:duration=longest:dropout_transition=3,dynaudnorm=f=150:g=31[aout]",
    );
    assert_flag_value(&args, "-map", MIX_PAD);
    assert_flag_before(&args, "-filter_complex", "-map");
    assert_flag_before(&args, "-c:v", "-c:a");
    assert_flag_value(&args, "-c:a", "aac");
    assert_flag_value(&args, "-b:a", "160k");
    assert_flag_value(&args, "-ar", "48000");
    assert_flag_value(&args, "-ac", "2");
}

#[test]
fn test_mix_without_normalization() {
    let mut config = command_config(CaptureBackend::X11grab);
    config.audio.system_enabled = true;
    config.audio.system_device = "alsa_output.monitor".to_string();
    config.audio.mic_enabled = true;
    config.audio.mic_device = "alsa_input.usb".to_string();
    config.audio.normalize = false;

    let args = build_args(&config, &out_path());

    assert_flag_value(&args, "-f", "pulse");
    assert_flag_value(&args, "-i", "alsa_output.monitor");
    assert_flag_value(
        &args,
        "-filter_complex",
        "[1:a][2:a]amix=inputs=2:duration=longest:dropout_transition=3[aout]",
    );
}

#[test]
fn test_single_audio_input_maps_directly() {
    let mut config = command_config(CaptureBackend::Gdigrab);
    config.audio.system_enabled = true;
    config.audio.system_device = "Stereo Mix".to_string();

    let args = build_args(&config, &out_path());
    let cmd = args.join(" ");

    assert_cmd_not_contains(&cmd, "-filter_complex");
    assert_flag_value(&args, "-map", "1:a");
    assert_eq!(count_flag(&args, "-map"), 2);
}

#[test]
fn test_no_audio_means_no_audio_encoder() {
    let mut config = command_config(CaptureBackend::Gdigrab);
    config.audio.system_enabled = true; // still the placeholder device
    config.audio.mic_enabled = true; // no device at all

    let args = build_args(&config, &out_path());
    let cmd = args.join(" ");

    assert_cmd_not_contains(&cmd, "dshow");
    assert_cmd_not_contains(&cmd, "-c:a");
    assert_eq!(count_flag(&args, "-map"), 1);
    assert_flag_value(&args, "-map", "0:v");
}

#[test]
fn test_stanza_order() {
    let mut config = command_config(CaptureBackend::Gdigrab);
    config.source.region = Some(CaptureRect::new(0, 0, 2560, 1440));
    config.encoding.scale = Some(Resolution::new(1920, 1080));
    config.audio.system_enabled = true;
    config.audio.system_device = "Stereo Mix".to_string();
    config.output.segment_minutes = Some(10);

    let args = build_args(&config, &out_path());

    assert_flag_before(&args, "desktop", "dshow");
    assert_flag_before(&args, "dshow", "-vf");
    assert_flag_before(&args, "-vf", "-map");
    assert_flag_before(&args, "-map", "-c:v");
    assert_flag_before(&args, "-c:v", "-c:a");
    assert_flag_before(&args, "-c:a", "-movflags");
    assert_flag_before(&args, "-movflags", "-segment_time");
    assert_eq!(args.last().map(String::as_str), Some("/recordings/out.mp4"));
}

#[test]
fn test_scale_filter_only_when_size_changes() {
    let mut config = command_config(CaptureBackend::Gdigrab);
    config.source.region = Some(CaptureRect::new(0, 0, 1920, 1080));
    config.encoding.scale = Some(Resolution::new(1920, 1080));
    assert!(flag_value(&build_args(&config, &out_path()), "-vf").is_none());

    config.encoding.scale = Some(Resolution::new(1280, 720));
    assert_eq!(
        flag_value(&build_args(&config, &out_path()), "-vf"),
        Some("scale=1280:720:flags=lanczos")
    );
}

#[test]
fn test_segmentation_stanza() {
    let mut config = command_config(CaptureBackend::Gdigrab);
    config.output.container = Container::Mkv;
    config.output.segment_minutes = Some(15);

    let args = build_args(&config, Path::new("/recordings/clip_%03d.mkv"));

    assert_flag_value(&args, "-f", "segment");
    assert_flag_value(&args, "-segment_time", "900");
    assert_flag_value(&args, "-reset_timestamps", "1");
    assert_cmd_not_contains(&args.join(" "), "-movflags");
    assert_eq!(args.last().map(String::as_str), Some("/recordings/clip_%03d.mkv"));
}

#[test]
fn test_zero_segment_minutes_is_off() {
    let mut config = command_config(CaptureBackend::Gdigrab);
    config.output.segment_minutes = Some(0);
    let cmd = build_args(&config, &out_path()).join(" ");
    assert_cmd_not_contains(&cmd, "segment");
}

#[test]
fn test_movflags_only_for_mp4() {
    for (container, expected) in [
        (Container::Mp4, true),
        (Container::Mkv, false),
        (Container::Mov, false),
    ] {
        let mut config = command_config(CaptureBackend::Gdigrab);
        config.output.container = container;
        let args = build_args(&config, &out_path());
        assert_eq!(
            flag_value(&args, "-movflags") == Some("+faststart"),
            expected,
            "{:?}",
            container
        );
    }
}

#[test]
fn test_format_command_quotes_device_names() {
    let mut config = command_config(CaptureBackend::Gdigrab);
    config.audio.system_enabled = true;
    config.audio.system_device = "Stereo Mix (Realtek Audio)".to_string();

    let args = build_args(&config, &out_path());
    let line = format_command(Path::new("ffmpeg"), &args);

    let words = shlex::split(&line).unwrap();
    assert_eq!(words[0], "ffmpeg");
    assert_eq!(&words[1..], args.as_slice());
}
