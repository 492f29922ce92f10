// Recording session lifecycle against a fake engine

use crate::common::helpers::*;
use screenrec::engine::{RecorderError, RecorderState, SessionEvent};
use std::fs;
use std::time::{Duration, Instant};

#[test]
fn test_start_and_graceful_stop() {
    let dir = tempfile::tempdir().unwrap();
    let launcher = FakeLauncher::new(ExitsOn::Quit);
    let mut session = session_with(&launcher);
    let events = session.subscribe();

    let output = session.start(&gdigrab_config(dir.path())).unwrap();
    assert_eq!(output, dir.path().join("clip.mp4"));
    assert_eq!(session.state(), RecorderState::Recording);
    assert_eq!(session.pid(), Some(4242));
    assert_eq!(session.stats().encoder, "libx264");
    assert_eq!(launcher.last_args().last(), Some(&output.to_string_lossy().into_owned()));

    fs::write(&output, vec![0u8; 2048]).unwrap();
    session.stop();

    assert_eq!(session.state(), RecorderState::Idle);
    assert_eq!(launcher.last_engine().calls(), vec!["quit", "wait 5s"]);
    assert_eq!(session.stats().file_size, 2048);
    assert_eq!(session.pid(), None);

    let events = drain(&events);
    let states: Vec<RecorderState> = events
        .iter()
        .filter_map(|e| match e {
            SessionEvent::StateChanged(state) => Some(*state),
            _ => None,
        })
        .collect();
    assert_eq!(
        states,
        vec![RecorderState::Recording, RecorderState::Stopping, RecorderState::Idle]
    );
    assert!(events.contains(&SessionEvent::OutputReady(output)));
}

#[test]
fn test_second_start_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let launcher = FakeLauncher::new(ExitsOn::Quit);
    let mut session = session_with(&launcher);
    let config = gdigrab_config(dir.path());

    session.start(&config).unwrap();
    let err = session.start(&config).unwrap_err();
    assert!(matches!(err, RecorderError::Busy(RecorderState::Recording)));
    assert_eq!(launcher.launch_count(), 1);
    assert_eq!(session.state(), RecorderState::Recording);

    session.stop();
}

#[test]
fn test_stop_escalates_to_kill() {
    let dir = tempfile::tempdir().unwrap();
    let launcher = FakeLauncher::new(ExitsOn::Kill);
    let mut session = session_with(&launcher);

    session.start(&gdigrab_config(dir.path())).unwrap();
    session.stop();

    assert_eq!(
        launcher.last_engine().calls(),
        vec!["quit", "wait 5s", "terminate", "wait 3s", "kill", "wait 1s"]
    );
    // A requested stop is a normal end even when the engine had to be killed
    assert_eq!(session.state(), RecorderState::Idle);
    assert!(session.last_error().is_none());
}

#[test]
fn test_stop_after_terminate() {
    let dir = tempfile::tempdir().unwrap();
    let launcher = FakeLauncher::new(ExitsOn::Terminate);
    let mut session = session_with(&launcher);

    session.start(&gdigrab_config(dir.path())).unwrap();
    session.stop();

    assert_eq!(
        launcher.last_engine().calls(),
        vec!["quit", "wait 5s", "terminate", "wait 3s"]
    );
    assert_eq!(session.state(), RecorderState::Idle);
}

#[test]
fn test_unexpected_exit_enters_error_then_restarts() {
    let dir = tempfile::tempdir().unwrap();
    let launcher = FakeLauncher::new(ExitsOn::Quit);
    let mut session = session_with(&launcher);
    let events = session.subscribe();
    let config = gdigrab_config(dir.path());

    session.start(&config).unwrap();
    launcher.last_engine().exit_with(1);

    assert!(pump_until(&mut session, |s| s.state() == RecorderState::Error));
    assert_eq!(session.last_error(), Some("FFmpeg exited with code 1"));
    assert!(
        drain(&events).contains(&SessionEvent::Error("FFmpeg exited with code 1".to_string()))
    );

    // Starting again clears the error
    session.start(&config).unwrap();
    assert_eq!(session.state(), RecorderState::Recording);
    assert!(session.last_error().is_none());
    assert_eq!(launcher.launch_count(), 2);
    session.stop();
    assert_eq!(session.state(), RecorderState::Idle);
}

#[test]
fn test_clean_exit_without_stop_is_idle() {
    let dir = tempfile::tempdir().unwrap();
    let launcher = FakeLauncher::new(ExitsOn::Quit);
    let mut session = session_with(&launcher);

    session.start(&gdigrab_config(dir.path())).unwrap();
    launcher.last_engine().exit_with(0);

    assert!(pump_until(&mut session, |s| s.state() == RecorderState::Idle));
    assert!(session.last_error().is_none());
}

#[test]
fn test_reset_only_from_error() {
    let dir = tempfile::tempdir().unwrap();
    let launcher = FakeLauncher::new(ExitsOn::Quit);
    let mut session = session_with(&launcher);
    assert!(!session.reset());

    session.start(&gdigrab_config(dir.path())).unwrap();
    assert!(!session.reset());
    launcher.last_engine().exit_with(3);
    assert!(pump_until(&mut session, |s| s.state() == RecorderState::Error));

    assert!(session.reset());
    assert_eq!(session.state(), RecorderState::Idle);
}

#[test]
fn test_stop_when_idle_is_noop() {
    let launcher = FakeLauncher::new(ExitsOn::Quit);
    let mut session = session_with(&launcher);
    let events = session.subscribe();
    session.stop();
    assert_eq!(session.state(), RecorderState::Idle);
    assert!(drain(&events).is_empty());
}

#[test]
fn test_unwritable_output_directory() {
    let dir = tempfile::tempdir().unwrap();
    let blocker = dir.path().join("file");
    fs::write(&blocker, b"").unwrap();

    let launcher = FakeLauncher::new(ExitsOn::Quit);
    let mut session = session_with(&launcher);
    let err = session.start(&gdigrab_config(&blocker)).unwrap_err();

    assert!(matches!(err, RecorderError::CreateOutputDir { .. }));
    assert_eq!(session.state(), RecorderState::Idle);
    assert_eq!(launcher.launch_count(), 0);
}

#[test]
fn test_unknown_encoder_rejected_before_launch() {
    let dir = tempfile::tempdir().unwrap();
    let launcher = FakeLauncher::new(ExitsOn::Quit);
    let mut session = session_with(&launcher);
    let mut config = gdigrab_config(dir.path());
    config.encoding.encoder = "h264_vaapi".to_string().into();

    let err = session.start(&config).unwrap_err();
    assert!(matches!(err, RecorderError::NoEncoder(ref name) if name == "h264_vaapi"));
    assert_eq!(launcher.launch_count(), 0);
}

#[test]
fn test_spawn_failure_enters_error() {
    let dir = tempfile::tempdir().unwrap();
    let launcher = FakeLauncher::failing();
    let mut session = session_with(&launcher);
    let events = session.subscribe();
    let config = gdigrab_config(dir.path());

    let err = session.start(&config).unwrap_err();
    assert!(matches!(err, RecorderError::LaunchFailed(_)));
    assert_eq!(session.state(), RecorderState::Error);
    assert_eq!(session.last_error(), Some("Failed to start FFmpeg: ffmpeg not found"));

    let events = drain(&events);
    assert!(events.contains(&SessionEvent::StateChanged(RecorderState::Error)));
    assert!(events.contains(&SessionEvent::Error(
        "Failed to start FFmpeg: ffmpeg not found".to_string()
    )));

    // The next start clears the error before trying again
    assert!(session.start(&config).is_err());
    assert_eq!(launcher.launch_count(), 2);
    assert_eq!(session.state(), RecorderState::Error);
}

#[test]
fn test_launch_timeout_stays_idle_and_kills_late_engine() {
    let dir = tempfile::tempdir().unwrap();
    let launcher = FakeLauncher::slow(Duration::from_millis(5500));
    let mut session = session_with(&launcher);
    let events = session.subscribe();

    let started = Instant::now();
    let err = session.start(&gdigrab_config(dir.path())).unwrap_err();
    assert!(matches!(err, RecorderError::LaunchTimeout(t) if t == Duration::from_secs(5)));
    assert!(started.elapsed() >= Duration::from_secs(5));
    assert_eq!(session.state(), RecorderState::Idle);
    assert!(session.pid().is_none());
    assert!(drain(&events).is_empty());

    // The engine that shows up after the deadline is killed, not adopted
    let deadline = Instant::now() + Duration::from_secs(5);
    let reaped = || launcher.engine_count() > 0 && launcher.last_engine().calls().len() == 2;
    while !reaped() {
        assert!(Instant::now() < deadline, "late engine was never killed");
        std::thread::sleep(Duration::from_millis(20));
    }
    assert_eq!(launcher.last_engine().calls(), vec!["kill", "wait 1s"]);
    assert_eq!(session.state(), RecorderState::Idle);
}

#[test]
fn test_lost_process_handle_is_a_fault() {
    let dir = tempfile::tempdir().unwrap();
    let launcher = FakeLauncher::new(ExitsOn::Quit);
    let mut session = session_with(&launcher);
    let events = session.subscribe();

    session.start(&gdigrab_config(dir.path())).unwrap();
    launcher.last_engine().fail_wait();

    assert!(pump_until(&mut session, |s| s.state() == RecorderState::Error));
    let message = "Lost track of FFmpeg process: process handle lost";
    assert_eq!(session.last_error(), Some(message));
    assert!(drain(&events).contains(&SessionEvent::Error(message.to_string())));
    assert!(session.pid().is_none());
    assert_eq!(launcher.last_engine().calls(), vec!["kill", "wait 1s"]);
}

#[test]
fn test_stats_refresh_without_engine_output() {
    let dir = tempfile::tempdir().unwrap();
    let launcher = FakeLauncher::new(ExitsOn::Quit);
    let mut session = session_with(&launcher);
    let events = session.subscribe();

    let output = session.start(&gdigrab_config(dir.path())).unwrap();
    fs::write(&output, vec![0u8; 1000]).unwrap();

    assert!(pump_until(&mut session, |s| {
        s.stats().file_size == 1000 && s.stats().elapsed > Duration::ZERO
    }));
    assert_eq!(session.stats().fps, 0.0);
    assert!(
        drain(&events)
            .iter()
            .any(|e| matches!(e, SessionEvent::Stats(stats) if stats.file_size == 1000))
    );

    session.stop();
}

#[test]
fn test_stop_after_engine_failed_keeps_error() {
    let dir = tempfile::tempdir().unwrap();
    let launcher = FakeLauncher::new(ExitsOn::Quit);
    let mut session = session_with(&launcher);
    let events = session.subscribe();
    let output = session.start(&gdigrab_config(dir.path())).unwrap();
    fs::write(&output, b"partial").unwrap();

    // The engine dies before the stop request is handled
    launcher.last_engine().exit_with(1);
    session.stop();

    assert_eq!(session.state(), RecorderState::Error);
    assert_eq!(session.last_error(), Some("FFmpeg exited with code 1"));
    assert!(launcher.last_engine().calls().is_empty());

    let events = drain(&events);
    assert!(events.contains(&SessionEvent::Error("FFmpeg exited with code 1".to_string())));
    assert!(!events.iter().any(|e| matches!(e, SessionEvent::OutputReady(_))));
}

#[test]
fn test_segments_from_earlier_recordings_are_not_reported() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("clip_007.mp4"), vec![0u8; 1000]).unwrap();
    fs::write(dir.path().join("clip_notes.mp4"), vec![0u8; 500]).unwrap();
    fs::write(dir.path().join("clipboard.mp4"), vec![0u8; 200]).unwrap();

    let launcher = FakeLauncher::new(ExitsOn::Quit);
    let mut session = session_with(&launcher);
    let events = session.subscribe();
    let mut config = gdigrab_config(dir.path());
    config.output.segment_minutes = Some(5);

    session.start(&config).unwrap();
    fs::write(dir.path().join("clip_000.mp4"), b"abc").unwrap();
    session.stop();

    let ready: Vec<_> = drain(&events)
        .into_iter()
        .filter_map(|e| match e {
            SessionEvent::OutputReady(path) => Some(path),
            _ => None,
        })
        .collect();
    assert_eq!(ready, vec![dir.path().join("clip_000.mp4")]);
    assert_eq!(session.stats().file_size, 3);
}

#[test]
fn test_telemetry_reaches_stats() {
    let dir = tempfile::tempdir().unwrap();
    let launcher = FakeLauncher::with_diagnostics(
        "Press [q] to stop, [?] for help\n\
         frame=  120 fps= 59.9 q=23.0 size=    2048kB time=00:00:02.00 bitrate=8388.6kbits/s dup=0 drop=2 speed=1x\r",
    );
    let mut session = session_with(&launcher);
    let events = session.subscribe();

    session.start(&gdigrab_config(dir.path())).unwrap();
    assert!(pump_until(&mut session, |s| s.stats().dropped_frames == 2));

    let stats = session.stats();
    assert_eq!(stats.fps, 59.9);
    assert_eq!(stats.bitrate_kbps, 8388.6);

    let events = drain(&events);
    assert!(events.contains(&SessionEvent::Log("Press [q] to stop, [?] for help".to_string())));
    assert!(events.iter().any(|e| matches!(e, SessionEvent::Stats(_))));

    session.stop();
}

#[test]
fn test_segmented_recording_reports_every_segment() {
    let dir = tempfile::tempdir().unwrap();
    let launcher = FakeLauncher::new(ExitsOn::Quit);
    let mut session = session_with(&launcher);
    let events = session.subscribe();
    let mut config = gdigrab_config(dir.path());
    config.output.segment_minutes = Some(5);

    let output = session.start(&config).unwrap();
    assert_eq!(output, dir.path().join("clip_%03d.mp4"));
    assert!(launcher.last_args().contains(&"300".to_string()));

    fs::write(dir.path().join("clip_000.mp4"), b"abc").unwrap();
    fs::write(dir.path().join("clip_001.mp4"), b"de").unwrap();
    session.stop();

    let ready: Vec<_> = drain(&events)
        .into_iter()
        .filter_map(|e| match e {
            SessionEvent::OutputReady(path) => Some(path),
            _ => None,
        })
        .collect();
    assert_eq!(
        ready,
        vec![dir.path().join("clip_000.mp4"), dir.path().join("clip_001.mp4")]
    );
    assert_eq!(session.stats().file_size, 5);
}
