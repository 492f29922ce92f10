#![allow(dead_code)]

use screenrec::engine::hardware::{EncoderDescriptor, EncoderProbe};
use screenrec::engine::process::{EngineExit, EngineProcess, ProcessLauncher};
use screenrec::engine::{CaptureBackend, RecordingConfig, RecordingSession, SessionEvent};
use std::collections::HashSet;
use std::io::{self, Cursor, Read};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc::Receiver;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// Windows-style config without audio, writing into `dir`
pub fn gdigrab_config(dir: &Path) -> RecordingConfig {
    let mut config = RecordingConfig::default();
    config.source.backend = CaptureBackend::Gdigrab;
    config.audio.system_enabled = false;
    config.output.directory = dir.to_path_buf();
    config.output.file_pattern = "clip".to_string();
    config
}

/// Config for command-building tests; the output directory is never touched
pub fn command_config(backend: CaptureBackend) -> RecordingConfig {
    let mut config = RecordingConfig::default();
    config.source.backend = backend;
    config.audio.system_enabled = false;
    config.output.directory = PathBuf::from("/recordings");
    config
}

pub fn out_path() -> PathBuf {
    PathBuf::from("/recordings/out.mp4")
}

// ============================================================================
// Fake encoder probe
// ============================================================================

/// Probe answering from fixed data and counting how often it is asked
#[derive(Clone)]
pub struct FakeProbe {
    pub available: bool,
    pub listed: Vec<&'static str>,
    pub working: HashSet<&'static str>,
    pub list_calls: Arc<AtomicUsize>,
    pub smoke_calls: Arc<AtomicUsize>,
}

impl FakeProbe {
    /// Every listed encoder passes its smoke test
    pub fn with_encoders(listed: &[&'static str]) -> Self {
        Self {
            available: true,
            listed: listed.to_vec(),
            working: listed.iter().copied().collect(),
            list_calls: Arc::new(AtomicUsize::new(0)),
            smoke_calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn unreachable() -> Self {
        Self {
            available: false,
            ..Self::with_encoders(&[])
        }
    }

    pub fn failing(mut self, encoder: &'static str) -> Self {
        self.working.remove(encoder);
        self
    }

    pub fn list_count(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }

    pub fn smoke_count(&self) -> usize {
        self.smoke_calls.load(Ordering::SeqCst)
    }
}

impl EncoderProbe for FakeProbe {
    fn engine_available(&self) -> bool {
        self.available
    }

    fn list_encoders(&self) -> anyhow::Result<String> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        let mut output = String::from("Encoders:\n V..... = Video\n ------\n");
        for name in &self.listed {
            output.push_str(&format!(" V....D {:<20} test encoder\n", name));
        }
        Ok(output)
    }

    fn smoke_test(&self, encoder: &EncoderDescriptor) -> bool {
        self.smoke_calls.fetch_add(1, Ordering::SeqCst);
        self.working.contains(encoder.name)
    }
}

// ============================================================================
// Fake engine process
// ============================================================================

/// Which stop tier makes the fake engine exit
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitsOn {
    Quit,
    Terminate,
    Kill,
}

struct EngineState {
    calls: Vec<String>,
    exit: Option<EngineExit>,
    wait_fails: bool,
}

/// Test-side handle to a fake engine owned by the session
#[derive(Clone)]
pub struct EngineHandle {
    state: Arc<Mutex<EngineState>>,
    exits_on: ExitsOn,
}

impl EngineHandle {
    fn new(exits_on: ExitsOn) -> Self {
        Self {
            state: Arc::new(Mutex::new(EngineState {
                calls: Vec::new(),
                exit: None,
                wait_fails: false,
            })),
            exits_on,
        }
    }

    /// Make the engine exit on its own
    pub fn exit_with(&self, code: i32) {
        self.state.lock().unwrap().exit = Some(EngineExit::code(code));
    }

    /// Make every later `try_wait` fail, as if the process handle went bad
    pub fn fail_wait(&self) {
        self.state.lock().unwrap().wait_fails = true;
    }

    pub fn calls(&self) -> Vec<String> {
        self.state.lock().unwrap().calls.clone()
    }

    fn record(&self, call: impl Into<String>) {
        self.state.lock().unwrap().calls.push(call.into());
    }

    fn reach(&self, tier: ExitsOn, code: i32) {
        if self.exits_on == tier {
            self.exit_with(code);
        }
    }

    fn exit(&self) -> Option<EngineExit> {
        self.state.lock().unwrap().exit
    }
}

pub struct FakeEngine {
    handle: EngineHandle,
    diagnostics: Option<Vec<u8>>,
}

impl EngineProcess for FakeEngine {
    fn id(&self) -> Option<u32> {
        Some(4242)
    }

    fn take_diagnostics(&mut self) -> Option<Box<dyn Read + Send>> {
        self.diagnostics
            .take()
            .map(|bytes| Box::new(Cursor::new(bytes)) as Box<dyn Read + Send>)
    }

    fn request_quit(&mut self) -> io::Result<()> {
        self.handle.record("quit");
        self.handle.reach(ExitsOn::Quit, 0);
        Ok(())
    }

    fn try_wait(&mut self) -> io::Result<Option<EngineExit>> {
        if self.handle.state.lock().unwrap().wait_fails {
            return Err(io::Error::other("process handle lost"));
        }
        Ok(self.handle.exit())
    }

    fn wait_timeout(&mut self, timeout: Duration) -> io::Result<Option<EngineExit>> {
        self.handle.record(format!("wait {}s", timeout.as_secs()));
        Ok(self.handle.exit())
    }

    fn terminate(&mut self) -> io::Result<()> {
        self.handle.record("terminate");
        self.handle.reach(ExitsOn::Terminate, 255);
        Ok(())
    }

    fn kill(&mut self) -> io::Result<()> {
        self.handle.record("kill");
        self.handle.state.lock().unwrap().exit = Some(EngineExit::signalled());
        Ok(())
    }
}

/// Launcher handing out [`FakeEngine`]s and remembering what it was asked to run
pub struct FakeLauncher {
    exits_on: ExitsOn,
    diagnostics: Option<Vec<u8>>,
    fail: bool,
    delay: Option<Duration>,
    handles: Mutex<Vec<EngineHandle>>,
    launches: Mutex<Vec<Vec<String>>>,
}

impl FakeLauncher {
    pub fn new(exits_on: ExitsOn) -> Arc<Self> {
        Arc::new(Self::build(exits_on, None, false))
    }

    pub fn with_diagnostics(text: &str) -> Arc<Self> {
        Arc::new(Self::build(ExitsOn::Quit, Some(text.as_bytes().to_vec()), false))
    }

    pub fn failing() -> Arc<Self> {
        Arc::new(Self::build(ExitsOn::Quit, None, true))
    }

    /// Takes `delay` to hand back each engine
    pub fn slow(delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            delay: Some(delay),
            ..Self::build(ExitsOn::Quit, None, false)
        })
    }

    fn build(exits_on: ExitsOn, diagnostics: Option<Vec<u8>>, fail: bool) -> Self {
        Self {
            exits_on,
            diagnostics,
            fail,
            delay: None,
            handles: Mutex::new(Vec::new()),
            launches: Mutex::new(Vec::new()),
        }
    }

    pub fn last_engine(&self) -> EngineHandle {
        self.handles.lock().unwrap().last().cloned().expect("nothing launched")
    }

    pub fn engine_count(&self) -> usize {
        self.handles.lock().unwrap().len()
    }

    pub fn launch_count(&self) -> usize {
        self.launches.lock().unwrap().len()
    }

    pub fn last_args(&self) -> Vec<String> {
        self.launches.lock().unwrap().last().cloned().unwrap_or_default()
    }
}

impl ProcessLauncher for FakeLauncher {
    fn launch(&self, _program: &Path, args: &[String]) -> io::Result<Box<dyn EngineProcess>> {
        self.launches.lock().unwrap().push(args.to_vec());
        if self.fail {
            return Err(io::Error::new(io::ErrorKind::NotFound, "ffmpeg not found"));
        }
        if let Some(delay) = self.delay {
            std::thread::sleep(delay);
        }
        let handle = EngineHandle::new(self.exits_on);
        self.handles.lock().unwrap().push(handle.clone());
        Ok(Box::new(FakeEngine {
            handle,
            diagnostics: self.diagnostics.clone(),
        }))
    }
}

pub fn session_with(launcher: &Arc<FakeLauncher>) -> RecordingSession {
    RecordingSession::with_launcher("ffmpeg", launcher.clone())
}

/// Pump the session until `done` holds or five seconds pass
pub fn pump_until(session: &mut RecordingSession, mut done: impl FnMut(&RecordingSession) -> bool) -> bool {
    let deadline = Instant::now() + Duration::from_secs(5);
    while Instant::now() < deadline {
        if done(session) {
            return true;
        }
        session.process_events_timeout(Duration::from_millis(50));
    }
    done(session)
}

pub fn drain(events: &Receiver<SessionEvent>) -> Vec<SessionEvent> {
    events.try_iter().collect()
}
