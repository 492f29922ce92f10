//! Recording session: owns one FFmpeg process and its state machine.
//!
//! Idle -> Recording -> Stopping -> Idle, with Error on abnormal exit or a
//! process fault. Three background threads run per recording:
//! - supervisor: owns the process handle, waits for exit, runs stop escalation
//! - reader: splits stderr into lines and parses telemetry
//! - poller: ticks once a second with output size and elapsed time
//!
//! Background threads never touch session state. They post messages tagged
//! with the run id, and the session applies them in [`RecordingSession::process_events`].

use chrono::Local;
use std::collections::HashMap;
use std::fs;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::{Arc, Weak};
use std::thread;
use std::time::{Duration, Instant, SystemTime};
use thiserror::Error;
use tracing::{debug, error, info, warn};
use uuid::Uuid;
use walkdir::WalkDir;

use crate::engine::core::{
    RecorderState, RecordingConfig, SharedState, TelemetryUpdate, build_args, format_command,
    is_segment_name, output_path, parse_chunk, segment_prefix, split_lines,
};
use crate::engine::process::{
    self, EngineExit, EngineProcess, GRACEFUL_STOP_TIMEOUT, KILL_REAP_TIMEOUT, ProcessLauncher,
    SystemLauncher, TERMINATE_TIMEOUT,
};
use crate::stats::RecorderStats;

/// How long the engine gets to report that it started
pub const LAUNCH_TIMEOUT: Duration = Duration::from_secs(5);

/// Stats poller cadence
pub const POLL_INTERVAL: Duration = Duration::from_secs(1);

/// How often the supervisor checks for exit between control messages
const EXIT_POLL_INTERVAL: Duration = Duration::from_millis(100);

const WRITE_PROBE_NAME: &str = ".screenrec_write_test";

const READ_CHUNK_SIZE: usize = 4096;

#[derive(Debug, Error)]
pub enum RecorderError {
    #[error("Cannot start recording while {0}")]
    Busy(RecorderState),

    #[error("Output directory {} is not writable: {source}", .path.display())]
    OutputNotWritable {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Encoder '{0}' is not known")]
    NoEncoder(String),

    #[error("Failed to create output directory {}: {source}", .path.display())]
    CreateOutputDir {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Failed to start FFmpeg: {0}")]
    LaunchFailed(#[source] io::Error),

    #[error("FFmpeg did not start within {0:?}")]
    LaunchTimeout(Duration),
}

/// Notifications for observers (UI, CLI)
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    StateChanged(RecorderState),
    Stats(RecorderStats),
    /// Raw engine diagnostic line
    Log(String),
    /// Runtime fault or abnormal exit
    Error(String),
    /// A finished output file on disk (one per segment)
    OutputReady(PathBuf),
}

enum Control {
    Stop,
}

#[derive(Debug)]
enum SessionMessage {
    Telemetry(TelemetryUpdate),
    Tick { elapsed: Duration, file_size: u64 },
    Log(String),
    Exited { exit: EngineExit, stop_requested: bool },
    Fault(String),
}

#[derive(Debug)]
struct Envelope {
    run: Uuid,
    message: SessionMessage,
}

/// Bookkeeping for the process currently attached to the session
struct ActiveRun {
    id: Uuid,
    control: Sender<Control>,
    output: PathBuf,
    prior: PriorSegments,
    pid: Option<u32>,
    /// Poller exits once this is dropped
    _alive: Arc<()>,
}

pub struct RecordingSession {
    program: PathBuf,
    launcher: Arc<dyn ProcessLauncher>,
    state: SharedState,
    stats: RecorderStats,
    run: Option<ActiveRun>,
    tx: Sender<Envelope>,
    rx: Receiver<Envelope>,
    observers: Vec<Sender<SessionEvent>>,
    last_output: Option<PathBuf>,
    last_error: Option<String>,
}

impl RecordingSession {
    /// Session that spawns `ffmpeg` as a real child process
    pub fn new(ffmpeg: impl Into<PathBuf>) -> Self {
        Self::with_launcher(ffmpeg, Arc::new(SystemLauncher))
    }

    pub fn with_launcher(program: impl Into<PathBuf>, launcher: Arc<dyn ProcessLauncher>) -> Self {
        let (tx, rx) = mpsc::channel();
        Self {
            program: program.into(),
            launcher,
            state: SharedState::new(RecorderState::Idle),
            stats: RecorderStats::default(),
            run: None,
            tx,
            rx,
            observers: Vec::new(),
            last_output: None,
            last_error: None,
        }
    }

    pub fn state(&self) -> RecorderState {
        self.state.get()
    }

    pub fn stats(&self) -> &RecorderStats {
        &self.stats
    }

    /// Output path of the current or most recent recording
    pub fn output_path(&self) -> Option<&Path> {
        self.last_output.as_deref()
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    /// PID of the running engine process, if any
    pub fn pid(&self) -> Option<u32> {
        self.run.as_ref().and_then(|run| run.pid)
    }

    /// Register an observer. Events are delivered while the session is
    /// pumped via [`process_events`](Self::process_events).
    pub fn subscribe(&mut self) -> Receiver<SessionEvent> {
        let (tx, rx) = mpsc::channel();
        self.observers.push(tx);
        rx
    }

    /// Start recording with `config`. Returns the output path (a `%03d`
    /// pattern when segmenting).
    pub fn start(&mut self, config: &RecordingConfig) -> Result<PathBuf, RecorderError> {
        match self.state.get() {
            RecorderState::Error => {
                info!("Reset recorder from error state");
                self.reset();
            }
            RecorderState::Idle => {}
            busy => {
                warn!("Cannot start recording in state {}", busy);
                return Err(RecorderError::Busy(busy));
            }
        }

        let encoder = config
            .encoder()
            .ok_or_else(|| RecorderError::NoEncoder(config.encoding.encoder.name().to_string()))?;
        if !encoder.supports(config.encoding.rate_control) {
            warn!(
                encoder = encoder.name,
                rate_control = %config.encoding.rate_control,
                "Rate control not supported by encoder, flags may be ignored"
            );
        }

        let directory = &config.output.directory;
        ensure_writable(directory)?;

        let output = output_path(config, Local::now().naive_local());
        if let Some(parent) = output.parent() {
            fs::create_dir_all(parent).map_err(|source| RecorderError::CreateOutputDir {
                path: parent.to_path_buf(),
                source,
            })?;
        }

        let prior = PriorSegments::scan(&output);
        let args = build_args(config, &output);
        info!("FFmpeg command: {}", format_command(&self.program, &args));

        let mut process = self.launch(args)?;
        let pid = process.id();

        let id = Uuid::new_v4();
        let alive = Arc::new(());
        let (control_tx, control_rx) = mpsc::channel();

        if let Some(stream) = process.take_diagnostics() {
            let tx = self.tx.clone();
            thread::spawn(move || read_diagnostics(stream, id, tx));
        } else {
            debug!("Engine process has no diagnostic stream, telemetry disabled");
        }

        let tx = self.tx.clone();
        thread::spawn(move || supervise(process, control_rx, id, tx));

        self.run = Some(ActiveRun {
            id,
            control: control_tx,
            output: output.clone(),
            prior: prior.clone(),
            pid,
            _alive: Arc::clone(&alive),
        });
        self.stats = RecorderStats::new(encoder.name);
        self.last_output = Some(output.clone());
        self.last_error = None;
        self.set_state(RecorderState::Recording);

        let poller = Poller {
            state: self.state.clone(),
            alive: Arc::downgrade(&alive),
            output: output.clone(),
            prior,
            started: Instant::now(),
            run: id,
            tx: self.tx.clone(),
        };
        thread::spawn(move || poller.run());

        info!(pid = ?pid, "Recording started: {}", output.display());
        Ok(output)
    }

    /// Spawn the engine on a helper thread and wait up to [`LAUNCH_TIMEOUT`].
    ///
    /// A spawn error is a process fault and moves the session to Error. A
    /// timeout leaves it Idle.
    fn launch(&mut self, args: Vec<String>) -> Result<Box<dyn EngineProcess>, RecorderError> {
        let (tx, rx) = mpsc::channel();
        let launcher = Arc::clone(&self.launcher);
        let program = self.program.clone();

        thread::spawn(move || {
            let result = launcher.launch(&program, &args);
            if let Err(mpsc::SendError(Ok(mut late))) = tx.send(result) {
                warn!("Engine started after the launch timeout, killing it");
                let _ = late.kill();
                let _ = late.wait_timeout(KILL_REAP_TIMEOUT);
            }
        });

        let spawn_error = match rx.recv_timeout(LAUNCH_TIMEOUT) {
            Ok(Ok(process)) => return Ok(process),
            Ok(Err(e)) => e,
            Err(RecvTimeoutError::Timeout) => {
                error!("FFmpeg did not start within {:?}", LAUNCH_TIMEOUT);
                return Err(RecorderError::LaunchTimeout(LAUNCH_TIMEOUT));
            }
            Err(RecvTimeoutError::Disconnected) => {
                io::Error::other("process launcher exited without a result")
            }
        };

        self.fail(format!("Failed to start FFmpeg: {}", spawn_error));
        Err(RecorderError::LaunchFailed(spawn_error))
    }

    /// Stop the current recording.
    ///
    /// Blocks until the engine exits: quit byte, then terminate after 5s,
    /// then kill after 3s more.
    pub fn stop(&mut self) {
        let state = self.state.get();
        if state != RecorderState::Recording {
            warn!("Cannot stop recording in state {}", state);
            return;
        }
        let Some(run) = self.run.as_ref() else {
            warn!("Recording state without an engine process");
            return;
        };

        // A send failure means the supervisor already exited; its Exited
        // message is waiting in the queue.
        let _ = run.control.send(Control::Stop);
        self.set_state(RecorderState::Stopping);

        let budget = GRACEFUL_STOP_TIMEOUT + TERMINATE_TIMEOUT + KILL_REAP_TIMEOUT + POLL_INTERVAL;
        let deadline = Instant::now() + budget;
        while self.run.is_some() {
            let now = Instant::now();
            if now >= deadline {
                warn!("Engine exit not confirmed after {:?}", budget);
                break;
            }
            self.process_events_timeout(deadline - now);
        }
    }

    /// Leave the Error state. Ignored in any other state.
    pub fn reset(&mut self) -> bool {
        if self.state.get() != RecorderState::Error {
            return false;
        }
        self.set_state(RecorderState::Idle);
        true
    }

    /// Apply everything the background threads have posted so far.
    /// Returns the number of messages handled.
    pub fn process_events(&mut self) -> usize {
        let mut handled = 0;
        while let Ok(envelope) = self.rx.try_recv() {
            self.handle(envelope);
            handled += 1;
        }
        handled
    }

    /// Like [`process_events`](Self::process_events), but waits up to
    /// `timeout` for the first message.
    pub fn process_events_timeout(&mut self, timeout: Duration) -> usize {
        match self.rx.recv_timeout(timeout) {
            Ok(envelope) => {
                self.handle(envelope);
                1 + self.process_events()
            }
            Err(_) => 0,
        }
    }

    fn handle(&mut self, envelope: Envelope) {
        let Some(run) = self.run.as_ref() else {
            return;
        };
        if envelope.run != run.id {
            debug!(run = %envelope.run, "Dropping message from a previous recording");
            return;
        }

        match envelope.message {
            SessionMessage::Telemetry(update) => {
                self.stats.apply(&update);
                self.emit(SessionEvent::Stats(self.stats.clone()));
            }
            SessionMessage::Tick { elapsed, file_size } => {
                self.stats.elapsed = elapsed;
                self.stats.file_size = file_size;
                self.emit(SessionEvent::Stats(self.stats.clone()));
            }
            SessionMessage::Log(line) => self.emit(SessionEvent::Log(line)),
            SessionMessage::Exited {
                exit,
                stop_requested,
            } => self.finish(exit, stop_requested),
            SessionMessage::Fault(message) => {
                self.run = None;
                self.fail(message);
            }
        }
    }

    fn finish(&mut self, exit: EngineExit, stop_requested: bool) {
        let Some(run) = self.run.take() else {
            return;
        };
        info!("Recording finished with code {:?}", exit.code);

        if exit.success() || stop_requested {
            let outputs = collect_outputs(&run.output, &run.prior);
            self.stats.file_size = outputs.iter().map(|path| file_size(path)).sum();
            self.set_state(RecorderState::Idle);
            for path in outputs {
                info!("Recording saved: {}", path.display());
                self.emit(SessionEvent::OutputReady(path));
            }
        } else {
            let message = match exit.code {
                Some(code) => format!("FFmpeg exited with code {}", code),
                None => "FFmpeg was terminated by a signal".to_string(),
            };
            self.fail(message);
        }
    }

    fn fail(&mut self, message: String) {
        error!("{}", message);
        self.last_error = Some(message.clone());
        self.set_state(RecorderState::Error);
        self.emit(SessionEvent::Error(message));
    }

    fn set_state(&mut self, state: RecorderState) {
        if self.state.get() == state {
            return;
        }
        debug!("Recorder state -> {}", state);
        self.state.set(state);
        self.emit(SessionEvent::StateChanged(state));
    }

    fn emit(&mut self, event: SessionEvent) {
        self.observers.retain(|tx| tx.send(event.clone()).is_ok());
    }
}

impl Drop for RecordingSession {
    fn drop(&mut self) {
        // Dropping the control sender makes the supervisor run stop escalation
        if let Some(run) = self.run.take() {
            warn!("Recording session dropped while recording {}", run.output.display());
        }
    }
}

/// Create `dir` if needed and prove we can write to it
fn ensure_writable(dir: &Path) -> Result<(), RecorderError> {
    fs::create_dir_all(dir).map_err(|source| RecorderError::CreateOutputDir {
        path: dir.to_path_buf(),
        source,
    })?;

    let probe = dir.join(WRITE_PROBE_NAME);
    fs::write(&probe, b"")
        .and_then(|_| fs::remove_file(&probe))
        .map_err(|source| RecorderError::OutputNotWritable {
            path: dir.to_path_buf(),
            source,
        })
}

fn file_size(path: &Path) -> u64 {
    fs::metadata(path).map(|meta| meta.len()).unwrap_or(0)
}

/// Segment files that were on disk before a run started, keyed by path with
/// their modification time and length
#[derive(Debug, Clone, Default)]
pub struct PriorSegments(HashMap<PathBuf, (Option<SystemTime>, u64)>);

impl PriorSegments {
    /// Snapshot the segments of `output` already present. Empty when `output`
    /// is not a segment pattern.
    pub fn scan(output: &Path) -> Self {
        Self(
            segment_files(output)
                .into_iter()
                .map(|path| {
                    let stamp = file_stamp(&path);
                    (path, stamp)
                })
                .collect(),
        )
    }

    /// Present before the run and not rewritten since
    fn unchanged(&self, path: &Path) -> bool {
        self.0.get(path).is_some_and(|before| *before == file_stamp(path))
    }
}

fn file_stamp(path: &Path) -> (Option<SystemTime>, u64) {
    match fs::metadata(path) {
        Ok(meta) => (meta.modified().ok(), meta.len()),
        Err(_) => (None, 0),
    }
}

/// Every `<prefix><digits>.<ext>` file next to a segment pattern, sorted
fn segment_files(output: &Path) -> Vec<PathBuf> {
    let (Some(prefix), Some(dir), Some(extension)) = (
        segment_prefix(output),
        output.parent(),
        output.extension().and_then(|ext| ext.to_str()),
    ) else {
        return Vec::new();
    };

    let mut segments: Vec<PathBuf> = WalkDir::new(dir)
        .min_depth(1)
        .max_depth(1)
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file())
        .filter(|entry| {
            entry
                .file_name()
                .to_str()
                .is_some_and(|name| is_segment_name(name, &prefix, extension))
        })
        .map(|entry| entry.into_path())
        .collect();
    segments.sort();
    segments
}

/// Files produced for `output` by the current run: the file itself, or every
/// segment when the name carries the `%03d` placeholder. Segments listed in
/// `prior` and left untouched are not part of this run.
pub fn collect_outputs(output: &Path, prior: &PriorSegments) -> Vec<PathBuf> {
    if segment_prefix(output).is_none() {
        return if output.is_file() {
            vec![output.to_path_buf()]
        } else {
            Vec::new()
        };
    }

    segment_files(output)
        .into_iter()
        .filter(|path| !prior.unchanged(path))
        .collect()
}

fn output_size(output: &Path, prior: &PriorSegments) -> u64 {
    collect_outputs(output, prior)
        .iter()
        .map(|path| file_size(path))
        .sum()
}

/// Owns the process until it exits. A dropped control channel counts as a stop.
fn supervise(
    mut process: Box<dyn EngineProcess>,
    control: Receiver<Control>,
    run: Uuid,
    tx: Sender<Envelope>,
) {
    let mut stop_requested = false;

    let exit = loop {
        match control.recv_timeout(EXIT_POLL_INTERVAL) {
            Ok(Control::Stop) | Err(RecvTimeoutError::Disconnected) => {
                // Already gone on its own: report that exit, not the stop
                if let Ok(Some(exit)) = process.try_wait() {
                    break exit;
                }
                stop_requested = true;
                break process::escalate_stop(process.as_mut());
            }
            Err(RecvTimeoutError::Timeout) => {}
        }

        match process.try_wait() {
            Ok(Some(exit)) => break exit,
            Ok(None) => {}
            Err(e) => {
                let _ = process.kill();
                let _ = process.wait_timeout(KILL_REAP_TIMEOUT);
                let _ = tx.send(Envelope {
                    run,
                    message: SessionMessage::Fault(format!("Lost track of FFmpeg process: {}", e)),
                });
                return;
            }
        }
    };

    let _ = tx.send(Envelope {
        run,
        message: SessionMessage::Exited {
            exit,
            stop_requested,
        },
    });
}

/// Forward stderr line by line and post telemetry for each chunk read
fn read_diagnostics(mut stream: Box<dyn Read + Send>, run: Uuid, tx: Sender<Envelope>) {
    let mut buf = [0u8; READ_CHUNK_SIZE];
    let mut pending: Vec<u8> = Vec::new();

    loop {
        let n = match stream.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => {
                debug!("Engine diagnostic stream closed: {}", e);
                break;
            }
        };
        pending.extend_from_slice(&buf[..n]);

        // Keep an unterminated tail for the next read
        let Some(end) = pending.iter().rposition(|b| *b == b'\r' || *b == b'\n') else {
            continue;
        };
        let complete: Vec<u8> = pending.drain(..=end).collect();
        if !forward_diagnostics(&String::from_utf8_lossy(&complete), run, &tx) {
            return;
        }
    }

    if !pending.is_empty() {
        forward_diagnostics(&String::from_utf8_lossy(&pending), run, &tx);
    }
}

/// Returns false once the session is gone
fn forward_diagnostics(text: &str, run: Uuid, tx: &Sender<Envelope>) -> bool {
    for line in split_lines(text) {
        let line = line.trim_end();
        debug!(target: "engine", "{}", line);
        let sent = tx.send(Envelope {
            run,
            message: SessionMessage::Log(line.to_string()),
        });
        if sent.is_err() {
            return false;
        }
    }

    let update = parse_chunk(text);
    if update.is_empty() {
        return true;
    }
    tx.send(Envelope {
        run,
        message: SessionMessage::Telemetry(update),
    })
    .is_ok()
}

/// Once-a-second stats refresh, independent of telemetry
struct Poller {
    state: SharedState,
    alive: Weak<()>,
    output: PathBuf,
    prior: PriorSegments,
    started: Instant,
    run: Uuid,
    tx: Sender<Envelope>,
}

impl Poller {
    fn run(self) {
        while self.state.get() == RecorderState::Recording && self.alive.strong_count() > 0 {
            let tick = SessionMessage::Tick {
                elapsed: self.started.elapsed(),
                file_size: output_size(&self.output, &self.prior),
            };
            if self.tx.send(Envelope { run: self.run, message: tick }).is_err() {
                break;
            }
            thread::sleep(POLL_INTERVAL);
        }
    }
}
