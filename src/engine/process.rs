//! Process handle abstraction for the engine child process.
//!
//! The session never touches `std::process::Child` directly; it goes through
//! [`EngineProcess`] so shutdown escalation can be driven against fakes.

use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread;
use std::time::{Duration, Instant};
use tracing::{info, warn};

/// Byte FFmpeg reads on stdin as "finish the file and exit"
pub const GRACEFUL_QUIT: &[u8] = b"q";

pub const GRACEFUL_STOP_TIMEOUT: Duration = Duration::from_secs(5);
pub const TERMINATE_TIMEOUT: Duration = Duration::from_secs(3);
/// How long to wait for the OS to reap the process after a kill
pub const KILL_REAP_TIMEOUT: Duration = Duration::from_secs(1);

const WAIT_POLL_INTERVAL: Duration = Duration::from_millis(25);

/// How the engine process ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineExit {
    /// Exit code; `None` when the process was ended by a signal
    pub code: Option<i32>,
}

impl EngineExit {
    pub fn code(code: i32) -> Self {
        Self { code: Some(code) }
    }

    pub fn signalled() -> Self {
        Self { code: None }
    }

    pub fn success(&self) -> bool {
        self.code == Some(0)
    }
}

impl From<ExitStatus> for EngineExit {
    fn from(status: ExitStatus) -> Self {
        Self {
            code: status.code(),
        }
    }
}

/// A running engine process
pub trait EngineProcess: Send {
    fn id(&self) -> Option<u32>;

    /// Hand over the diagnostic (stderr) stream; `None` after the first call
    fn take_diagnostics(&mut self) -> Option<Box<dyn Read + Send>>;

    /// Write the graceful-quit byte to stdin. Fails if stdin isn't writable.
    fn request_quit(&mut self) -> io::Result<()>;

    fn try_wait(&mut self) -> io::Result<Option<EngineExit>>;

    /// Block until exit or `timeout`; `Ok(None)` if still running
    fn wait_timeout(&mut self, timeout: Duration) -> io::Result<Option<EngineExit>>;

    /// Polite OS-level termination (SIGTERM on unix)
    fn terminate(&mut self) -> io::Result<()>;

    fn kill(&mut self) -> io::Result<()>;
}

/// Starts engine processes
pub trait ProcessLauncher: Send + Sync {
    fn launch(&self, program: &Path, args: &[String]) -> io::Result<Box<dyn EngineProcess>>;
}

/// Launcher that spawns real child processes
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemLauncher;

impl ProcessLauncher for SystemLauncher {
    fn launch(&self, program: &Path, args: &[String]) -> io::Result<Box<dyn EngineProcess>> {
        let child = Command::new(program)
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()?;

        Ok(Box::new(ChildProcess::new(child)))
    }
}

/// [`EngineProcess`] over a `std::process::Child`
pub struct ChildProcess {
    child: Child,
}

impl ChildProcess {
    pub fn new(child: Child) -> Self {
        Self { child }
    }
}

impl EngineProcess for ChildProcess {
    fn id(&self) -> Option<u32> {
        Some(self.child.id())
    }

    fn take_diagnostics(&mut self) -> Option<Box<dyn Read + Send>> {
        self.child
            .stderr
            .take()
            .map(|stderr| Box::new(stderr) as Box<dyn Read + Send>)
    }

    fn request_quit(&mut self) -> io::Result<()> {
        let stdin = self
            .child
            .stdin
            .as_mut()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotConnected, "stdin is not piped"))?;
        stdin.write_all(GRACEFUL_QUIT)?;
        stdin.flush()
    }

    fn try_wait(&mut self) -> io::Result<Option<EngineExit>> {
        Ok(self.child.try_wait()?.map(EngineExit::from))
    }

    fn wait_timeout(&mut self, timeout: Duration) -> io::Result<Option<EngineExit>> {
        Ok(wait_child_timeout(&mut self.child, timeout)?.map(EngineExit::from))
    }

    #[cfg(unix)]
    fn terminate(&mut self) -> io::Result<()> {
        let pid = libc::pid_t::try_from(self.child.id())
            .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "pid out of range"))?;
        // SAFETY: plain kill(2) on a pid we spawned and have not reaped yet
        let rc = unsafe { libc::kill(pid, libc::SIGTERM) };
        if rc == 0 {
            Ok(())
        } else {
            Err(io::Error::last_os_error())
        }
    }

    #[cfg(not(unix))]
    fn terminate(&mut self) -> io::Result<()> {
        // No SIGTERM equivalent for console processes
        self.child.kill()
    }

    fn kill(&mut self) -> io::Result<()> {
        self.child.kill()
    }
}

/// Poll `child` until it exits or `timeout` elapses
pub fn wait_child_timeout(child: &mut Child, timeout: Duration) -> io::Result<Option<ExitStatus>> {
    let deadline = Instant::now() + timeout;
    loop {
        if let Some(status) = child.try_wait()? {
            return Ok(Some(status));
        }
        let now = Instant::now();
        if now >= deadline {
            return Ok(None);
        }
        thread::sleep(WAIT_POLL_INTERVAL.min(deadline - now));
    }
}

/// Ask the process to stop, escalating quit byte -> terminate -> kill.
///
/// Each tier only starts after the previous tier's window expired. A process
/// without a writable stdin goes straight to terminate.
pub(crate) fn escalate_stop(process: &mut dyn EngineProcess) -> EngineExit {
    match process.request_quit() {
        Ok(()) => match process.wait_timeout(GRACEFUL_STOP_TIMEOUT) {
            Ok(Some(exit)) => return exit,
            Ok(None) => warn!("Graceful shutdown timed out, terminating process"),
            Err(e) => warn!("Failed waiting for graceful shutdown: {}", e),
        },
        Err(e) => warn!("Cannot send quit to engine ({}), terminating process", e),
    }

    if let Err(e) = process.terminate() {
        warn!("Failed to terminate engine: {}", e);
    }
    match process.wait_timeout(TERMINATE_TIMEOUT) {
        Ok(Some(exit)) => return exit,
        Ok(None) => warn!("Engine ignored terminate, killing process"),
        Err(e) => warn!("Failed waiting for terminate: {}", e),
    }

    if let Err(e) = process.kill() {
        warn!("Failed to kill engine: {}", e);
    }
    match process.wait_timeout(KILL_REAP_TIMEOUT) {
        Ok(Some(exit)) => exit,
        _ => {
            info!("Engine did not report an exit status after kill");
            EngineExit::signalled()
        }
    }
}

/// Resolve a program name against `PATH`
pub fn find_in_path(program: &str) -> Option<PathBuf> {
    let paths = std::env::var_os("PATH")?;
    let candidates: Vec<String> = if cfg!(windows) {
        vec![format!("{}.exe", program), program.to_string()]
    } else {
        vec![program.to_string()]
    };

    std::env::split_paths(&paths)
        .flat_map(|dir| candidates.iter().map(move |name| dir.join(name)))
        .find(|path| path.is_file())
}
