use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};

/// Lifecycle of a recording session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecorderState {
    #[default]
    Idle,
    Recording,
    Stopping,
    Error,
}

impl RecorderState {
    fn to_u8(self) -> u8 {
        match self {
            Self::Idle => 0,
            Self::Recording => 1,
            Self::Stopping => 2,
            Self::Error => 3,
        }
    }

    fn from_u8(value: u8) -> Self {
        match value {
            1 => Self::Recording,
            2 => Self::Stopping,
            3 => Self::Error,
            _ => Self::Idle,
        }
    }
}

impl fmt::Display for RecorderState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Idle => "idle",
            Self::Recording => "recording",
            Self::Stopping => "stopping",
            Self::Error => "error",
        };
        f.write_str(label)
    }
}

/// State shared between the session and its background threads.
///
/// Only the session writes, from `&mut self` methods, so the start guard in
/// `RecordingSession::start` cannot race. The poller reads it to know when
/// to exit.
#[derive(Debug, Clone, Default)]
pub struct SharedState(Arc<AtomicU8>);

impl SharedState {
    pub fn new(state: RecorderState) -> Self {
        Self(Arc::new(AtomicU8::new(state.to_u8())))
    }

    pub fn get(&self) -> RecorderState {
        RecorderState::from_u8(self.0.load(Ordering::SeqCst))
    }

    pub fn set(&self, state: RecorderState) {
        self.0.store(state.to_u8(), Ordering::SeqCst);
    }
}
