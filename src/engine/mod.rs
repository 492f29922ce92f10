// Recording engine - independent of any front end

pub mod core;
pub mod hardware;
pub mod process;
pub mod session;
pub mod smoke;

pub use self::core::*;
pub use hardware::{DetectionResult, EncoderDescriptor, EncoderDetector, Vendor};
pub use session::{RecorderError, RecordingSession, SessionEvent};
