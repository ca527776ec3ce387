//! Recording session management
//!
//! This module provides the `RecordingSession` abstraction that manages:
//! - Audio capture from the device stream, cut into fixed-duration slices
//! - Ordered transcoding and delivery of slices, terminal slice last
//! - Still sampling while recording
//! - Session ids, identity stamping and statistics

pub mod config;
mod events;
mod identity;
#[allow(clippy::module_inception)]
mod session;
mod snapshot;
mod stats;

pub use config::SessionConfig;
pub use events::PipelineEvent;
pub use identity::{SessionId, SessionIdMinter, SessionIdentity};
pub use session::{RecordingSession, StoppedSession};
pub use snapshot::FrameSnapshot;
pub use stats::SessionStats;
