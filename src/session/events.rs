use chrono::{DateTime, Utc};

use super::identity::SessionId;
use crate::error::CaptureError;

/// Progress and failures of the capture pipeline, broadcast to observers
#[derive(Debug, Clone, PartialEq)]
pub enum PipelineEvent {
    /// An audio message reached the transport
    SliceDelivered {
        session_id: SessionId,
        index: u64,
        is_final: bool,
    },
    /// A file message reached the transport
    FrameDelivered {
        session_id: SessionId,
        captured_at: DateTime<Utc>,
    },
    /// A slice was dropped
    TranscodeFailed {
        session_id: SessionId,
        error: CaptureError,
    },
    /// The transport rejected a message after every retry
    TransportFailed {
        session_id: SessionId,
        event: &'static str,
        error: CaptureError,
    },
}
