use std::time::Duration;
use thiserror::Error;

/// Failures on the capture path and the outbound transport.
///
/// Every variant is recoverable: acquisition failures degrade the widget,
/// per-slice and per-frame failures drop that item, transport failures are
/// logged and surfaced as pipeline events.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CaptureError {
    #[error("device access denied: {0}")]
    AcquisitionDenied(String),

    #[error("device acquisition timed out after {0:?}")]
    AcquisitionTimeout(Duration),

    #[error("device stream is not ready")]
    DeviceNotReady,

    #[error("device stream has no audio track")]
    NoAudioTrack,

    #[error("transcode failed for slice {index} of session {session_id}: {reason}")]
    TranscodeFailure {
        session_id: u64,
        index: u64,
        reason: String,
    },

    #[error("transcode timed out for slice {index} of session {session_id} after {limit:?}")]
    TranscodeTimeout {
        session_id: u64,
        index: u64,
        limit: Duration,
    },

    #[error("still image encode failed: {0}")]
    FrameEncode(String),

    #[error("transport emit of `{event}` failed: {reason}")]
    TransportFailure { event: String, reason: String },
}

/// Failures of the speech and tone analysis collaborators.
#[derive(Error, Debug)]
pub enum AnalysisError {
    #[error("upstream analysis failed with status {status}: {body}")]
    Upstream { status: u16, body: String },

    #[error("upstream analysis request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("invalid analysis input: {0}")]
    InvalidInput(String),

    #[error("unexpected analysis response: {0}")]
    Malformed(String),
}
