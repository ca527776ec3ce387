//! Receiving end of the pipeline
//!
//! Rebuilds per-session timelines from `audio` and `file` messages, merges
//! each finished recording into a single WAV and hands it on for
//! transcription and tone analysis.

mod assembler;
mod service;

pub use assembler::{
    CompletedRecording, IngestError, RecordingSummary, SessionAssembler, TimelineSummary,
};
pub use service::{IngestOutcome, IngestService};
