use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

use super::identity::SessionId;

/// Statistics about a recording session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionStats {
    pub session_id: SessionId,

    /// Whether recording is currently active
    pub is_recording: bool,

    /// When the recording started
    pub started_at: DateTime<Utc>,

    /// Recording duration in seconds (up to now while recording)
    pub duration_secs: f64,

    /// Audio messages delivered to the transport, terminal slice included
    pub slices_emitted: u64,

    /// File messages delivered to the transport
    pub frames_emitted: u64,

    /// Slices dropped because they could not be transcoded
    pub transcode_failures: u64,

    /// Messages the transport rejected after every retry
    pub transport_failures: u64,
}

/// Live counters shared by the tasks of one session
#[derive(Debug, Default)]
pub(crate) struct SessionCounters {
    slices_cut: AtomicU64,
    pub slices_emitted: AtomicU64,
    pub frames_emitted: AtomicU64,
    pub transcode_failures: AtomicU64,
    pub transport_failures: AtomicU64,
}

impl SessionCounters {
    pub fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::SeqCst);
    }

    pub fn record_cut(&self, slices_cut: u64) {
        self.slices_cut.store(slices_cut, Ordering::SeqCst);
    }

    /// Regular slices cut by the capture task so far
    pub fn slices_cut(&self) -> u64 {
        self.slices_cut.load(Ordering::SeqCst)
    }

    pub fn snapshot(
        &self,
        session_id: SessionId,
        is_recording: bool,
        started_at: DateTime<Utc>,
        ended_at: DateTime<Utc>,
    ) -> SessionStats {
        let duration_secs = (ended_at - started_at).num_milliseconds().max(0) as f64 / 1000.0;

        SessionStats {
            session_id,
            is_recording,
            started_at,
            duration_secs,
            slices_emitted: self.slices_emitted.load(Ordering::SeqCst),
            frames_emitted: self.frames_emitted.load(Ordering::SeqCst),
            transcode_failures: self.transcode_failures.load(Ordering::SeqCst),
            transport_failures: self.transport_failures.load(Ordering::SeqCst),
        }
    }
}
