use std::time::Duration;
use tracing::{debug, warn};

use super::frame::AudioFrame;
use crate::session::SessionId;

/// Chunk configuration
#[derive(Debug, Clone)]
pub struct ChunkConfig {
    /// Amount of captured audio in each slice (default: 3 seconds)
    pub slice_duration: Duration,
}

impl Default for ChunkConfig {
    fn default() -> Self {
        Self {
            slice_duration: Duration::from_millis(3000),
        }
    }
}

/// Audio handed to the transcoder
#[derive(Debug, Clone, PartialEq)]
pub enum RawAudio {
    /// Interleaved 16-bit PCM as captured
    Pcm {
        samples: Vec<i16>,
        sample_rate: u32,
        channels: u16,
    },
    /// Container-wrapped audio (WAV, OGG, M4A, ...) with an optional extension hint
    Encoded {
        bytes: Vec<u8>,
        extension: Option<String>,
    },
}

/// One captured slice, not yet transcoded
#[derive(Debug, Clone)]
pub struct RawSlice {
    pub session_id: SessionId,
    /// Position of this slice within its session (0-indexed)
    pub index: u64,
    /// Offset of the first sample from the start of the session, in milliseconds
    pub start_ms: u64,
    pub audio: RawAudio,
}

/// Transcoded slice ready for the transport
#[derive(Debug, Clone, PartialEq)]
pub struct AudioSlice {
    pub session_id: SessionId,
    pub index: u64,
    /// WAV bytes; empty for the terminal slice
    pub payload: Vec<u8>,
    pub is_final: bool,
}

impl AudioSlice {
    /// End-of-stream marker for a session
    pub fn terminal(session_id: SessionId, index: u64) -> Self {
        Self {
            session_id,
            index,
            payload: Vec::new(),
            is_final: true,
        }
    }
}

/// Cuts a continuous PCM stream into fixed-duration slices for one session.
///
/// Slicing is driven by the amount of buffered audio, not by wall-clock
/// time, so `L` ms of captured audio always yields `floor(L / slice_duration)`
/// slices. `finish` consumes the chunker and returns the terminal slice; any
/// partial remainder is discarded.
pub struct AudioChunker {
    session_id: SessionId,
    slice_duration: Duration,
    buffer: Vec<i16>,
    format: Option<(u32, u16)>,
    next_index: u64,
}

impl AudioChunker {
    pub fn new(session_id: SessionId, config: &ChunkConfig) -> Self {
        Self {
            session_id,
            slice_duration: config.slice_duration,
            buffer: Vec::new(),
            format: None,
            next_index: 0,
        }
    }

    pub fn session_id(&self) -> SessionId {
        self.session_id
    }

    /// Number of regular slices cut so far
    pub fn slices_cut(&self) -> u64 {
        self.next_index
    }

    /// Buffer a captured frame, returning every slice it completes
    pub fn push(&mut self, frame: &AudioFrame) -> Vec<RawSlice> {
        if frame.sample_rate == 0 || frame.channels == 0 {
            warn!(
                "Dropping malformed frame at {}ms ({}Hz, {} channels)",
                frame.timestamp_ms, frame.sample_rate, frame.channels
            );
            return Vec::new();
        }

        let format = (frame.sample_rate, frame.channels);
        match self.format {
            Some(current) if current != format => {
                warn!(
                    "Input format changed from {:?} to {:?}; discarding {} buffered samples",
                    current,
                    format,
                    self.buffer.len()
                );
                self.buffer.clear();
                self.format = Some(format);
            }
            None => self.format = Some(format),
            _ => {}
        }

        self.buffer.extend_from_slice(&frame.samples);

        let slice_len = self.slice_len(format);
        let mut slices = Vec::new();

        while slice_len > 0 && self.buffer.len() >= slice_len {
            let rest = self.buffer.split_off(slice_len);
            let samples = std::mem::replace(&mut self.buffer, rest);

            debug!(
                "Session {} slice {} cut ({} samples)",
                self.session_id,
                self.next_index,
                samples.len()
            );

            slices.push(RawSlice {
                session_id: self.session_id,
                index: self.next_index,
                start_ms: self.next_index * self.slice_duration.as_millis() as u64,
                audio: RawAudio::Pcm {
                    samples,
                    sample_rate: format.0,
                    channels: format.1,
                },
            });
            self.next_index += 1;
        }

        slices
    }

    /// Close the session, returning its terminal slice
    pub fn finish(self) -> AudioSlice {
        if !self.buffer.is_empty() {
            debug!(
                "Session {} discarding {} samples of partial slice",
                self.session_id,
                self.buffer.len()
            );
        }

        AudioSlice::terminal(self.session_id, self.next_index)
    }

    /// Interleaved samples in one full slice of the given format
    fn slice_len(&self, (sample_rate, channels): (u32, u16)) -> usize {
        let frames = sample_rate as u128 * self.slice_duration.as_millis() / 1000;
        frames as usize * channels as usize
    }
}
