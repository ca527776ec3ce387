use std::collections::{BTreeMap, HashMap};
use std::io::Cursor;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use base64::Engine;
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info};

use crate::audio::transcode::encode_wav;
use crate::audio::AudioFrame;
use crate::transport::{AudioMessage, FileMessage, OutboundMessage};

/// Sample rate of a recording that ended before its first slice
const EMPTY_RECORDING_RATE: u32 = 8000;

#[derive(Error, Debug, PartialEq)]
pub enum IngestError {
    #[error("recording {id} of session {session_timestamp} already finished")]
    AfterFinal { session_timestamp: i64, id: u64 },

    #[error("undecodable payload for recording {id}: {reason}")]
    Payload { id: u64, reason: String },
}

/// A recording whose terminal slice has arrived
#[derive(Debug, Clone)]
pub struct CompletedRecording {
    pub session_timestamp: i64,
    /// Recording (session) id from the audio messages
    pub id: u64,
    pub user: Option<String>,
    pub slices: usize,
    pub sample_rate: u32,
    /// Every slice's samples merged into one mono 16-bit WAV
    pub wav: Vec<u8>,
    samples: usize,
}

impl CompletedRecording {
    pub fn duration_ms(&self) -> u64 {
        self.samples as u64 * 1000 / self.sample_rate as u64
    }

    pub fn file_name(&self) -> String {
        format!("{}-{}.wav", self.session_timestamp, self.id)
    }

    /// Write the merged WAV into `dir`, returning its path
    pub fn write_to(&self, dir: &Path) -> Result<PathBuf> {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create recordings directory {}", dir.display()))?;

        let path = dir.join(self.file_name());
        std::fs::write(&path, &self.wav)
            .with_context(|| format!("Failed to write recording {}", path.display()))?;

        info!("Saved recording to {}", path.display());

        Ok(path)
    }
}

/// Per-recording entry of a [`TimelineSummary`]
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordingSummary {
    pub id: u64,
    pub slices: usize,
    pub finished: bool,
}

/// Everything received for one session timestamp
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TimelineSummary {
    pub session_timestamp: i64,
    pub user: Option<String>,
    pub recordings: Vec<RecordingSummary>,
    /// `dataTimestamp` of every frame, ascending
    pub frames: Vec<i64>,
}

#[derive(Default)]
struct Timeline {
    user: Option<String>,
    recordings: BTreeMap<u64, Track>,
    /// `dataTimestamp` of every frame, ascending
    frames: Vec<i64>,
}

#[derive(Default)]
struct Track {
    /// Samples of every slice so far; emptied once the recording completes
    samples: Vec<i16>,
    slices: usize,
    sample_rate: Option<u32>,
    finished: bool,
}

/// Rebuilds session timelines from pipeline messages.
///
/// Audio slices are appended per recording in arrival order (the pipeline
/// delivers them in order); frames are ordered by `dataTimestamp`. Only
/// counts and timestamps outlive a completed recording: the merged audio is
/// handed out with the [`CompletedRecording`] and frame images are not kept.
#[derive(Default)]
pub struct SessionAssembler {
    sessions: HashMap<i64, Timeline>,
}

impl SessionAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take in one message; returns the merged recording when it was the
    /// terminal slice of a recording
    pub fn ingest(
        &mut self,
        message: OutboundMessage,
    ) -> Result<Option<CompletedRecording>, IngestError> {
        match message {
            OutboundMessage::Audio(audio) => self.ingest_audio(audio),
            OutboundMessage::File(file) => {
                self.ingest_file(file);
                Ok(None)
            }
        }
    }

    pub fn timeline(&self, session_timestamp: i64) -> Option<TimelineSummary> {
        let timeline = self.sessions.get(&session_timestamp)?;

        Some(TimelineSummary {
            session_timestamp,
            user: timeline.user.clone(),
            recordings: timeline
                .recordings
                .iter()
                .map(|(id, track)| RecordingSummary {
                    id: *id,
                    slices: track.slices,
                    finished: track.finished,
                })
                .collect(),
            frames: timeline.frames.clone(),
        })
    }

    fn ingest_audio(
        &mut self,
        audio: AudioMessage,
    ) -> Result<Option<CompletedRecording>, IngestError> {
        let timeline = self.sessions.entry(audio.session_timestamp).or_default();
        let track = timeline.recordings.entry(audio.id).or_default();

        if track.finished {
            return Err(IngestError::AfterFinal {
                session_timestamp: audio.session_timestamp,
                id: audio.id,
            });
        }

        if !audio.is_final {
            let (samples, sample_rate) = decode_slice(&audio)?;

            if let Some(expected) = track.sample_rate {
                if expected != sample_rate {
                    return Err(IngestError::Payload {
                        id: audio.id,
                        reason: format!(
                            "sample rate changed from {}Hz to {}Hz",
                            expected, sample_rate
                        ),
                    });
                }
            }

            track.sample_rate = Some(sample_rate);
            track.samples.extend_from_slice(&samples);
            track.slices += 1;

            debug!(
                "Recording {} of session {}: slice {} received",
                audio.id, audio.session_timestamp, track.slices
            );
            return Ok(None);
        }

        track.finished = true;
        if audio.user.is_some() {
            timeline.user = audio.user.clone();
        }

        let sample_rate = track.sample_rate.unwrap_or(EMPTY_RECORDING_RATE);
        let merged = AudioFrame {
            samples: std::mem::take(&mut track.samples),
            sample_rate,
            channels: 1,
            timestamp_ms: 0,
        };
        let wav = encode_wav(&merged).map_err(|e| IngestError::Payload {
            id: audio.id,
            reason: e.to_string(),
        })?;

        info!(
            "Recording {} of session {} complete: {} slices",
            audio.id, audio.session_timestamp, track.slices
        );

        Ok(Some(CompletedRecording {
            session_timestamp: audio.session_timestamp,
            id: audio.id,
            user: audio.user,
            slices: track.slices,
            sample_rate,
            wav,
            samples: merged.samples.len(),
        }))
    }

    fn ingest_file(&mut self, file: FileMessage) {
        let timeline = self.sessions.entry(file.session_timestamp).or_default();
        let data_timestamp = file.data_timestamp;
        timeline.user = Some(file.user);

        let at = timeline.frames.partition_point(|&ts| ts <= data_timestamp);
        timeline.frames.insert(at, data_timestamp);
    }
}

fn decode_slice(audio: &AudioMessage) -> Result<(Vec<i16>, u32), IngestError> {
    let payload = |reason: String| IngestError::Payload {
        id: audio.id,
        reason,
    };

    let bytes = base64::engine::general_purpose::STANDARD
        .decode(&audio.data)
        .map_err(|e| payload(format!("invalid base64: {}", e)))?;

    let reader = hound::WavReader::new(Cursor::new(bytes))
        .map_err(|e| payload(format!("invalid WAV: {}", e)))?;
    let spec = reader.spec();

    if spec.channels != 1 || spec.bits_per_sample != 16 {
        return Err(payload(format!(
            "expected mono 16-bit WAV, got {} channels at {} bits",
            spec.channels, spec.bits_per_sample
        )));
    }

    let samples = reader
        .into_samples::<i16>()
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| payload(format!("invalid WAV samples: {}", e)))?;

    Ok((samples, spec.sample_rate))
}

#[cfg(test)]
mod tests {
    use super::*;

    const TS: i64 = 1_700_000_000_000;

    fn slice(id: u64, samples: &[i16], sample_rate: u32) -> OutboundMessage {
        let wav = encode_wav(&AudioFrame {
            samples: samples.to_vec(),
            sample_rate,
            channels: 1,
            timestamp_ms: 0,
        })
        .unwrap();

        OutboundMessage::Audio(AudioMessage {
            id,
            data: base64::engine::general_purpose::STANDARD.encode(wav),
            is_final: false,
            session_timestamp: TS,
            user: None,
        })
    }

    fn terminal(id: u64) -> OutboundMessage {
        OutboundMessage::Audio(AudioMessage {
            id,
            data: String::new(),
            is_final: true,
            session_timestamp: TS,
            user: Some("alice".to_string()),
        })
    }

    fn frame(data_timestamp: i64) -> OutboundMessage {
        OutboundMessage::File(FileMessage {
            data_timestamp,
            data: "data:image/png;base64,AAAA".to_string(),
            session_timestamp: TS,
            user: "alice".to_string(),
        })
    }

    #[test]
    fn test_slices_merge_in_arrival_order() {
        let mut assembler = SessionAssembler::new();

        assert!(assembler.ingest(slice(1, &[1, 2, 3, 4], 8000)).unwrap().is_none());
        assert!(assembler.ingest(slice(1, &[5, 6], 8000)).unwrap().is_none());

        let recording = assembler.ingest(terminal(1)).unwrap().unwrap();
        assert_eq!(recording.slices, 2);
        assert_eq!(recording.user.as_deref(), Some("alice"));
        assert_eq!(recording.file_name(), format!("{}-1.wav", TS));

        let samples: Vec<i16> = hound::WavReader::new(Cursor::new(recording.wav))
            .unwrap()
            .into_samples::<i16>()
            .map(|s| s.unwrap())
            .collect();
        assert_eq!(samples, vec![1, 2, 3, 4, 5, 6]);
    }

    #[test]
    fn test_terminal_without_slices_is_empty_recording() {
        let mut assembler = SessionAssembler::new();

        let recording = assembler.ingest(terminal(9)).unwrap().unwrap();

        assert_eq!(recording.slices, 0);
        assert_eq!(recording.sample_rate, EMPTY_RECORDING_RATE);
        assert_eq!(recording.duration_ms(), 0);
    }

    #[test]
    fn test_slice_after_terminal_is_rejected() {
        let mut assembler = SessionAssembler::new();
        assembler.ingest(terminal(1)).unwrap();

        let err = assembler.ingest(slice(1, &[1, 2], 8000)).unwrap_err();
        assert_eq!(
            err,
            IngestError::AfterFinal {
                session_timestamp: TS,
                id: 1
            }
        );
    }

    #[test]
    fn test_bad_payloads_are_rejected() {
        let mut assembler = SessionAssembler::new();

        let garbage = OutboundMessage::Audio(AudioMessage {
            id: 2,
            data: "not base64!".to_string(),
            is_final: false,
            session_timestamp: TS,
            user: None,
        });
        assert!(matches!(
            assembler.ingest(garbage),
            Err(IngestError::Payload { id: 2, .. })
        ));

        assembler.ingest(slice(3, &[1, 2], 8000)).unwrap();
        let err = assembler.ingest(slice(3, &[1, 2], 16000)).unwrap_err();
        assert!(err.to_string().contains("sample rate changed"));
    }

    #[test]
    fn test_frames_are_ordered_by_capture_time() {
        let mut assembler = SessionAssembler::new();

        for ts in [TS + 6000, TS, TS + 3000] {
            assembler.ingest(frame(ts)).unwrap();
        }

        let timeline = assembler.timeline(TS).unwrap();
        assert_eq!(timeline.frames, vec![TS, TS + 3000, TS + 6000]);
        assert_eq!(timeline.user.as_deref(), Some("alice"));
        assert!(assembler.timeline(TS + 1).is_none());
    }

    #[test]
    fn test_completed_recordings_release_their_audio() {
        let mut assembler = SessionAssembler::new();

        for id in 0..50 {
            assembler.ingest(slice(id, &[7; 24000], 8000)).unwrap();
            assembler.ingest(frame(TS + id as i64)).unwrap();
            assert!(assembler.ingest(terminal(id)).unwrap().is_some());
        }

        let retained: usize = assembler
            .sessions
            .values()
            .flat_map(|timeline| timeline.recordings.values())
            .map(|track| track.samples.capacity())
            .sum();
        assert_eq!(retained, 0);

        // Summaries survive
        let timeline = assembler.timeline(TS).unwrap();
        assert_eq!(timeline.recordings.len(), 50);
        assert!(timeline.recordings.iter().all(|r| r.finished && r.slices == 1));
        assert_eq!(timeline.frames.len(), 50);
    }

    #[test]
    fn test_write_to_creates_directory() {
        let dir = tempfile::tempdir().unwrap();
        let mut assembler = SessionAssembler::new();
        assembler.ingest(slice(4, &[0; 800], 8000)).unwrap();
        let recording = assembler.ingest(terminal(4)).unwrap().unwrap();

        let path = recording.write_to(&dir.path().join("recordings")).unwrap();

        assert!(path.ends_with(recording.file_name()));
        let reader = hound::WavReader::open(&path).unwrap();
        assert_eq!(reader.spec().sample_rate, 8000);
        assert_eq!(reader.duration(), 800);
        assert_eq!(recording.duration_ms(), 100);
    }
}
