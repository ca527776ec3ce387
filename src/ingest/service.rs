use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::{error, info, warn};

use super::assembler::{CompletedRecording, IngestError, SessionAssembler};
use crate::analysis::{AnalysisRecord, AnalysisStore, SentimentAnalyzer, SpeechToText, Transcript};
use crate::transport::OutboundMessage;

/// What happened to a recording whose terminal slice arrived
#[derive(Debug, Clone)]
pub struct IngestOutcome {
    pub recording: CompletedRecording,
    /// Where the merged WAV was written, if saving is enabled and succeeded
    pub saved_to: Option<PathBuf>,
    pub transcript: Option<Transcript>,
    /// Tone analysis of the transcript, also added to the store
    pub analysis: Option<AnalysisRecord>,
}

#[derive(Clone)]
struct Transcription {
    speech: Arc<dyn SpeechToText>,
    analyzer: Arc<dyn SentimentAnalyzer>,
    analyses: AnalysisStore,
}

/// Backend handling of pipeline messages.
///
/// Feeds every message to the shared [`SessionAssembler`]. Each completed
/// recording is optionally saved, then optionally transcribed and its
/// transcript tone-analyzed into the [`AnalysisStore`]. Save and analysis
/// failures are logged and leave the rest of the outcome intact.
#[derive(Clone)]
pub struct IngestService {
    assembler: Arc<RwLock<SessionAssembler>>,
    recordings_path: Option<PathBuf>,
    transcription: Option<Transcription>,
}

impl IngestService {
    pub fn new(assembler: Arc<RwLock<SessionAssembler>>) -> Self {
        Self {
            assembler,
            recordings_path: None,
            transcription: None,
        }
    }

    /// Write every completed recording under `dir`
    pub fn save_recordings_to(mut self, dir: impl Into<PathBuf>) -> Self {
        self.recordings_path = Some(dir.into());
        self
    }

    /// Transcribe completed recordings and store the tone of each transcript
    pub fn with_transcription(
        mut self,
        speech: Arc<dyn SpeechToText>,
        analyzer: Arc<dyn SentimentAnalyzer>,
        analyses: AnalysisStore,
    ) -> Self {
        self.transcription = Some(Transcription {
            speech,
            analyzer,
            analyses,
        });
        self
    }

    pub async fn handle(
        &self,
        message: OutboundMessage,
    ) -> Result<Option<IngestOutcome>, IngestError> {
        let completed = self.assembler.write().await.ingest(message)?;

        let recording = match completed {
            Some(recording) => recording,
            None => return Ok(None),
        };

        let saved_to = match &self.recordings_path {
            Some(dir) => save(&recording, dir.clone()).await,
            None => None,
        };

        let (transcript, analysis) = match &self.transcription {
            Some(transcription) => transcription.process(&recording).await,
            None => (None, None),
        };

        Ok(Some(IngestOutcome {
            recording,
            saved_to,
            transcript,
            analysis,
        }))
    }
}

async fn save(recording: &CompletedRecording, dir: PathBuf) -> Option<PathBuf> {
    let recording = recording.clone();

    match tokio::task::spawn_blocking(move || recording.write_to(&dir)).await {
        Ok(Ok(path)) => Some(path),
        Ok(Err(e)) => {
            error!("{:#}", e);
            None
        }
        Err(e) => {
            error!("Recording writer failed: {}", e);
            None
        }
    }
}

impl Transcription {
    async fn process(
        &self,
        recording: &CompletedRecording,
    ) -> (Option<Transcript>, Option<AnalysisRecord>) {
        if recording.slices == 0 {
            info!("Recording {} has no audio, skipping transcription", recording.id);
            return (None, None);
        }

        let transcript = match self.speech.recognize(&recording.wav).await {
            Ok(transcript) => transcript,
            Err(e) => {
                error!("Transcription of recording {} failed: {}", recording.id, e);
                return (None, None);
            }
        };

        info!(
            "Recording {} of session {} transcribed: {} chars",
            recording.id,
            recording.session_timestamp,
            transcript.text.len()
        );

        if transcript.text.is_empty() {
            return (Some(transcript), None);
        }

        match self.analyzer.text_sentiment(&transcript.text).await {
            Ok(result) => {
                let record = AnalysisRecord::from_result(
                    &result,
                    &transcript.text,
                    recording.session_timestamp,
                );
                self.analyses.add(record.clone()).await;
                (Some(transcript), Some(record))
            }
            Err(e) => {
                warn!("Tone analysis of recording {} failed: {}", recording.id, e);
                (Some(transcript), None)
            }
        }
    }
}
