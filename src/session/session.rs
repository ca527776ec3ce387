use super::config::SessionConfig;
use super::events::PipelineEvent;
use super::identity::{SessionId, SessionIdentity};
use super::snapshot::FrameSnapshot;
use super::stats::{SessionCounters, SessionStats};
use crate::audio::{
    AudioChunker, AudioFrame, AudioSlice, AudioTranscoder, OrderedTranscoder, SliceJob,
};
use crate::error::CaptureError;
use crate::media::{DeviceStream, FrameSampler, StillImage};
use crate::transport::{AudioMessage, OutboundMessage, SessionTransport};
use base64::Engine;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// One active recording: audio capture, still sampling and ordered delivery
/// to the transport.
///
/// Created by [`RecordingSession::start`] and ended by
/// [`RecordingSession::stop`], which emits the terminal slice. Dropping a
/// session without stopping it ends capture without a terminal slice.
pub struct RecordingSession {
    /// Session id, also the `id` of every audio message
    id: SessionId,

    identity: SessionIdentity,

    /// When the session started
    started_at: DateTime<Utc>,

    counters: Arc<SessionCounters>,

    /// Signals the capture task to stop pulling audio
    stop_tx: watch::Sender<bool>,

    /// Audio capture task; hands the chunker back when it exits
    capture_task: JoinHandle<AudioChunker>,

    /// Still sampler, absent when the stream has no video track
    sampler: Option<FrameSampler>,

    /// Queue into the ordered transcoder
    jobs_tx: mpsc::UnboundedSender<SliceJob>,

    /// Transcode-and-forward task
    forward_task: JoinHandle<()>,
}

impl RecordingSession {
    /// Start recording from `stream` under a freshly minted `id`
    pub fn start(
        id: SessionId,
        stream: &DeviceStream,
        transport: Arc<dyn SessionTransport>,
        identity: SessionIdentity,
        config: &SessionConfig,
        events: broadcast::Sender<PipelineEvent>,
    ) -> Result<Self, CaptureError> {
        let audio_rx = stream.subscribe_audio().ok_or(CaptureError::NoAudioTrack)?;

        info!(
            "Starting recording session {} for {} (session timestamp {})",
            id, identity.user_id, identity.session_timestamp
        );

        let counters = Arc::new(SessionCounters::default());
        let emitter = Emitter {
            session_id: id,
            transport,
            identity: identity.clone(),
            counters: Arc::clone(&counters),
            events,
        };

        // Transcode and forward, strictly in slice order
        let (jobs_tx, jobs_rx) = mpsc::unbounded_channel();
        let transcoder = OrderedTranscoder::new(Arc::new(AudioTranscoder::new(
            config.transcode_config(),
        )));
        let forward_task = {
            let on_slice = emitter.clone();
            let on_failure = emitter.clone();
            tokio::spawn(async move {
                transcoder
                    .run(
                        jobs_rx,
                        |slice| {
                            let emitter = on_slice.clone();
                            async move { emitter.audio(slice).await }
                        },
                        |e| on_failure.transcode_failed(e),
                    )
                    .await;
                debug!("Forwarding finished for session {}", id);
            })
        };

        // Audio capture
        let (stop_tx, stop_rx) = watch::channel(false);
        let chunker = AudioChunker::new(id, &config.chunk_config());
        let capture_task = tokio::spawn(capture(
            audio_rx,
            chunker,
            stop_rx,
            jobs_tx.clone(),
            Arc::clone(&counters),
        ));

        // Stills
        let sampler = match stream.video() {
            Some(source) => {
                let emitter = emitter.clone();
                Some(FrameSampler::start(
                    source,
                    config.frame_sampler_config(),
                    move |still| {
                        let emitter = emitter.clone();
                        async move { emitter.frame(still).await }
                    },
                ))
            }
            None => {
                warn!("Device stream has no video track, session {} records audio only", id);
                None
            }
        };

        Ok(Self {
            id,
            identity,
            started_at: Utc::now(),
            counters,
            stop_tx,
            capture_task,
            sampler,
            jobs_tx,
            forward_task,
        })
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn identity(&self) -> &SessionIdentity {
        &self.identity
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    /// Get current session statistics
    pub fn stats(&self) -> SessionStats {
        self.counters
            .snapshot(self.id, true, self.started_at, Utc::now())
    }

    /// Stop capture and stills, then queue the terminal slice.
    ///
    /// When this returns no further audio is captured and no further still
    /// callback starts. Slices captured before the stop are still transcoded
    /// and delivered ahead of the terminal slice; await
    /// [`StoppedSession::drained`] to wait for that.
    pub async fn stop(self) -> StoppedSession {
        info!("Stopping recording session {}", self.id);

        if let Some(sampler) = &self.sampler {
            sampler.stop();
        }
        self.stop_tx.send_replace(true);

        let terminal = match self.capture_task.await {
            Ok(chunker) => chunker.finish(),
            Err(e) => {
                error!("Capture task for session {} failed: {}", self.id, e);
                AudioSlice::terminal(self.id, self.counters.slices_cut())
            }
        };

        debug!(
            "Session {} queueing terminal slice at index {}",
            self.id, terminal.index
        );

        if self.jobs_tx.send(SliceJob::Terminal(terminal)).is_err() {
            error!("Forwarding for session {} ended before the terminal slice", self.id);
        }
        drop(self.jobs_tx);

        StoppedSession {
            id: self.id,
            started_at: self.started_at,
            stopped_at: Utc::now(),
            counters: self.counters,
            sampler: self.sampler,
            forward_task: self.forward_task,
        }
    }
}

/// A recording that no longer captures but may still be delivering
pub struct StoppedSession {
    id: SessionId,
    started_at: DateTime<Utc>,
    stopped_at: DateTime<Utc>,
    counters: Arc<SessionCounters>,
    sampler: Option<FrameSampler>,
    forward_task: JoinHandle<()>,
}

impl StoppedSession {
    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn stats(&self) -> SessionStats {
        self.counters
            .snapshot(self.id, false, self.started_at, self.stopped_at)
    }

    /// Wait until every slice, the terminal one included, has been handed to
    /// the transport and any still being handled has been sent
    pub async fn drained(mut self) -> SessionStats {
        if let Some(sampler) = self.sampler.take() {
            sampler.join().await;
        }

        if let Err(e) = (&mut self.forward_task).await {
            error!("Forwarding task for session {} failed: {}", self.id, e);
        }

        let stats = self.stats();
        info!(
            "Session {} drained: {} slices, {} frames, {} transcode failures, {} transport failures",
            self.id,
            stats.slices_emitted,
            stats.frames_emitted,
            stats.transcode_failures,
            stats.transport_failures
        );
        stats
    }
}

/// Pull audio frames into the chunker until stopped or the track ends
async fn capture(
    mut audio_rx: broadcast::Receiver<AudioFrame>,
    mut chunker: AudioChunker,
    mut stop_rx: watch::Receiver<bool>,
    jobs_tx: mpsc::UnboundedSender<SliceJob>,
    counters: Arc<SessionCounters>,
) -> AudioChunker {
    debug!("Audio capture started for session {}", chunker.session_id());

    loop {
        tokio::select! {
            biased;

            _ = stop_rx.changed() => break,

            frame = audio_rx.recv() => match frame {
                Ok(frame) => {
                    for raw in chunker.push(&frame) {
                        if jobs_tx.send(SliceJob::Transcode(raw)).is_err() {
                            warn!("Transcode queue closed, dropping slice");
                        }
                    }
                    counters.record_cut(chunker.slices_cut());
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!("Audio capture lagged, {} frames lost", skipped);
                }
                Err(broadcast::error::RecvError::Closed) => {
                    info!("Audio track ended");
                    break;
                }
            },
        }
    }

    debug!(
        "Audio capture stopped for session {} after {} slices",
        chunker.session_id(),
        chunker.slices_cut()
    );
    chunker
}

/// Turns pipeline output into transport messages for one session
#[derive(Clone)]
struct Emitter {
    session_id: SessionId,
    transport: Arc<dyn SessionTransport>,
    identity: SessionIdentity,
    counters: Arc<SessionCounters>,
    events: broadcast::Sender<PipelineEvent>,
}

impl Emitter {
    async fn audio(&self, slice: AudioSlice) {
        let data = if slice.is_final {
            String::new()
        } else {
            base64::engine::general_purpose::STANDARD.encode(&slice.payload)
        };

        let message = OutboundMessage::Audio(AudioMessage {
            id: slice.session_id.as_u64(),
            data,
            is_final: slice.is_final,
            session_timestamp: self.identity.session_timestamp,
            user: slice.is_final.then(|| self.identity.user_id.clone()),
        });

        if self.send(message).await {
            SessionCounters::bump(&self.counters.slices_emitted);
            let _ = self.events.send(PipelineEvent::SliceDelivered {
                session_id: slice.session_id,
                index: slice.index,
                is_final: slice.is_final,
            });
        }
    }

    async fn frame(&self, still: StillImage) {
        let snapshot = FrameSnapshot::new(still, &self.identity);
        let captured_at = snapshot.captured_at;

        if self.send(OutboundMessage::File(snapshot.into())).await {
            SessionCounters::bump(&self.counters.frames_emitted);
            let _ = self.events.send(PipelineEvent::FrameDelivered {
                session_id: self.session_id,
                captured_at,
            });
        }
    }

    fn transcode_failed(&self, error: CaptureError) {
        SessionCounters::bump(&self.counters.transcode_failures);
        let _ = self.events.send(PipelineEvent::TranscodeFailed {
            session_id: self.session_id,
            error,
        });
    }

    async fn send(&self, message: OutboundMessage) -> bool {
        let event = message.event_name();

        match self.transport.emit(message).await {
            Ok(()) => true,
            Err(e) => {
                error!(
                    "Failed to emit {} for session {} over {}: {}",
                    event,
                    self.session_id,
                    self.transport.name(),
                    e
                );
                SessionCounters::bump(&self.counters.transport_failures);
                let _ = self.events.send(PipelineEvent::TransportFailed {
                    session_id: self.session_id,
                    event,
                    error: e,
                });
                false
            }
        }
    }
}
