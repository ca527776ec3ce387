use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::{broadcast, watch, Mutex};
use tracing::{debug, info, warn};

use crate::error::CaptureError;
use crate::media::{wait_ready, ConsumerHandle, MediaAcquisition, StreamState};
use crate::session::{
    PipelineEvent, RecordingSession, SessionConfig, SessionId, SessionIdMinter, SessionIdentity,
    SessionStats, StoppedSession,
};
use crate::transport::{RetryingTransport, SessionTransport};

/// Outcome of [`CaptureController::toggle_recording`]
pub enum Toggle {
    Started(SessionId),
    /// Capture has stopped; the session may still be delivering slices
    Stopped(StoppedSession),
}

impl Toggle {
    pub fn is_started(&self) -> bool {
        matches!(self, Toggle::Started(_))
    }
}

/// What the preview area shows
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "lowercase")]
pub enum PreviewState {
    /// Waiting for the device (or the user's permission)
    Pending,
    Live,
    /// Degraded: no preview and no recording
    Unavailable { reason: String },
}

/// Render state of one capture widget
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WidgetView {
    pub preview: PreviewState,
    pub recording: bool,
    /// Toggle button label: `Start` or `Stop`
    pub label: &'static str,
}

/// One capture widget: a consumer of the shared device stream that records
/// sessions and forwards them to the transport.
///
/// Toggles are serialized; at most one session is active at a time. When the
/// acquisition failed the controller is degraded: toggling returns the
/// acquisition error and nothing is emitted.
pub struct CaptureController {
    transport: Arc<dyn SessionTransport>,
    identity: SessionIdentity,
    config: SessionConfig,
    /// Shared with every controller on the same acquisition
    session_ids: Arc<SessionIdMinter>,
    events: broadcast::Sender<PipelineEvent>,
    stream_state: watch::Receiver<StreamState>,
    /// Id of the active session, readable without waiting on a toggle
    active_id: parking_lot::Mutex<Option<SessionId>>,
    detached: AtomicBool,
    inner: Mutex<ControllerInner>,
}

struct ControllerInner {
    consumer: Option<ConsumerHandle>,
    active: Option<RecordingSession>,
}

impl CaptureController {
    /// Attach a new controller to `acquisition`, requesting the device if
    /// this is the first consumer
    pub fn attach(
        acquisition: &MediaAcquisition,
        transport: Arc<dyn SessionTransport>,
        identity: SessionIdentity,
        config: SessionConfig,
    ) -> Self {
        let consumer = acquisition.attach();
        let stream_state = consumer.watch();

        let transport: Arc<dyn SessionTransport> = if config.retry.max_attempts > 1 {
            Arc::new(RetryingTransport::new(transport, config.retry.clone()))
        } else {
            transport
        };

        info!(
            "Capture controller {} attached for {} over {}",
            consumer.id(),
            identity.user_id,
            transport.name()
        );

        let (events, _) = broadcast::channel(256);

        Self {
            transport,
            identity,
            config,
            session_ids: acquisition.session_ids(),
            events,
            stream_state,
            active_id: parking_lot::Mutex::new(None),
            detached: AtomicBool::new(false),
            inner: Mutex::new(ControllerInner {
                consumer: Some(consumer),
                active: None,
            }),
        }
    }

    pub fn identity(&self) -> &SessionIdentity {
        &self.identity
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<PipelineEvent> {
        self.events.subscribe()
    }

    /// Wait until the device stream is ready or has failed
    pub async fn ready(&self) -> Result<(), CaptureError> {
        wait_ready(self.stream_state.clone()).await.map(|_| ())
    }

    pub fn is_degraded(&self) -> bool {
        matches!(*self.stream_state.borrow(), StreamState::Failed(_))
    }

    pub fn active_session(&self) -> Option<SessionId> {
        *self.active_id.lock()
    }

    /// Start recording when idle, stop when recording
    pub async fn toggle_recording(&self) -> Result<Toggle, CaptureError> {
        let mut inner = self.inner.lock().await;

        if let Some(session) = inner.active.take() {
            *self.active_id.lock() = None;
            let stopped = session.stop().await;
            return Ok(Toggle::Stopped(stopped));
        }

        if inner.consumer.is_none() {
            return Err(CaptureError::DeviceNotReady);
        }

        let state = self.stream_state.borrow().clone();
        let stream = match state {
            StreamState::Ready(stream) => stream,
            StreamState::Failed(error) => {
                warn!("Recording unavailable: {}", error);
                return Err(error);
            }
            StreamState::Pending => return Err(CaptureError::DeviceNotReady),
        };

        let id = self.session_ids.mint();
        let session = RecordingSession::start(
            id,
            &stream,
            Arc::clone(&self.transport),
            self.identity.clone(),
            &self.config,
            self.events.clone(),
        )?;

        inner.active = Some(session);
        *self.active_id.lock() = Some(id);

        Ok(Toggle::Started(id))
    }

    /// Statistics of the active session
    pub async fn stats(&self) -> Option<SessionStats> {
        self.inner.lock().await.active.as_ref().map(|s| s.stats())
    }

    pub fn render(&self) -> WidgetView {
        let preview = if self.detached.load(Ordering::SeqCst) {
            PreviewState::Unavailable {
                reason: "detached".to_string(),
            }
        } else {
            match &*self.stream_state.borrow() {
                StreamState::Pending => PreviewState::Pending,
                StreamState::Ready(stream) if stream.has_video() => PreviewState::Live,
                StreamState::Ready(_) => PreviewState::Unavailable {
                    reason: "no video track".to_string(),
                },
                StreamState::Failed(error) => PreviewState::Unavailable {
                    reason: error.to_string(),
                },
            }
        };

        let recording = self.active_id.lock().is_some();

        WidgetView {
            preview,
            recording,
            label: if recording { "Stop" } else { "Start" },
        }
    }

    /// Stop any active recording and detach from the device stream.
    ///
    /// Returns the stopped session, if one was active, so the caller can
    /// wait for its delivery.
    pub async fn shutdown(&self) -> Option<StoppedSession> {
        let mut inner = self.inner.lock().await;

        let stopped = match inner.active.take() {
            Some(session) => {
                *self.active_id.lock() = None;
                Some(session.stop().await)
            }
            None => None,
        };

        if let Some(consumer) = inner.consumer.take() {
            debug!("Capture controller {} detaching", consumer.id());
            consumer.detach();
        }
        self.detached.store(true, Ordering::SeqCst);

        stopped
    }
}
