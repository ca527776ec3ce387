use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::watch;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::device::{DeviceStream, MediaConstraints, MediaDevices};
use crate::error::CaptureError;
use crate::session::SessionIdMinter;

/// What a consumer currently knows about the shared device stream
#[derive(Debug, Clone, PartialEq)]
pub enum StreamState {
    /// Acquisition requested, waiting for the device (or the user)
    Pending,
    Ready(DeviceStream),
    Failed(CaptureError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConsumerId(Uuid);

impl fmt::Display for ConsumerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Owns the device stream on behalf of every attached consumer.
///
/// - At most one acquisition request is outstanding; attaches while it is
///   pending only register, even if every earlier consumer has left.
/// - The outcome is pushed to every consumer registered when it lands, and
///   replayed to consumers that attach later. A stream landing with no
///   consumers left is released at once.
/// - The last detach stops the tracks and forgets the outcome, so the next
///   attach acquires again.
///
/// Every consumer also mints its session ids from the one shared
/// [`SessionIdMinter`], so ids never collide across widgets.
///
/// Cloning yields another handle to the same manager.
#[derive(Clone)]
pub struct MediaAcquisition {
    inner: Arc<AcquisitionInner>,
}

struct AcquisitionInner {
    devices: Arc<dyn MediaDevices>,
    constraints: MediaConstraints,
    timeout: Duration,
    session_ids: Arc<SessionIdMinter>,
    registry: Mutex<Registry>,
}

#[derive(Default)]
struct Registry {
    consumers: HashMap<ConsumerId, watch::Sender<StreamState>>,
    /// Set from spawning a request until its outcome lands
    in_flight: bool,
    stream: Option<DeviceStream>,
    failure: Option<CaptureError>,
}

impl MediaAcquisition {
    pub fn new(
        devices: Arc<dyn MediaDevices>,
        constraints: MediaConstraints,
        timeout: Duration,
    ) -> Self {
        Self {
            inner: Arc::new(AcquisitionInner {
                devices,
                constraints,
                timeout,
                session_ids: Arc::new(SessionIdMinter::new()),
                registry: Mutex::new(Registry::default()),
            }),
        }
    }

    /// Register a consumer, requesting the device if nobody has yet.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn attach(&self) -> ConsumerHandle {
        let id = ConsumerId(Uuid::new_v4());
        let mut registry = self.inner.registry.lock();

        let initial = match (&registry.stream, &registry.failure) {
            (Some(stream), _) => StreamState::Ready(stream.clone()),
            (None, Some(error)) => StreamState::Failed(error.clone()),
            (None, None) => StreamState::Pending,
        };

        let (tx, rx) = watch::channel(initial);
        registry.consumers.insert(id, tx);

        debug!(
            "Consumer {} attached ({} total)",
            id,
            registry.consumers.len()
        );

        let settled = registry.stream.is_some() || registry.failure.is_some();
        if !settled && !registry.in_flight {
            registry.in_flight = true;
            drop(registry);
            self.spawn_request();
        } else if registry.in_flight {
            debug!("Consumer {} waiting on the pending request", id);
        }

        ConsumerHandle {
            id,
            acquisition: self.clone(),
            state: rx,
        }
    }

    pub fn consumer_count(&self) -> usize {
        self.inner.registry.lock().consumers.len()
    }

    /// Whether a device request is outstanding
    pub fn is_request_in_flight(&self) -> bool {
        self.inner.registry.lock().in_flight
    }

    /// Session id source shared by every consumer of this acquisition
    pub fn session_ids(&self) -> Arc<SessionIdMinter> {
        Arc::clone(&self.inner.session_ids)
    }

    pub fn current_stream(&self) -> Option<DeviceStream> {
        self.inner.registry.lock().stream.clone()
    }

    fn spawn_request(&self) {
        let inner = Arc::clone(&self.inner);

        tokio::spawn(async move {
            info!("Requesting device stream ({:?})", inner.constraints);

            let outcome = match tokio::time::timeout(
                inner.timeout,
                inner.devices.get_user_media(inner.constraints),
            )
            .await
            {
                Ok(result) => result,
                Err(_) => Err(CaptureError::AcquisitionTimeout(inner.timeout)),
            };

            inner.complete(outcome);
        });
    }

    fn detach(&self, id: ConsumerId) {
        let mut registry = self.inner.registry.lock();

        if registry.consumers.remove(&id).is_none() {
            return;
        }

        debug!(
            "Consumer {} detached ({} remaining)",
            id,
            registry.consumers.len()
        );

        if !registry.consumers.is_empty() {
            return;
        }

        if let Some(stream) = registry.stream.take() {
            stream.stop_tracks();
            info!("Last consumer detached, device stream {} released", stream.id());
        }

        registry.failure = None;
    }
}

impl AcquisitionInner {
    fn complete(&self, outcome: Result<DeviceStream, CaptureError>) {
        let mut registry = self.registry.lock();
        registry.in_flight = false;

        if registry.consumers.is_empty() {
            if let Ok(stream) = outcome {
                warn!(
                    "Device stream {} arrived after all consumers detached, releasing",
                    stream.id()
                );
                stream.stop_tracks();
            }
            return;
        }

        match outcome {
            Ok(stream) => {
                info!(
                    "Device stream {} ready for {} consumers",
                    stream.id(),
                    registry.consumers.len()
                );
                for tx in registry.consumers.values() {
                    tx.send_replace(StreamState::Ready(stream.clone()));
                }
                registry.stream = Some(stream);
            }
            Err(error) => {
                warn!(
                    "Device acquisition failed for {} consumers: {}",
                    registry.consumers.len(),
                    error
                );
                for tx in registry.consumers.values() {
                    tx.send_replace(StreamState::Failed(error.clone()));
                }
                registry.failure = Some(error);
            }
        }
    }
}

/// Registration of one consumer; detaches on drop
pub struct ConsumerHandle {
    id: ConsumerId,
    acquisition: MediaAcquisition,
    state: watch::Receiver<StreamState>,
}

impl ConsumerHandle {
    pub fn id(&self) -> ConsumerId {
        self.id
    }

    /// Latest known state, without waiting
    pub fn state(&self) -> StreamState {
        self.state.borrow().clone()
    }

    /// Receiver following every state change of this consumer
    pub fn watch(&self) -> watch::Receiver<StreamState> {
        self.state.clone()
    }

    /// Wait until the acquisition settles
    pub async fn ready(&self) -> Result<DeviceStream, CaptureError> {
        wait_ready(self.state.clone()).await
    }

    pub fn detach(self) {
        drop(self);
    }
}

impl Drop for ConsumerHandle {
    fn drop(&mut self) {
        self.acquisition.detach(self.id);
    }
}

impl fmt::Debug for ConsumerHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConsumerHandle").field("id", &self.id).finish()
    }
}

/// Follow `state` until the acquisition settles. A dropped sender (the
/// consumer detached) reads as not ready.
pub async fn wait_ready(
    mut state: watch::Receiver<StreamState>,
) -> Result<DeviceStream, CaptureError> {
    loop {
        let current = state.borrow_and_update().clone();
        match current {
            StreamState::Ready(stream) => return Ok(stream),
            StreamState::Failed(error) => return Err(error),
            StreamState::Pending => {}
        }

        if state.changed().await.is_err() {
            return Err(CaptureError::DeviceNotReady);
        }
    }
}
