use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, watch};
use tracing::info;
use uuid::Uuid;

use crate::audio::AudioFrame;
use crate::error::CaptureError;

/// Which tracks to request from the device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaConstraints {
    pub audio: bool,
    pub video: bool,
}

impl Default for MediaConstraints {
    fn default() -> Self {
        Self {
            audio: true,
            video: true,
        }
    }
}

/// A decoded video frame (packed RGB8)
#[derive(Debug, Clone, PartialEq)]
pub struct VideoFrame {
    pub width: u32,
    pub height: u32,
    /// `width * height * 3` bytes
    pub rgb: Vec<u8>,
    /// Milliseconds since the device stream started
    pub timestamp_ms: u64,
}

/// Receiver side of a video track: always holds the most recent frame
pub type VideoSource = watch::Receiver<Option<Arc<VideoFrame>>>;

/// Stops the device-side producers of a stream
pub trait TrackControl: Send + Sync {
    fn stop(&self);
}

/// Handle to live audio and video tracks.
///
/// Cheap to clone; all clones share the same tracks. Tracks are stopped at
/// most once, by [`DeviceStream::stop_tracks`].
#[derive(Clone)]
pub struct DeviceStream {
    inner: Arc<StreamInner>,
}

struct StreamInner {
    id: Uuid,
    audio: Option<broadcast::Sender<AudioFrame>>,
    video: Option<VideoSource>,
    control: Box<dyn TrackControl>,
    stopped: AtomicBool,
}

impl DeviceStream {
    pub fn new(
        audio: Option<broadcast::Sender<AudioFrame>>,
        video: Option<VideoSource>,
        control: impl TrackControl + 'static,
    ) -> Self {
        Self {
            inner: Arc::new(StreamInner {
                id: Uuid::new_v4(),
                audio,
                video,
                control: Box::new(control),
                stopped: AtomicBool::new(false),
            }),
        }
    }

    pub fn id(&self) -> Uuid {
        self.inner.id
    }

    pub fn has_audio(&self) -> bool {
        self.inner.audio.is_some()
    }

    pub fn has_video(&self) -> bool {
        self.inner.video.is_some()
    }

    /// Start receiving audio frames from now on
    pub fn subscribe_audio(&self) -> Option<broadcast::Receiver<AudioFrame>> {
        self.inner.audio.as_ref().map(|tx| tx.subscribe())
    }

    pub fn video(&self) -> Option<VideoSource> {
        self.inner.video.clone()
    }

    pub fn latest_video_frame(&self) -> Option<Arc<VideoFrame>> {
        self.inner
            .video
            .as_ref()
            .and_then(|video| video.borrow().clone())
    }

    /// Stop every track. Returns `true` only for the call that stopped them.
    pub fn stop_tracks(&self) -> bool {
        if self.inner.stopped.swap(true, Ordering::SeqCst) {
            return false;
        }

        info!("Stopping device stream {}", self.inner.id);
        self.inner.control.stop();
        true
    }

    pub fn is_stopped(&self) -> bool {
        self.inner.stopped.load(Ordering::SeqCst)
    }
}

impl fmt::Debug for DeviceStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeviceStream")
            .field("id", &self.inner.id)
            .field("audio", &self.has_audio())
            .field("video", &self.has_video())
            .field("stopped", &self.is_stopped())
            .finish()
    }
}

impl PartialEq for DeviceStream {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

/// Capability to open the user's camera and microphone
///
/// Implementations:
/// - `SyntheticDevices`: generated tone and test pattern (CLI demo, tests)
/// - a host integration forwarding to the platform permission prompt
#[async_trait::async_trait]
pub trait MediaDevices: Send + Sync {
    /// Request a combined stream. May stay pending until the user answers a
    /// permission prompt; callers bound it with a timeout.
    async fn get_user_media(
        &self,
        constraints: MediaConstraints,
    ) -> Result<DeviceStream, CaptureError>;
}
