use std::future::Future;
use std::io::Cursor;
use std::sync::Arc;
use std::time::Duration;

use base64::Engine;
use chrono::{DateTime, Utc};
use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::{ImageBuffer, ImageFormat, Rgb};
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};

use super::device::{VideoFrame, VideoSource};
use crate::error::CaptureError;

/// Encoding used for still snapshots
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StillFormat {
    #[default]
    Jpeg,
    Png,
    Webp,
}

impl StillFormat {
    pub fn mime_type(&self) -> &'static str {
        match self {
            StillFormat::Jpeg => "image/jpeg",
            StillFormat::Png => "image/png",
            StillFormat::Webp => "image/webp",
        }
    }

    fn image_format(&self) -> ImageFormat {
        match self {
            StillFormat::Jpeg => ImageFormat::Jpeg,
            StillFormat::Png => ImageFormat::Png,
            StillFormat::Webp => ImageFormat::WebP,
        }
    }
}

#[derive(Debug, Clone)]
pub struct FrameSamplerConfig {
    /// Delay between the end of one frame's handling and the next grab
    pub interval: Duration,
    /// Width of the offscreen surface; height follows the video's aspect ratio
    pub width: u32,
    pub format: StillFormat,
    /// JPEG quality (1-100)
    pub jpeg_quality: u8,
}

impl Default for FrameSamplerConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_millis(3000),
            width: 640,
            format: StillFormat::Jpeg,
            jpeg_quality: 92,
        }
    }
}

/// One encoded still grabbed from the video track
#[derive(Debug, Clone, PartialEq)]
pub struct StillImage {
    pub captured_at: DateTime<Utc>,
    /// `data:<mime>;base64,<payload>`
    pub data_url: String,
    pub width: u32,
    pub height: u32,
}

/// Periodically grabs stills from a video track.
///
/// The first grab happens on start. Each following grab is scheduled one
/// `interval` after the previous `on_frame` future completed, so handlers
/// never overlap and a slow handler stretches the cadence instead of
/// queueing frames. Dropping the sampler stops it.
pub struct FrameSampler {
    stop_tx: watch::Sender<bool>,
    task: Option<JoinHandle<()>>,
}

impl FrameSampler {
    pub fn start<F, Fut>(source: VideoSource, config: FrameSamplerConfig, mut on_frame: F) -> Self
    where
        F: FnMut(StillImage) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let (stop_tx, mut stop_rx) = watch::channel(false);

        let task = tokio::spawn(async move {
            debug!("Frame sampler started ({:?} cadence)", config.interval);

            loop {
                if *stop_rx.borrow() {
                    break;
                }

                let frame = source.borrow().clone();
                match frame {
                    None => debug!("No video frame available yet, skipping grab"),
                    Some(frame) => match grab_still(frame, config.clone()).await {
                        Ok(still) => {
                            if *stop_rx.borrow() {
                                break;
                            }
                            on_frame(still).await;
                        }
                        Err(e) => warn!("Frame grab failed: {}", e),
                    },
                }

                tokio::select! {
                    _ = tokio::time::sleep(config.interval) => {}
                    changed = stop_rx.changed() => {
                        if changed.is_err() {
                            break;
                        }
                    }
                }
            }

            debug!("Frame sampler stopped");
        });

        Self {
            stop_tx,
            task: Some(task),
        }
    }

    /// Cancel all future grabs. Takes effect immediately; a handler that is
    /// already running finishes.
    pub fn stop(&self) {
        self.stop_tx.send_replace(true);
    }

    pub fn is_active(&self) -> bool {
        !*self.stop_tx.borrow()
            && self
                .task
                .as_ref()
                .map(|task| !task.is_finished())
                .unwrap_or(false)
    }

    /// Stop and wait for the sampling task to exit
    pub async fn join(mut self) {
        self.stop();
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                error!("Frame sampler task panicked: {}", e);
            }
        }
    }
}

impl Drop for FrameSampler {
    fn drop(&mut self) {
        self.stop_tx.send_replace(true);
    }
}

async fn grab_still(
    frame: Arc<VideoFrame>,
    config: FrameSamplerConfig,
) -> Result<StillImage, CaptureError> {
    tokio::task::spawn_blocking(move || render_still(&frame, &config))
        .await
        .map_err(|e| CaptureError::FrameEncode(format!("encode task failed: {}", e)))?
}

/// Draw a video frame onto a surface `config.width` wide, keeping the
/// frame's native aspect ratio, and encode it as a data URL.
pub fn render_still(
    frame: &VideoFrame,
    config: &FrameSamplerConfig,
) -> Result<StillImage, CaptureError> {
    if frame.width == 0 || frame.height == 0 {
        return Err(CaptureError::FrameEncode("video has no dimensions".to_string()));
    }

    let source =
        ImageBuffer::<Rgb<u8>, &[u8]>::from_raw(frame.width, frame.height, frame.rgb.as_slice())
            .ok_or_else(|| {
                CaptureError::FrameEncode(format!(
                    "expected {} bytes for {}x{} RGB, got {}",
                    frame.width as usize * frame.height as usize * 3,
                    frame.width,
                    frame.height,
                    frame.rgb.len()
                ))
            })?;

    let aspect_ratio = frame.width as f64 / frame.height as f64;
    let width = config.width.max(1);
    let height = ((width as f64 / aspect_ratio).round() as u32).max(1);

    let surface = image::imageops::resize(&source, width, height, FilterType::Triangle);

    let mut encoded = Cursor::new(Vec::new());
    let written = match config.format {
        StillFormat::Jpeg => JpegEncoder::new_with_quality(&mut encoded, config.jpeg_quality)
            .encode_image(&surface),
        other => surface.write_to(&mut encoded, other.image_format()),
    };
    written.map_err(|e| CaptureError::FrameEncode(e.to_string()))?;

    let payload = base64::engine::general_purpose::STANDARD.encode(encoded.get_ref());

    Ok(StillImage {
        captured_at: Utc::now(),
        data_url: format!("data:{};base64,{}", config.format.mime_type(), payload),
        width,
        height,
    })
}
