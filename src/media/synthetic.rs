// Synthetic camera/microphone
//
// Produces a sine tone and a scrolling RGB gradient on Tokio timers. Used by
// the CLI demo and the test suite in place of real hardware; it can also
// delay the grant (a user pondering the permission prompt) or deny it.

use std::f64::consts::PI;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, watch};
use tracing::{debug, info};

use super::device::{DeviceStream, MediaConstraints, MediaDevices, TrackControl, VideoFrame};
use crate::audio::AudioFrame;
use crate::error::CaptureError;

#[derive(Debug, Clone)]
pub struct SyntheticConfig {
    pub sample_rate: u32,
    pub channels: u16,
    /// Audio/video production period
    pub frame_duration: Duration,
    pub tone_hz: f64,
    pub width: u32,
    pub height: u32,
    /// How long the "permission prompt" stays open
    pub grant_delay: Duration,
    /// Deny access with this reason instead of granting
    pub deny: Option<String>,
}

impl Default for SyntheticConfig {
    fn default() -> Self {
        Self {
            sample_rate: 48000,
            channels: 1,
            frame_duration: Duration::from_millis(100),
            tone_hz: 440.0,
            width: 320,
            height: 240,
            grant_delay: Duration::ZERO,
            deny: None,
        }
    }
}

pub struct SyntheticDevices {
    config: SyntheticConfig,
    requests: AtomicUsize,
    releases: Arc<AtomicUsize>,
}

impl SyntheticDevices {
    pub fn new(config: SyntheticConfig) -> Self {
        Self {
            config,
            requests: AtomicUsize::new(0),
            releases: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn denying(reason: impl Into<String>) -> Self {
        Self::new(SyntheticConfig {
            deny: Some(reason.into()),
            ..Default::default()
        })
    }

    /// Number of `get_user_media` calls so far
    pub fn request_count(&self) -> usize {
        self.requests.load(Ordering::SeqCst)
    }

    /// Number of streams whose tracks have been stopped
    pub fn release_count(&self) -> usize {
        self.releases.load(Ordering::SeqCst)
    }
}

impl Default for SyntheticDevices {
    fn default() -> Self {
        Self::new(SyntheticConfig::default())
    }
}

#[async_trait::async_trait]
impl MediaDevices for SyntheticDevices {
    async fn get_user_media(
        &self,
        constraints: MediaConstraints,
    ) -> Result<DeviceStream, CaptureError> {
        self.requests.fetch_add(1, Ordering::SeqCst);

        if !self.config.grant_delay.is_zero() {
            tokio::time::sleep(self.config.grant_delay).await;
        }

        if let Some(reason) = &self.config.deny {
            return Err(CaptureError::AcquisitionDenied(reason.clone()));
        }

        if !constraints.audio && !constraints.video {
            return Err(CaptureError::AcquisitionDenied(
                "no audio or video track requested".to_string(),
            ));
        }

        let audio_tx = constraints.audio.then(|| broadcast::channel(64).0);
        let (video_tx, video_rx) = watch::channel(None);
        let (stop_tx, stop_rx) = watch::channel(false);

        tokio::spawn(produce(
            self.config.clone(),
            audio_tx.clone(),
            constraints.video.then_some(video_tx),
            stop_rx,
        ));

        info!(
            "Synthetic device granted (audio={}, video={})",
            constraints.audio, constraints.video
        );

        Ok(DeviceStream::new(
            audio_tx,
            constraints.video.then_some(video_rx),
            SyntheticTracks {
                stop_tx,
                releases: Arc::clone(&self.releases),
            },
        ))
    }
}

struct SyntheticTracks {
    stop_tx: watch::Sender<bool>,
    releases: Arc<AtomicUsize>,
}

impl TrackControl for SyntheticTracks {
    fn stop(&self) {
        self.stop_tx.send_replace(true);
        self.releases.fetch_add(1, Ordering::SeqCst);
    }
}

async fn produce(
    config: SyntheticConfig,
    audio_tx: Option<broadcast::Sender<AudioFrame>>,
    video_tx: Option<watch::Sender<Option<Arc<VideoFrame>>>>,
    mut stop_rx: watch::Receiver<bool>,
) {
    let mut ticker = tokio::time::interval(config.frame_duration);
    let frame_ms = config.frame_duration.as_millis() as u64;
    let frames_per_tick = (config.sample_rate as u64 * frame_ms / 1000) as usize;
    let mut tick: u64 = 0;

    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            changed = stop_rx.changed() => {
                if changed.is_err() || *stop_rx.borrow() {
                    break;
                }
                continue;
            }
        }

        let timestamp_ms = tick * frame_ms;

        if let Some(tx) = &audio_tx {
            let offset = tick as usize * frames_per_tick;
            let _ = tx.send(AudioFrame {
                samples: sine(&config, offset, frames_per_tick),
                sample_rate: config.sample_rate,
                channels: config.channels,
                timestamp_ms,
            });
        }

        if let Some(tx) = &video_tx {
            tx.send_replace(Some(Arc::new(gradient(&config, tick, timestamp_ms))));
        }

        tick += 1;
    }

    debug!("Synthetic producer stopped after {} ticks", tick);
}

fn sine(config: &SyntheticConfig, offset: usize, frames: usize) -> Vec<i16> {
    let mut samples = Vec::with_capacity(frames * config.channels as usize);
    for n in offset..offset + frames {
        let t = n as f64 / config.sample_rate as f64;
        let value = ((2.0 * PI * config.tone_hz * t).sin() * i16::MAX as f64 * 0.25) as i16;
        for _ in 0..config.channels {
            samples.push(value);
        }
    }
    samples
}

fn gradient(config: &SyntheticConfig, tick: u64, timestamp_ms: u64) -> VideoFrame {
    let (width, height) = (config.width, config.height);
    let mut rgb = Vec::with_capacity(width as usize * height as usize * 3);
    for y in 0..height {
        for x in 0..width {
            rgb.push(((x as u64 + tick * 4) % 256) as u8);
            rgb.push((y * 255 / height.max(1)) as u8);
            rgb.push((tick % 256) as u8);
        }
    }
    VideoFrame {
        width,
        height,
        rgb,
        timestamp_ms,
    }
}
