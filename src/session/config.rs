use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::audio::{ChunkConfig, TranscodeConfig};
use crate::media::{FrameSamplerConfig, StillFormat};
use crate::transport::RetryPolicy;

/// Configuration for the recording sessions of one controller
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Amount of captured audio in each slice
    /// Default: 3 seconds
    #[serde(with = "duration_ms")]
    pub slice_duration: Duration,

    /// Delay between handling one still and grabbing the next
    /// Default: 3 seconds
    #[serde(with = "duration_ms")]
    pub frame_interval: Duration,

    /// Sample rate of transcoded slices (8kHz narrowband speech)
    pub target_sample_rate: u32,

    /// Upper bound for transcoding one slice
    #[serde(with = "duration_ms")]
    pub transcode_timeout: Duration,

    pub still_format: StillFormat,

    /// Width of still snapshots in pixels
    pub still_width: u32,

    pub jpeg_quality: u8,

    /// Retries for each outbound message
    pub retry: RetryPolicy,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            slice_duration: Duration::from_millis(3000),
            frame_interval: Duration::from_millis(3000),
            target_sample_rate: 8000,
            transcode_timeout: Duration::from_secs(10),
            still_format: StillFormat::Jpeg,
            still_width: 640,
            jpeg_quality: 92,
            retry: RetryPolicy::default(),
        }
    }
}

impl SessionConfig {
    pub fn chunk_config(&self) -> ChunkConfig {
        ChunkConfig {
            slice_duration: self.slice_duration,
        }
    }

    pub fn transcode_config(&self) -> TranscodeConfig {
        TranscodeConfig {
            target_sample_rate: self.target_sample_rate,
            timeout: self.transcode_timeout,
        }
    }

    pub fn frame_sampler_config(&self) -> FrameSamplerConfig {
        FrameSamplerConfig {
            interval: self.frame_interval,
            width: self.still_width,
            format: self.still_format,
            jpeg_quality: self.jpeg_quality,
        }
    }
}

/// (De)serialize a `Duration` as integer milliseconds
pub mod duration_ms {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}
