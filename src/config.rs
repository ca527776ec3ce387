use anyhow::{ensure, Context, Result};
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

use crate::media::StillFormat;
use crate::session::SessionConfig;
use crate::transport::RetryPolicy;

/// Environment variables override the file: `SESSION_CAPTURE__CAPTURE__SLICE_MS=5000`
pub const ENV_PREFIX: &str = "SESSION_CAPTURE";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub service: ServiceConfig,
    pub capture: CaptureSettings,
    pub transport: TransportConfig,
    pub analysis: AnalysisConfig,
    pub speech: SpeechConfig,
    pub ingest: IngestConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    pub name: String,
    pub http: HttpConfig,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            name: "session-capture".to_string(),
            http: HttpConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    pub bind: String,
    pub port: u16,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1".to_string(),
            port: 3000,
        }
    }
}

/// Capture pipeline tuning
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CaptureSettings {
    pub slice_ms: u64,
    pub frame_interval_ms: u64,
    pub target_sample_rate: u32,
    pub still_format: StillFormat,
    pub still_width: u32,
    pub jpeg_quality: u8,
    /// How long to wait for the device (and the user's permission)
    pub acquire_timeout_ms: u64,
    pub transcode_timeout_ms: u64,
    /// Attempts per outbound message, including the first
    pub emit_attempts: u32,
    pub emit_backoff_ms: u64,
}

impl Default for CaptureSettings {
    fn default() -> Self {
        Self {
            slice_ms: 3000,
            frame_interval_ms: 3000,
            target_sample_rate: 8000,
            still_format: StillFormat::Jpeg,
            still_width: 640,
            jpeg_quality: 92,
            acquire_timeout_ms: 30_000,
            transcode_timeout_ms: 10_000,
            emit_attempts: 3,
            emit_backoff_ms: 200,
        }
    }
}

impl CaptureSettings {
    pub fn acquire_timeout(&self) -> Duration {
        Duration::from_millis(self.acquire_timeout_ms)
    }

    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            slice_duration: Duration::from_millis(self.slice_ms),
            frame_interval: Duration::from_millis(self.frame_interval_ms),
            target_sample_rate: self.target_sample_rate,
            transcode_timeout: Duration::from_millis(self.transcode_timeout_ms),
            still_format: self.still_format,
            still_width: self.still_width,
            jpeg_quality: self.jpeg_quality,
            retry: RetryPolicy {
                max_attempts: self.emit_attempts,
                backoff: Duration::from_millis(self.emit_backoff_ms),
            },
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TransportConfig {
    pub nats_url: String,
    /// Subjects are `<prefix>.audio`, `<prefix>.file` and `<prefix>.events.*`
    pub subject_prefix: String,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            nats_url: "nats://localhost:4222".to_string(),
            subject_prefix: "capture".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    pub endpoint: String,
    pub username: String,
    pub password: String,
    /// API version date sent as the `version` query parameter
    pub version: String,
    pub timeout_ms: u64,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://gateway.watsonplatform.net/tone-analyzer/api".to_string(),
            username: String::new(),
            password: String::new(),
            version: "2016-05-19".to_string(),
            timeout_ms: 15_000,
        }
    }
}

/// Speech-to-text pass over completed recordings (`serve` only)
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SpeechConfig {
    pub enabled: bool,
    pub endpoint: String,
    pub username: String,
    pub password: String,
    /// Recognition model; narrowband matches the 8kHz recordings
    pub model: String,
    pub timeout_ms: u64,
}

impl Default for SpeechConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            endpoint: "https://stream.watsonplatform.net/speech-to-text/api".to_string(),
            username: String::new(),
            password: String::new(),
            model: "en-US_NarrowbandModel".to_string(),
            timeout_ms: 60_000,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct IngestConfig {
    /// Where completed recordings are written
    pub recordings_path: PathBuf,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            recordings_path: PathBuf::from("recordings"),
        }
    }
}

impl Config {
    /// Load `path` (any format the `config` crate knows, extension optional)
    /// if it exists, then apply `SESSION_CAPTURE__*` environment overrides
    pub fn load(path: &str) -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::with_name(path).required(false))
            .add_source(config::Environment::with_prefix(ENV_PREFIX).separator("__"))
            .build()
            .with_context(|| format!("Failed to load configuration from {}", path))?;

        let cfg: Self = settings
            .try_deserialize()
            .context("Failed to parse configuration")?;

        cfg.validate()
            .with_context(|| format!("Invalid configuration in {}", path))?;

        Ok(cfg)
    }

    /// Reject values the pipeline cannot run with
    pub fn validate(&self) -> Result<()> {
        let capture = &self.capture;

        ensure!(capture.slice_ms > 0, "capture.slice_ms must be greater than zero");
        ensure!(
            capture.frame_interval_ms > 0,
            "capture.frame_interval_ms must be greater than zero"
        );
        ensure!(
            capture.target_sample_rate > 0,
            "capture.target_sample_rate must be greater than zero"
        );
        ensure!(capture.still_width > 0, "capture.still_width must be greater than zero");
        ensure!(
            (1..=100).contains(&capture.jpeg_quality),
            "capture.jpeg_quality must be between 1 and 100"
        );

        Ok(())
    }
}
