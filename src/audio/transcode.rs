use std::future::Future;
use std::io::Cursor;
use std::sync::Arc;
use std::time::Duration;

use futures::future::{self, BoxFuture, FutureExt};
use futures::stream::{FuturesOrdered, StreamExt};
use tokio::sync::mpsc;
use tracing::{debug, error};

use super::chunk::{AudioSlice, RawAudio, RawSlice};
use super::decode::decode_to_pcm;
use super::frame::AudioFrame;
use crate::error::CaptureError;

/// Output format of the transcoder
#[derive(Debug, Clone)]
pub struct TranscodeConfig {
    /// Target sample rate (narrowband speech models expect 8kHz)
    pub target_sample_rate: u32,
    /// Upper bound for converting one slice
    pub timeout: Duration,
}

impl Default for TranscodeConfig {
    fn default() -> Self {
        Self {
            target_sample_rate: 8000,
            timeout: Duration::from_secs(10),
        }
    }
}

/// Converts captured slices to mono 16-bit WAV at a fixed sample rate
#[derive(Debug, Clone)]
pub struct AudioTranscoder {
    config: TranscodeConfig,
}

impl AudioTranscoder {
    pub fn new(config: TranscodeConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &TranscodeConfig {
        &self.config
    }

    /// Transcode one slice. CPU bound; callers on the runtime should use
    /// [`OrderedTranscoder`] which moves the work to the blocking pool.
    pub fn transcode(&self, raw: RawSlice) -> Result<AudioSlice, CaptureError> {
        let failure = |reason: String| CaptureError::TranscodeFailure {
            session_id: raw.session_id.as_u64(),
            index: raw.index,
            reason,
        };

        let frame = match &raw.audio {
            RawAudio::Pcm {
                samples,
                sample_rate,
                channels,
            } => AudioFrame {
                samples: samples.clone(),
                sample_rate: *sample_rate,
                channels: *channels,
                timestamp_ms: raw.start_ms,
            },
            RawAudio::Encoded { bytes, extension } => {
                decode_to_pcm(bytes, extension.as_deref()).map_err(failure)?
            }
        };

        if frame.sample_rate == 0 || frame.channels == 0 {
            return Err(failure(format!(
                "invalid input format ({}Hz, {} channels)",
                frame.sample_rate, frame.channels
            )));
        }

        let mono = downmix_to_mono(frame);
        let resampled = resample(mono, self.config.target_sample_rate);
        let payload = encode_wav(&resampled).map_err(|e| failure(e.to_string()))?;

        debug!(
            "Transcoded slice {} of session {}: {} samples -> {} bytes",
            raw.index,
            raw.session_id,
            resampled.samples.len(),
            payload.len()
        );

        Ok(AudioSlice {
            session_id: raw.session_id,
            index: raw.index,
            payload,
            is_final: false,
        })
    }
}

/// Average interleaved channels into one
pub fn downmix_to_mono(frame: AudioFrame) -> AudioFrame {
    if frame.channels <= 1 {
        return frame;
    }

    let channels = frame.channels as usize;
    let mono_samples = frame
        .samples
        .chunks_exact(channels)
        .map(|chunk| {
            let sum: i32 = chunk.iter().map(|&s| s as i32).sum();
            (sum / channels as i32) as i16
        })
        .collect();

    AudioFrame {
        samples: mono_samples,
        sample_rate: frame.sample_rate,
        channels: 1,
        timestamp_ms: frame.timestamp_ms,
    }
}

/// Resample a mono frame by linear interpolation.
///
/// When downsampling, each output sample first averages the input window it
/// covers so content above the new Nyquist rate is attenuated.
pub fn resample(frame: AudioFrame, target_rate: u32) -> AudioFrame {
    if frame.sample_rate == target_rate || frame.samples.is_empty() || target_rate == 0 {
        return AudioFrame {
            sample_rate: if target_rate == 0 { frame.sample_rate } else { target_rate },
            ..frame
        };
    }

    let ratio = frame.sample_rate as f64 / target_rate as f64;
    let input = &frame.samples;
    let out_len = (input.len() as u64 * target_rate as u64 / frame.sample_rate as u64) as usize;
    let mut output = Vec::with_capacity(out_len);

    for i in 0..out_len {
        let position = i as f64 * ratio;
        let sample = if ratio > 1.0 {
            let start = (position.floor() as usize).min(input.len() - 1);
            let end = ((position + ratio).ceil() as usize).min(input.len()).max(start + 1);
            let window = &input[start..end];
            window.iter().map(|&s| s as f64).sum::<f64>() / window.len() as f64
        } else {
            let base = position.floor() as usize;
            let next = (base + 1).min(input.len() - 1);
            let frac = position - base as f64;
            input[base] as f64 * (1.0 - frac) + input[next] as f64 * frac
        };
        output.push(sample.round().clamp(i16::MIN as f64, i16::MAX as f64) as i16);
    }

    AudioFrame {
        samples: output,
        sample_rate: target_rate,
        channels: frame.channels,
        timestamp_ms: frame.timestamp_ms,
    }
}

/// Encode a frame as a 16-bit PCM WAV container in memory
pub fn encode_wav(frame: &AudioFrame) -> Result<Vec<u8>, hound::Error> {
    let spec = hound::WavSpec {
        channels: frame.channels,
        sample_rate: frame.sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut cursor = Cursor::new(Vec::new());
    {
        let mut writer = hound::WavWriter::new(&mut cursor, spec)?;
        for &sample in &frame.samples {
            writer.write_sample(sample)?;
        }
        writer.finalize()?;
    }

    Ok(cursor.into_inner())
}

/// Work item for the ordered transcoding stage
#[derive(Debug)]
pub enum SliceJob {
    /// A captured slice to convert
    Transcode(RawSlice),
    /// The end-of-stream marker; forwarded untouched, after every earlier job
    Terminal(AudioSlice),
}

/// Runs slice conversions concurrently on the blocking pool while forwarding
/// results strictly in submission order.
pub struct OrderedTranscoder {
    transcoder: Arc<AudioTranscoder>,
}

impl OrderedTranscoder {
    pub fn new(transcoder: Arc<AudioTranscoder>) -> Self {
        Self { transcoder }
    }

    /// Drain `jobs` until the sender is dropped and every pending conversion
    /// has been forwarded. `on_slice` receives each successful slice in order;
    /// `on_failure` receives each dropped slice's error in order.
    pub async fn run<S, SFut, F>(
        self,
        mut jobs: mpsc::UnboundedReceiver<SliceJob>,
        mut on_slice: S,
        mut on_failure: F,
    ) where
        S: FnMut(AudioSlice) -> SFut,
        SFut: Future<Output = ()>,
        F: FnMut(CaptureError),
    {
        let mut pending: FuturesOrdered<BoxFuture<'static, Result<AudioSlice, CaptureError>>> =
            FuturesOrdered::new();
        let mut accepting = true;

        loop {
            tokio::select! {
                job = jobs.recv(), if accepting => match job {
                    Some(job) => pending.push_back(self.schedule(job)),
                    None => accepting = false,
                },
                Some(outcome) = pending.next(), if !pending.is_empty() => match outcome {
                    Ok(slice) => on_slice(slice).await,
                    Err(e) => {
                        error!("Dropping slice: {}", e);
                        on_failure(e);
                    }
                },
                else => break,
            }
        }
    }

    fn schedule(&self, job: SliceJob) -> BoxFuture<'static, Result<AudioSlice, CaptureError>> {
        match job {
            SliceJob::Terminal(slice) => future::ready(Ok(slice)).boxed(),
            SliceJob::Transcode(raw) => {
                let transcoder = Arc::clone(&self.transcoder);
                let limit = transcoder.config().timeout;
                let session_id = raw.session_id.as_u64();
                let index = raw.index;

                let handle = tokio::task::spawn_blocking(move || transcoder.transcode(raw));

                async move {
                    match tokio::time::timeout(limit, handle).await {
                        Ok(Ok(result)) => result,
                        Ok(Err(join_error)) => Err(CaptureError::TranscodeFailure {
                            session_id,
                            index,
                            reason: format!("transcode task failed: {}", join_error),
                        }),
                        Err(_) => Err(CaptureError::TranscodeTimeout {
                            session_id,
                            index,
                            limit,
                        }),
                    }
                }
                .boxed()
            }
        }
    }
}
