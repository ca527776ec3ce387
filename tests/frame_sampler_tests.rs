// Integration tests for periodic still sampling
//
// These tests verify the self-rescheduling cadence of the FrameSampler:
// callbacks never overlap, a slow callback stretches the cadence, and no
// callback starts after stop.

use base64::Engine;
use session_capture::media::frame_sampler::render_still;
use session_capture::media::{FrameSampler, FrameSamplerConfig, StillFormat, VideoFrame};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Mutex};
use tokio::time::Instant;

fn video_frame(width: u32, height: u32) -> VideoFrame {
    VideoFrame {
        width,
        height,
        rgb: (0..width * height * 3).map(|i| (i % 251) as u8).collect(),
        timestamp_ms: 0,
    }
}

fn config(interval_ms: u64) -> FrameSamplerConfig {
    FrameSamplerConfig {
        interval: Duration::from_millis(interval_ms),
        width: 64,
        ..FrameSamplerConfig::default()
    }
}

type Spans = Arc<Mutex<Vec<(Instant, Instant)>>>;

/// Start a sampler whose callback takes `work` to complete, recording when
/// each callback started and finished
fn sampler_with_work(
    source: watch::Receiver<Option<Arc<VideoFrame>>>,
    interval_ms: u64,
    work: Duration,
) -> (FrameSampler, Spans) {
    let spans: Spans = Arc::new(Mutex::new(Vec::new()));
    let recorded = Arc::clone(&spans);

    let sampler = FrameSampler::start(source, config(interval_ms), move |_still| {
        let recorded = Arc::clone(&recorded);
        async move {
            let started = Instant::now();
            tokio::time::sleep(work).await;
            recorded.lock().await.push((started, Instant::now()));
        }
    });

    (sampler, spans)
}

#[tokio::test(start_paused = true)]
async fn test_first_grab_is_immediate() {
    let (_tx, rx) = watch::channel(Some(Arc::new(video_frame(32, 24))));
    let start = Instant::now();

    let (sampler, spans) = sampler_with_work(rx, 3000, Duration::ZERO);
    tokio::time::sleep(Duration::from_millis(100)).await;
    sampler.join().await;

    let spans = spans.lock().await;
    assert_eq!(spans.len(), 1);
    assert!(spans[0].0 - start < Duration::from_millis(3000));
}

#[tokio::test(start_paused = true)]
async fn test_callbacks_never_overlap_and_slow_handler_stretches_cadence() {
    // Setup: 1s interval, each callback takes 1.5s
    let (_tx, rx) = watch::channel(Some(Arc::new(video_frame(32, 24))));
    let (sampler, spans) = sampler_with_work(rx, 1000, Duration::from_millis(1500));

    tokio::time::sleep(Duration::from_secs(12)).await;
    sampler.join().await;

    let spans = spans.lock().await;

    // Verify: one grab every 2.5s (1.5s of work + 1s of delay)
    assert_eq!(spans.len(), 5);
    for pair in spans.windows(2) {
        let (_, previous_end) = pair[0];
        let (next_start, _) = pair[1];
        assert!(next_start >= previous_end, "callbacks overlapped");
        assert!(next_start - previous_end >= Duration::from_millis(1000));
    }
}

#[tokio::test(start_paused = true)]
async fn test_no_callback_after_stop() {
    let (_tx, rx) = watch::channel(Some(Arc::new(video_frame(32, 24))));
    let (sampler, spans) = sampler_with_work(rx, 1000, Duration::ZERO);

    tokio::time::sleep(Duration::from_millis(2500)).await;
    sampler.stop();
    assert!(!sampler.is_active());

    let seen = spans.lock().await.len();
    tokio::time::sleep(Duration::from_secs(10)).await;

    // Verify: grabs at 0s, 1s and 2s, none after the stop
    assert_eq!(seen, 3);
    assert_eq!(spans.lock().await.len(), seen);
    sampler.join().await;
}

#[tokio::test(start_paused = true)]
async fn test_ticks_without_video_are_skipped() {
    let (tx, rx) = watch::channel(None);
    let (sampler, spans) = sampler_with_work(rx, 1000, Duration::ZERO);

    tokio::time::sleep(Duration::from_millis(1500)).await;
    assert!(spans.lock().await.is_empty());

    // The camera warms up; the next tick (at 2s) grabs
    tx.send_replace(Some(Arc::new(video_frame(32, 24))));
    tokio::time::sleep(Duration::from_millis(1000)).await;

    assert_eq!(spans.lock().await.len(), 1);
    sampler.join().await;
}

#[test]
fn test_still_keeps_native_aspect_ratio() {
    let frame = video_frame(320, 240);
    let config = FrameSamplerConfig {
        width: 640,
        ..FrameSamplerConfig::default()
    };

    let still = render_still(&frame, &config).unwrap();

    assert_eq!((still.width, still.height), (640, 480));
    assert!(still.data_url.starts_with("data:image/jpeg;base64,"));

    let (_, payload) = still.data_url.split_once(',').unwrap();
    let bytes = base64::engine::general_purpose::STANDARD
        .decode(payload)
        .unwrap();
    assert_eq!(&bytes[..2], &[0xFF, 0xD8], "JPEG start-of-image marker");
}

#[test]
fn test_still_as_png() {
    let frame = video_frame(160, 90);
    let config = FrameSamplerConfig {
        width: 320,
        format: StillFormat::Png,
        ..FrameSamplerConfig::default()
    };

    let still = render_still(&frame, &config).unwrap();

    assert_eq!((still.width, still.height), (320, 180));
    assert!(still.data_url.starts_with("data:image/png;base64,"));

    let (_, payload) = still.data_url.split_once(',').unwrap();
    let bytes = base64::engine::general_purpose::STANDARD
        .decode(payload)
        .unwrap();
    let decoded = image::load_from_memory(&bytes).unwrap();
    assert_eq!((decoded.width(), decoded.height()), (320, 180));
}

#[test]
fn test_still_rejects_truncated_frame() {
    let mut frame = video_frame(32, 24);
    frame.rgb.truncate(100);

    let err = render_still(&frame, &FrameSamplerConfig::default()).unwrap_err();
    assert!(err.to_string().contains("expected 2304 bytes"));
}
