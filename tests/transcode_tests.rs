// Integration tests for slice transcoding
//
// These tests verify that captured slices become mono 16-bit WAV at the
// target rate, and that the ordered stage forwards results in submission
// order with the terminal slice last, dropping failed slices.

use session_capture::audio::{
    AudioSlice, AudioTranscoder, OrderedTranscoder, RawAudio, RawSlice, SliceJob, TranscodeConfig,
};
use session_capture::error::CaptureError;
use session_capture::session::SessionId;
use std::io::Cursor;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

const SESSION: u64 = 1_700_000_000_000;

fn pcm_slice(index: u64, seconds: usize, sample_rate: u32, channels: u16) -> RawSlice {
    let frames = seconds * sample_rate as usize;
    let samples = (0..frames)
        .flat_map(|n| {
            let value = ((n as f64 / 20.0).sin() * 8000.0) as i16;
            std::iter::repeat(value).take(channels as usize)
        })
        .collect();

    RawSlice {
        session_id: SessionId::from(SESSION),
        index,
        start_ms: index * 3000,
        audio: RawAudio::Pcm {
            samples,
            sample_rate,
            channels,
        },
    }
}

fn garbage_slice(index: u64) -> RawSlice {
    RawSlice {
        session_id: SessionId::from(SESSION),
        index,
        start_ms: index * 3000,
        audio: RawAudio::Encoded {
            bytes: b"definitely not audio".to_vec(),
            extension: Some("ogg".to_string()),
        },
    }
}

fn read_wav(bytes: &[u8]) -> (hound::WavSpec, Vec<i16>) {
    let reader = hound::WavReader::new(Cursor::new(bytes.to_vec())).unwrap();
    let spec = reader.spec();
    let samples = reader.into_samples::<i16>().map(|s| s.unwrap()).collect();
    (spec, samples)
}

#[test]
fn test_pcm_slice_becomes_mono_wav_at_target_rate() {
    let transcoder = AudioTranscoder::new(TranscodeConfig::default());

    let slice = transcoder.transcode(pcm_slice(0, 3, 48000, 2)).unwrap();

    assert_eq!(slice.index, 0);
    assert!(!slice.is_final);

    let (spec, samples) = read_wav(&slice.payload);
    assert_eq!(spec.channels, 1);
    assert_eq!(spec.sample_rate, 8000);
    assert_eq!(spec.bits_per_sample, 16);
    assert_eq!(samples.len(), 24000);
}

#[test]
fn test_encoded_wav_slice_is_decoded() {
    // Setup: a 16kHz mono WAV as a browser recorder would hand it over
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate: 16000,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut cursor = Cursor::new(Vec::new());
    {
        let mut writer = hound::WavWriter::new(&mut cursor, spec).unwrap();
        for n in 0..16000 {
            writer.write_sample(((n % 64) * 100) as i16).unwrap();
        }
        writer.finalize().unwrap();
    }

    let raw = RawSlice {
        session_id: SessionId::from(SESSION),
        index: 3,
        start_ms: 9000,
        audio: RawAudio::Encoded {
            bytes: cursor.into_inner(),
            extension: Some("wav".to_string()),
        },
    };

    let slice = AudioTranscoder::new(TranscodeConfig::default())
        .transcode(raw)
        .unwrap();

    let (spec, samples) = read_wav(&slice.payload);
    assert_eq!(spec.sample_rate, 8000);
    assert_eq!(samples.len(), 8000);
    assert_eq!(slice.index, 3);
}

#[test]
fn test_undecodable_slice_fails_with_its_position() {
    let err = AudioTranscoder::new(TranscodeConfig::default())
        .transcode(garbage_slice(7))
        .unwrap_err();

    match err {
        CaptureError::TranscodeFailure {
            session_id, index, ..
        } => {
            assert_eq!(session_id, SESSION);
            assert_eq!(index, 7);
        }
        other => panic!("expected TranscodeFailure, got {:?}", other),
    }
}

#[tokio::test]
async fn test_ordered_stage_forwards_in_submission_order() {
    let transcoder = OrderedTranscoder::new(Arc::new(AudioTranscoder::new(
        TranscodeConfig::default(),
    )));
    let (tx, rx) = mpsc::unbounded_channel();

    // Setup: a long slice first so later ones finish converting earlier
    tx.send(SliceJob::Transcode(pcm_slice(0, 20, 48000, 2))).unwrap();
    tx.send(SliceJob::Transcode(pcm_slice(1, 1, 8000, 1))).unwrap();
    tx.send(SliceJob::Transcode(garbage_slice(2))).unwrap();
    tx.send(SliceJob::Transcode(pcm_slice(3, 1, 16000, 1))).unwrap();
    tx.send(SliceJob::Terminal(AudioSlice::terminal(
        SessionId::from(SESSION),
        4,
    )))
    .unwrap();
    drop(tx);

    let mut delivered = Vec::new();
    let mut failures = Vec::new();

    transcoder
        .run(
            rx,
            |slice| {
                delivered.push((slice.index, slice.is_final));
                async {}
            },
            |e| failures.push(e),
        )
        .await;

    // Verify: the failed slice is dropped, the rest keep their order
    assert_eq!(delivered, vec![(0, false), (1, false), (3, false), (4, true)]);
    assert_eq!(failures.len(), 1);
    assert!(matches!(
        failures[0],
        CaptureError::TranscodeFailure { index: 2, .. }
    ));
}

#[tokio::test]
async fn test_ordered_stage_waits_for_slow_consumer() {
    let transcoder = OrderedTranscoder::new(Arc::new(AudioTranscoder::new(
        TranscodeConfig::default(),
    )));
    let (tx, rx) = mpsc::unbounded_channel();

    for index in 0..4 {
        tx.send(SliceJob::Transcode(pcm_slice(index, 1, 8000, 1)))
            .unwrap();
    }
    drop(tx);

    let delivered = Arc::new(tokio::sync::Mutex::new(Vec::new()));

    transcoder
        .run(
            rx,
            |slice| {
                let delivered = Arc::clone(&delivered);
                async move {
                    tokio::time::sleep(Duration::from_millis(5)).await;
                    delivered.lock().await.push(slice.index);
                }
            },
            |e| panic!("unexpected failure: {}", e),
        )
        .await;

    assert_eq!(*delivered.lock().await, vec![0, 1, 2, 3]);
}

#[tokio::test]
async fn test_transcode_timeout_drops_slice() {
    let transcoder = OrderedTranscoder::new(Arc::new(AudioTranscoder::new(TranscodeConfig {
        timeout: Duration::ZERO,
        ..TranscodeConfig::default()
    })));
    let (tx, rx) = mpsc::unbounded_channel();

    tx.send(SliceJob::Transcode(pcm_slice(0, 30, 48000, 2))).unwrap();
    tx.send(SliceJob::Terminal(AudioSlice::terminal(
        SessionId::from(SESSION),
        1,
    )))
    .unwrap();
    drop(tx);

    let mut delivered = Vec::new();
    let mut failures = Vec::new();

    transcoder
        .run(
            rx,
            |slice| {
                delivered.push(slice.index);
                async {}
            },
            |e| failures.push(e),
        )
        .await;

    assert_eq!(delivered, vec![1]);
    assert!(matches!(
        failures[0],
        CaptureError::TranscodeTimeout { index: 0, .. }
    ));
}
