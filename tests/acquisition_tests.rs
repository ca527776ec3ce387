// Integration tests for shared device acquisition
//
// These tests verify that every consumer of a MediaAcquisition sees the
// same stream (or the same failure), that at most one request is in flight,
// and that the stream is released exactly once, by the last detach.

use proptest::prelude::*;
use session_capture::error::CaptureError;
use session_capture::media::{
    MediaAcquisition, MediaConstraints, StreamState, SyntheticConfig, SyntheticDevices,
};
use std::sync::Arc;
use std::time::Duration;

fn acquisition(devices: &Arc<SyntheticDevices>, timeout: Duration) -> MediaAcquisition {
    MediaAcquisition::new(devices.clone(), MediaConstraints::default(), timeout)
}

fn delayed(grant_delay: Duration) -> Arc<SyntheticDevices> {
    Arc::new(SyntheticDevices::new(SyntheticConfig {
        grant_delay,
        ..SyntheticConfig::default()
    }))
}

#[tokio::test(start_paused = true)]
async fn test_consumers_attached_while_pending_share_one_request() {
    // Setup: the user takes a second to grant access
    let devices = delayed(Duration::from_secs(1));
    let acquisition = acquisition(&devices, Duration::from_secs(30));

    let first = acquisition.attach();
    let second = acquisition.attach();

    assert_eq!(first.state(), StreamState::Pending);
    assert_eq!(second.state(), StreamState::Pending);

    let a = first.ready().await.unwrap();
    let b = second.ready().await.unwrap();

    // Verify: one request, one stream, seen by both
    assert_eq!(devices.request_count(), 1);
    assert_eq!(a, b);
    assert_eq!(acquisition.consumer_count(), 2);
}

#[tokio::test]
async fn test_late_consumer_receives_existing_stream() {
    let devices = Arc::new(SyntheticDevices::default());
    let acquisition = acquisition(&devices, Duration::from_secs(30));

    let first = acquisition.attach();
    let stream = first.ready().await.unwrap();

    let late = acquisition.attach();

    assert_eq!(late.state(), StreamState::Ready(stream.clone()));
    assert_eq!(devices.request_count(), 1);
}

#[tokio::test]
async fn test_last_detach_releases_stream_once() {
    let devices = Arc::new(SyntheticDevices::default());
    let acquisition = acquisition(&devices, Duration::from_secs(30));

    let first = acquisition.attach();
    let second = acquisition.attach();
    let stream = first.ready().await.unwrap();

    first.detach();
    assert_eq!(devices.release_count(), 0);
    assert!(!stream.is_stopped());

    drop(second);
    assert_eq!(devices.release_count(), 1);
    assert!(stream.is_stopped());
    assert!(!acquisition.is_request_in_flight());
    assert_eq!(acquisition.current_stream(), None);
}

#[tokio::test]
async fn test_attach_after_release_acquires_again() {
    let devices = Arc::new(SyntheticDevices::default());
    let acquisition = acquisition(&devices, Duration::from_secs(30));

    let first = acquisition.attach();
    let old = first.ready().await.unwrap();
    first.detach();

    let again = acquisition.attach();
    let new = again.ready().await.unwrap();

    assert_eq!(devices.request_count(), 2);
    assert_ne!(old.id(), new.id());
    assert!(!new.is_stopped());
}

#[tokio::test]
async fn test_denied_access_reaches_every_consumer() {
    let devices = Arc::new(SyntheticDevices::denying("blocked by user"));
    let acquisition = acquisition(&devices, Duration::from_secs(30));

    let first = acquisition.attach();
    let err = first.ready().await.unwrap_err();
    assert_eq!(err, CaptureError::AcquisitionDenied("blocked by user".to_string()));

    // Verify: a late consumer gets the recorded failure without a new request
    let late = acquisition.attach();
    assert_eq!(late.state(), StreamState::Failed(err.clone()));
    assert_eq!(devices.request_count(), 1);

    // Verify: once everyone has left, the next attach asks again
    drop(first);
    drop(late);

    let retry = acquisition.attach();
    assert!(retry.ready().await.is_err());
    assert_eq!(devices.request_count(), 2);
    assert_eq!(devices.release_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_acquisition_times_out() {
    let devices = delayed(Duration::from_secs(60));
    let acquisition = acquisition(&devices, Duration::from_secs(5));

    let consumer = acquisition.attach();
    let err = consumer.ready().await.unwrap_err();

    assert_eq!(err, CaptureError::AcquisitionTimeout(Duration::from_secs(5)));
}

#[tokio::test(start_paused = true)]
async fn test_stream_granted_after_everyone_left_is_released() {
    let devices = delayed(Duration::from_secs(1));
    let acquisition = acquisition(&devices, Duration::from_secs(30));

    let consumer = acquisition.attach();
    consumer.detach();

    tokio::time::sleep(Duration::from_secs(2)).await;

    assert_eq!(devices.request_count(), 1);
    assert_eq!(devices.release_count(), 1);
    assert_eq!(acquisition.current_stream(), None);
    assert!(!acquisition.is_request_in_flight());
}

#[tokio::test(start_paused = true)]
async fn test_reattach_while_pending_reuses_the_request() {
    // Setup: the first consumer leaves before the user answers the prompt
    let devices = delayed(Duration::from_secs(1));
    let acquisition = acquisition(&devices, Duration::from_secs(30));

    let first = acquisition.attach();
    tokio::time::sleep(Duration::from_millis(10)).await;
    first.detach();

    let second = acquisition.attach();
    tokio::time::sleep(Duration::from_millis(10)).await;

    // Verify: still the one request, and it is still pending
    assert_eq!(devices.request_count(), 1);
    assert!(acquisition.is_request_in_flight());
    assert_eq!(second.state(), StreamState::Pending);

    // Verify: the pending grant reaches the new consumer
    let stream = second.ready().await.unwrap();
    assert!(!stream.is_stopped());
    assert_eq!(devices.request_count(), 1);
    assert_eq!(devices.release_count(), 0);
    assert!(!acquisition.is_request_in_flight());

    drop(second);
    assert_eq!(devices.release_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_consumers_share_session_ids() {
    let devices = Arc::new(SyntheticDevices::default());
    let acquisition = acquisition(&devices, Duration::from_secs(30));

    let a = acquisition.session_ids();
    let b = acquisition.clone().session_ids();

    let ids: Vec<_> = (0..100)
        .flat_map(|_| [a.mint(), b.mint()])
        .collect();
    let mut unique = ids.clone();
    unique.sort();
    unique.dedup();

    assert_eq!(unique.len(), ids.len());
}

proptest! {
    /// The stream is released exactly once per run of consumers, and only
    /// when the last of them detaches
    #[test]
    fn stream_released_exactly_once_per_consumer_run(
        ops in prop::collection::vec(any::<bool>(), 1..40),
    ) {
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();

        rt.block_on(async {
            let devices = Arc::new(SyntheticDevices::default());
            let acquisition = acquisition(&devices, Duration::from_secs(5));

            let mut handles = Vec::new();
            let mut runs = 0;

            for attach in ops {
                if attach {
                    let handle = acquisition.attach();
                    prop_assert!(handle.ready().await.is_ok());
                    handles.push(handle);
                } else if !handles.is_empty() {
                    handles.remove(0).detach();
                    if handles.is_empty() {
                        runs += 1;
                    }
                }

                prop_assert_eq!(devices.release_count(), runs);
                prop_assert_eq!(
                    devices.request_count(),
                    runs + usize::from(!handles.is_empty())
                );
                prop_assert_eq!(acquisition.consumer_count(), handles.len());
            }

            Ok::<(), TestCaseError>(())
        })?;
    }
}
