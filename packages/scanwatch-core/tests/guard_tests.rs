use std::time::Duration;

use scanwatch_core::{ControlError, GuardOutcome, RequestGuard, RequestKey};

#[tokio::test(start_paused = true)]
async fn concurrent_call_with_same_key_is_skipped() {
    let guard = RequestGuard::new();

    let slow = guard.call(RequestKey::StopScan, Duration::from_secs(30), async {
        tokio::time::sleep(Duration::from_secs(1)).await;
        Ok::<_, ControlError>("first")
    });
    let duplicate = guard.call(RequestKey::StopScan, Duration::from_secs(30), async {
        Ok::<_, ControlError>("second")
    });

    let (first, second) = tokio::join!(slow, duplicate);
    assert!(matches!(first, GuardOutcome::Completed(Ok("first"))));
    assert!(second.was_skipped());
    assert!(!guard.is_busy(RequestKey::StopScan));
}

#[tokio::test(start_paused = true)]
async fn different_keys_run_concurrently() {
    let guard = RequestGuard::new();

    let map = guard.call(RequestKey::NetworkMap, Duration::from_secs(30), async {
        tokio::time::sleep(Duration::from_secs(1)).await;
        Ok::<_, ControlError>(1)
    });
    let devices = guard.call(RequestKey::DeviceGrid, Duration::from_secs(30), async {
        tokio::time::sleep(Duration::from_secs(1)).await;
        Ok::<_, ControlError>(2)
    });

    let (a, b) = tokio::join!(map, devices);
    assert!(matches!(a, GuardOutcome::Completed(Ok(1))));
    assert!(matches!(b, GuardOutcome::Completed(Ok(2))));
}

#[tokio::test(start_paused = true)]
async fn timed_out_call_reports_key_and_releases_it() {
    let guard = RequestGuard::new();

    let outcome = guard
        .call(RequestKey::ScanState, Duration::from_secs(5), async {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok::<_, ControlError>(())
        })
        .await;

    match outcome {
        GuardOutcome::Completed(Err(ControlError::RequestTimeout { key, timeout_ms })) => {
            assert_eq!(key, "scan-state");
            assert_eq!(timeout_ms, 5_000);
        }
        other => panic!("expected a timeout, got {other:?}"),
    }

    // The key must be free for a retry.
    assert!(!guard.is_busy(RequestKey::ScanState));
    let retry = guard
        .call(RequestKey::ScanState, Duration::from_secs(5), async {
            Ok::<_, ControlError>(7)
        })
        .await;
    assert!(matches!(retry, GuardOutcome::Completed(Ok(7))));
}

#[tokio::test(start_paused = true)]
async fn failed_call_releases_the_key() {
    let guard = RequestGuard::new();

    let outcome = guard
        .call(RequestKey::StartScan, Duration::from_secs(5), async {
            Err::<(), _>(ControlError::Transport("connection refused".into()))
        })
        .await;
    assert!(matches!(
        outcome,
        GuardOutcome::Completed(Err(ControlError::Transport(_)))
    ));
    assert!(!guard.is_busy(RequestKey::StartScan));
}

#[tokio::test(start_paused = true)]
async fn sequential_calls_with_the_same_key_all_run() {
    let guard = RequestGuard::new();
    for i in 0..3 {
        let outcome = guard
            .call(RequestKey::SelectNetwork, Duration::from_secs(5), async move {
                Ok::<_, ControlError>(i)
            })
            .await;
        assert!(matches!(outcome, GuardOutcome::Completed(Ok(n)) if n == i));
    }
}

#[tokio::test(start_paused = true)]
async fn clones_share_in_flight_state() {
    let guard = RequestGuard::new();
    let clone = guard.clone();

    let slow = guard.call(RequestKey::NetworkMap, Duration::from_secs(30), async {
        tokio::time::sleep(Duration::from_secs(1)).await;
        Ok::<_, ControlError>(())
    });
    let probe = async {
        tokio::task::yield_now().await;
        clone.is_busy(RequestKey::NetworkMap)
    };

    let (done, was_busy) = tokio::join!(slow, probe);
    assert!(was_busy);
    assert!(!done.was_skipped());
    assert!(!clone.is_busy(RequestKey::NetworkMap));
}
