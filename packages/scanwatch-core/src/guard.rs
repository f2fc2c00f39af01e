//! Single-flight request guard.
//!
//! Every remote call the controller issues goes through [`RequestGuard`]: at
//! most one call per [`RequestKey`] is in flight at a time, later callers are
//! dropped (not queued), and each call carries a hard timeout after which the
//! underlying future is aborted and the key released for retry.

use std::collections::HashSet;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use crate::error::ControlError;

/// Logical identity of a remote call, used for duplicate suppression.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RequestKey {
    ScanState,
    StartScan,
    StopScan,
    SelectNetwork,
    NetworkList,
    NetworkMap,
    DeviceGrid,
}

impl RequestKey {
    pub fn as_str(self) -> &'static str {
        match self {
            RequestKey::ScanState => "scan-state",
            RequestKey::StartScan => "start-scan",
            RequestKey::StopScan => "stop-scan",
            RequestKey::SelectNetwork => "select-network",
            RequestKey::NetworkList => "network-list",
            RequestKey::NetworkMap => "network-map",
            RequestKey::DeviceGrid => "device-grid",
        }
    }
}

/// What happened to a guarded call. Callers must not infer success from the
/// guard alone; a completed call still carries its own result.
#[derive(Debug)]
pub enum GuardOutcome<T> {
    /// The call executed and settled (successfully or not) within its timeout.
    Completed(Result<T, ControlError>),
    /// A call with the same key was already in flight; no I/O was issued.
    Skipped,
}

impl<T> GuardOutcome<T> {
    pub fn was_skipped(&self) -> bool {
        matches!(self, GuardOutcome::Skipped)
    }

    /// The settled result, if the call ran at all.
    pub fn into_completed(self) -> Option<Result<T, ControlError>> {
        match self {
            GuardOutcome::Completed(result) => Some(result),
            GuardOutcome::Skipped => None,
        }
    }
}

/// Tracks which request keys are busy. Cheap to clone; clones share state.
#[derive(Debug, Clone, Default)]
pub struct RequestGuard {
    in_flight: Arc<Mutex<HashSet<RequestKey>>>,
}

impl RequestGuard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_busy(&self, key: RequestKey) -> bool {
        lock_poison_free(&self.in_flight).contains(&key)
    }

    /// Run `request` unless `key` is already in flight. The key is released
    /// on every exit path, including timeout and panic unwind, so a stalled
    /// call can always be retried once it is aborted.
    pub async fn call<T, F>(
        &self,
        key: RequestKey,
        timeout: Duration,
        request: F,
    ) -> GuardOutcome<T>
    where
        F: Future<Output = Result<T, ControlError>>,
    {
        if !lock_poison_free(&self.in_flight).insert(key) {
            tracing::debug!("request '{}' already in flight, skipping", key.as_str());
            return GuardOutcome::Skipped;
        }
        let _release = ReleaseOnDrop {
            key,
            in_flight: Arc::clone(&self.in_flight),
        };

        match tokio::time::timeout(timeout, request).await {
            Ok(result) => GuardOutcome::Completed(result),
            Err(_) => {
                tracing::warn!(
                    "request '{}' aborted after {}ms",
                    key.as_str(),
                    timeout.as_millis()
                );
                GuardOutcome::Completed(Err(ControlError::RequestTimeout {
                    key: key.as_str(),
                    timeout_ms: timeout.as_millis() as u64,
                }))
            }
        }
    }
}

struct ReleaseOnDrop {
    key: RequestKey,
    in_flight: Arc<Mutex<HashSet<RequestKey>>>,
}

impl Drop for ReleaseOnDrop {
    fn drop(&mut self) {
        lock_poison_free(&self.in_flight).remove(&self.key);
    }
}

/// The critical sections here are single inserts/removes; a poisoned lock
/// still holds a coherent set, so recover the guard instead of propagating.
fn lock_poison_free(set: &Mutex<HashSet<RequestKey>>) -> MutexGuard<'_, HashSet<RequestKey>> {
    set.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
