//! Convergence polling after a stop request.
//!
//! The server acknowledges a stop before the scan has actually wound down, so
//! the controller re-fetches state at a fixed cadence until the server
//! reports neither running nor stopping. Polls are strictly sequential (each
//! fetch resolves or aborts before the next tick fires) and bounded: when the
//! attempt ceiling is exhausted the session degrades to one unconditional
//! refresh rather than leaving the view stuck in "Stopping" forever.

use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Duration;

use tokio::time::{MissedTickBehavior, interval};
use tokio_util::sync::CancellationToken;

use crate::error::ControlError;
use crate::guard::{GuardOutcome, RequestKey};

use super::{STATE_TIMEOUT, ScanController};

pub const POLL_INTERVAL: Duration = Duration::from_secs(1);
pub const POLL_CEILING: u32 = 30;

/// One bounded polling session. Destroyed on convergence, exhaustion, or
/// cancellation by a newer session.
struct PollSession {
    attempts_remaining: u32,
    cancel: CancellationToken,
}

enum PollStep {
    /// Server still reports an active scan.
    Pending,
    /// Server reports a quiesced scan; the snapshot has been adopted.
    Settled,
    /// The poll fetch failed; abandon the session and resync once.
    Failed,
}

impl ScanController {
    /// Start a convergence poll session, cancelling any session already
    /// running so rapid start/stop cycles never leak timers.
    pub(super) async fn begin_poll_session(&self) {
        let Some(controller) = self.self_ref.upgrade() else {
            return;
        };
        let epoch = self.poll_epoch.fetch_add(1, Ordering::Relaxed) + 1;
        let cancel = CancellationToken::new();
        {
            let mut st = self.state.lock().await;
            if let Some((_, prior)) = st.poll.replace((epoch, cancel.clone())) {
                tracing::debug!("cancelling prior convergence poll session");
                prior.cancel();
            }
        }
        tokio::spawn(async move {
            controller.run_poll_session(epoch, cancel).await;
        });
    }

    async fn run_poll_session(self: Arc<Self>, epoch: u64, cancel: CancellationToken) {
        let mut session = PollSession {
            attempts_remaining: POLL_CEILING,
            cancel,
        };
        let mut ticker = interval(POLL_INTERVAL);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // Consume the immediate tick; the first poll fires after one interval.
        ticker.tick().await;

        while session.attempts_remaining > 0 {
            tokio::select! {
                _ = session.cancel.cancelled() => {
                    tracing::debug!("convergence poll session cancelled");
                    return;
                }
                _ = ticker.tick() => {}
            }
            session.attempts_remaining -= 1;

            match self.poll_state_once().await {
                PollStep::Settled => {
                    tracing::debug!(
                        "scan stop converged after {} polls",
                        POLL_CEILING - session.attempts_remaining
                    );
                    self.clear_poll_session(epoch).await;
                    return;
                }
                PollStep::Pending => {}
                PollStep::Failed => {
                    self.clear_poll_session(epoch).await;
                    if let Err(e) = self.fetch_state().await {
                        tracing::debug!("post-poll state refresh failed: {e}");
                    }
                    return;
                }
            }
        }

        // Ceiling exhausted: the stop probably finished but was never
        // confirmed. Recover with one unconditional refresh.
        let timeout = ControlError::ConvergenceTimeout {
            attempts: POLL_CEILING,
        };
        tracing::warn!("{timeout}; forcing a state refresh");
        self.view.notice(&timeout.to_string());
        self.clear_poll_session(epoch).await;
        if let Err(e) = self.fetch_state().await {
            tracing::debug!("post-poll state refresh failed: {e}");
        }
    }

    /// One sequential poll. Shares the scan-state guard key, so a concurrent
    /// external fetch simply turns this attempt into a skip.
    async fn poll_state_once(&self) -> PollStep {
        match self
            .guard
            .call(RequestKey::ScanState, STATE_TIMEOUT, self.service.scan_state())
            .await
        {
            GuardOutcome::Skipped => PollStep::Pending,
            GuardOutcome::Completed(Ok(payload)) => {
                let snapshot = self.adopt(payload).await;
                if snapshot.phase.is_settled() {
                    PollStep::Settled
                } else {
                    PollStep::Pending
                }
            }
            GuardOutcome::Completed(Err(e)) => {
                tracing::warn!("convergence poll failed: {e}");
                PollStep::Failed
            }
        }
    }

    /// Drop the stored session handle, unless a newer session replaced it.
    async fn clear_poll_session(&self, epoch: u64) {
        let mut st = self.state.lock().await;
        if matches!(st.poll, Some((current, _)) if current == epoch) {
            st.poll = None;
        }
    }
}
