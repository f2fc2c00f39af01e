//! Runtime clock for the scan control display.
//!
//! Ticks an `HH:MM:SS` elapsed string once per second while a scan is active
//! and stops the instant the start timestamp clears. The elapsed computation
//! is a pure function so it can be tested without timers.

use chrono::{DateTime, Utc};
use std::sync::Mutex;
use tokio::sync::watch;
use tokio::time::{Duration, interval};
use tokio_util::sync::CancellationToken;

/// Display value while no scan is running.
pub const IDLE_RUNTIME: &str = "00:00:00";

/// Wall-clock elapsed time as `HH:MM:SS`. A negative difference (clock skew,
/// future timestamp) clamps to zero rather than rendering negative time.
pub fn format_elapsed(started_at: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let secs = (now - started_at).num_seconds().max(0);
    format!("{:02}:{:02}:{:02}", secs / 3600, (secs % 3600) / 60, secs % 60)
}

struct Ticker {
    started_at: DateTime<Utc>,
    cancel: CancellationToken,
}

/// Owns the one-second display timer. Starting is idempotent: a second start
/// with the same timestamp never creates a second timer.
pub struct RuntimeClock {
    display: watch::Sender<String>,
    ticker: Mutex<Option<Ticker>>,
}

impl RuntimeClock {
    pub fn new() -> Self {
        let (display, _) = watch::channel(IDLE_RUNTIME.to_string());
        Self {
            display,
            ticker: Mutex::new(None),
        }
    }

    /// Subscribe to the rendered elapsed-time string.
    pub fn display(&self) -> watch::Receiver<String> {
        self.display.subscribe()
    }

    /// Drive the clock from the snapshot's `started_at`. `Some` starts (or
    /// keeps) the ticker, `None` stops it and resets the display.
    pub fn set_started_at(&self, started_at: Option<DateTime<Utc>>) {
        let mut ticker = self
            .ticker
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        match started_at {
            Some(start) => {
                if let Some(active) = ticker.as_ref() {
                    if active.started_at == start {
                        // Already ticking from this timestamp; refresh once.
                        self.display
                            .send_replace(format_elapsed(start, Utc::now()));
                        return;
                    }
                    active.cancel.cancel();
                }
                let cancel = CancellationToken::new();
                *ticker = Some(Ticker {
                    started_at: start,
                    cancel: cancel.clone(),
                });
                let display = self.display.clone();
                tokio::spawn(async move {
                    let mut tick = interval(Duration::from_secs(1));
                    loop {
                        tokio::select! {
                            _ = cancel.cancelled() => break,
                            _ = tick.tick() => {
                                display.send_replace(format_elapsed(start, Utc::now()));
                            }
                        }
                    }
                });
            }
            None => {
                if let Some(active) = ticker.take() {
                    active.cancel.cancel();
                }
                self.display.send_replace(IDLE_RUNTIME.to_string());
            }
        }
    }
}

impl Default for RuntimeClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for RuntimeClock {
    fn drop(&mut self) {
        if let Ok(mut ticker) = self.ticker.lock() {
            if let Some(active) = ticker.take() {
                active.cancel.cancel();
            }
        }
    }
}
