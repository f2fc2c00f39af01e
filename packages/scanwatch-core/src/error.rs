use thiserror::Error;

/// Failure modes of the scan session controller.
#[derive(Error, Debug)]
pub enum ControlError {
    /// Required input was missing or malformed. Never reaches the network.
    #[error("validation failed: {0}")]
    Validation(String),

    /// A guarded request did not settle within its timeout and was aborted.
    #[error("request '{key}' timed out after {timeout_ms}ms")]
    RequestTimeout { key: &'static str, timeout_ms: u64 },

    /// The server answered 409: there is no active scan to stop.
    #[error("no active scan is currently running")]
    Conflict,

    /// Network or HTTP failure talking to the scan service.
    #[error("transport error: {0}")]
    Transport(String),

    /// The stop poller exhausted its attempt ceiling without the server
    /// reporting a quiesced scan.
    #[error("scan stop did not converge after {attempts} polls")]
    ConvergenceTimeout { attempts: u32 },
}

impl From<reqwest::Error> for ControlError {
    fn from(err: reqwest::Error) -> Self {
        ControlError::Transport(err.to_string())
    }
}

impl ControlError {
    /// Transient failures leave the last known-good snapshot in place and
    /// surface a non-blocking notice instead of tearing the session down.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            ControlError::RequestTimeout { .. }
                | ControlError::Transport(_)
                | ControlError::ConvergenceTimeout { .. }
        )
    }
}
