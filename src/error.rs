//! Error types for the listener surface
//!
//! Every public operation returns the same `Error` so hosts deal with one
//! result shape; adapter-level failures are wrapped, never swallowed.

use std::time::Duration;

use crate::hook::HookError;

/// Errors surfaced by [`KeyListener`](crate::KeyListener) operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A running-only operation was called while the listener was stopped
    #[error("listener is not running")]
    NotRunning,

    /// The worker did not confirm hook registration in time
    #[error("listener did not become active within {0:?}")]
    StartTimeout(Duration),

    /// The worker did not confirm termination in time; the hook may still
    /// be installed at the OS level
    #[error("listener did not stop within {0:?}; the keyboard hook may still be installed")]
    StopTimeout(Duration),

    /// A previous stop has not finished tearing down; start cannot proceed
    #[error("a previous stop is still in progress")]
    StopInProgress,

    /// The worker thread could not be spawned
    #[error("failed to spawn listener worker: {0}")]
    Spawn(String),

    /// The hook adapter reported a failure
    #[error(transparent)]
    Hook(#[from] HookError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_running_message() {
        assert_eq!(Error::NotRunning.to_string(), "listener is not running");
    }

    #[test]
    fn test_hook_error_is_transparent() {
        let err: Error = HookError::AlreadyRegistered.into();
        assert_eq!(err.to_string(), HookError::AlreadyRegistered.to_string());
    }

    #[test]
    fn test_stop_timeout_names_the_bound() {
        let err = Error::StopTimeout(Duration::from_millis(250));
        assert!(err.to_string().contains("250ms"));
    }
}
