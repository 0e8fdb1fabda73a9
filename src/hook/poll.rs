//! Polling hook adapter for Windows and Linux
//!
//! Samples the full pressed-key set via device_query on a dedicated thread
//! and edge-detects against the previous sample, emitting one ordered
//! [`KeyTransition`] per change.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Sender};
use std::sync::Arc;
use std::time::Duration;

use device_query::{DeviceQuery, DeviceState, Keycode};
use tracing::{debug, info};

use super::{EventSource, HookError, HookHandle};
use crate::config::Config;
use crate::keys::KeyTransition;

/// Hook adapter backed by device_query state polling
pub struct PollAdapter {
    poll_interval: Duration,
    ready_timeout: Duration,
    teardown_timeout: Duration,
}

impl PollAdapter {
    /// Create an adapter with the given timing configuration
    pub fn new(config: &Config) -> Self {
        Self {
            poll_interval: config.poll_interval,
            ready_timeout: config.start_timeout,
            teardown_timeout: config.teardown_timeout,
        }
    }
}

impl super::HookAdapter for PollAdapter {
    fn register(&self) -> Result<EventSource, HookError> {
        super::acquire_registration()?;

        let stop = Arc::new(AtomicBool::new(false));
        let (event_tx, event_rx) = mpsc::channel();
        let (ready_tx, ready_rx) = mpsc::channel();
        let poll_interval = self.poll_interval;

        let thread_stop = stop.clone();
        let thread = std::thread::Builder::new()
            .name("keywatch-hook".to_string())
            .spawn(move || {
                run_poll_loop(event_tx, thread_stop, ready_tx, poll_interval);
                super::release_registration();
            })
            .map_err(|e| {
                super::release_registration();
                HookError::Install(format!("failed to spawn hook thread: {e}"))
            })?;

        match ready_rx.recv_timeout(self.ready_timeout) {
            Ok(Ok(())) => Ok(EventSource::new(
                event_rx,
                HookHandle::new(stop, thread, self.teardown_timeout),
            )),
            Ok(Err(e)) => {
                let _ = thread.join();
                Err(e)
            }
            Err(_) => {
                stop.store(true, Ordering::SeqCst);
                Err(HookError::Install(
                    "hook thread did not signal readiness".to_string(),
                ))
            }
        }
    }
}

/// Sample the keyboard until stopped, emitting per-key edges
fn run_poll_loop(
    event_tx: Sender<KeyTransition>,
    stop: Arc<AtomicBool>,
    ready_tx: Sender<Result<(), HookError>>,
    poll_interval: Duration,
) {
    // DeviceState::new panics when the input devices cannot be opened
    // (e.g. no X11 display); report that as a readiness failure instead
    let device_state = match std::panic::catch_unwind(DeviceState::new) {
        Ok(device_state) => device_state,
        Err(_) => {
            let _ = ready_tx.send(Err(HookError::PermissionDenied(
                "no access to input devices (is a display server available?)".to_string(),
            )));
            return;
        }
    };

    info!("keyboard polling started");
    let _ = ready_tx.send(Ok(()));

    let mut prev_keys: Vec<Keycode> = Vec::new();
    while !stop.load(Ordering::SeqCst) {
        let keys = device_state.get_keys();
        if keys != prev_keys {
            // Releases first, then presses; per-key order is preserved
            // either way since a key cannot appear in both lists
            for key in prev_keys.iter().filter(|k| !keys.contains(k)) {
                if event_tx
                    .send(KeyTransition::up(format!("{key}")))
                    .is_err()
                {
                    return;
                }
            }
            for key in keys.iter().filter(|k| !prev_keys.contains(k)) {
                if event_tx
                    .send(KeyTransition::down(format!("{key}")))
                    .is_err()
                {
                    return;
                }
            }
            prev_keys = keys;
        }
        std::thread::sleep(poll_interval);
    }

    debug!("keyboard polling stopped, hook thread exiting");
}

#[cfg(test)]
mod tests {
    use super::*;

    // Must hold with or without a usable display: readiness is reported
    // exactly once (Ok or PermissionDenied) and the loop never panics.
    #[test]
    fn test_poll_loop_signals_readiness_and_stops() {
        let (event_tx, _event_rx) = mpsc::channel();
        let (ready_tx, ready_rx) = mpsc::channel();
        let stop = Arc::new(AtomicBool::new(false));

        let thread_stop = stop.clone();
        let handle = std::thread::spawn(move || {
            run_poll_loop(event_tx, thread_stop, ready_tx, Duration::from_millis(5));
        });

        match ready_rx.recv_timeout(Duration::from_secs(2)).unwrap() {
            Ok(()) => stop.store(true, Ordering::SeqCst),
            Err(e) => assert!(matches!(e, HookError::PermissionDenied(_))),
        }
        handle.join().unwrap();
    }
}
