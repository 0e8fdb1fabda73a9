//! Hook adapter seam: the boundary to the OS-level keyboard hook
//!
//! An adapter installs the platform hook, pushes [`KeyTransition`]s into an
//! explicit channel, and tears the hook down on request. The listener
//! worker is the sole consumer of the resulting [`EventSource`].
//!
//! At most one hook registration may be active per process; adapters
//! enforce that with an atomic gate.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{Receiver, RecvTimeoutError};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use crate::keys::KeyTransition;

#[cfg(target_os = "macos")]
mod event_tap;
#[cfg(target_os = "macos")]
mod keycodes;
#[cfg(target_os = "macos")]
pub use event_tap::EventTapAdapter;

#[cfg(not(target_os = "macos"))]
mod poll;
#[cfg(not(target_os = "macos"))]
pub use poll::PollAdapter;

use crate::config::Config;

/// Errors reported by hook adapters
#[derive(Debug, thiserror::Error)]
pub enum HookError {
    /// The OS denied hook installation (typically missing input-monitoring
    /// or accessibility privileges)
    #[error("hook installation denied: {0}")]
    PermissionDenied(String),

    /// A hook registration is already active in this process
    #[error("keyboard hook is already registered")]
    AlreadyRegistered,

    /// Hook installation failed for a reason other than permissions
    #[error("failed to install keyboard hook: {0}")]
    Install(String),

    /// The hook thread did not exit within the teardown bound; the hook
    /// may still be installed at the OS level
    #[error("keyboard hook teardown timed out after {0:?}")]
    TeardownTimeout(Duration),

    /// Teardown finished but not cleanly
    #[error("keyboard hook teardown failed: {0}")]
    Teardown(String),
}

/// A registered hook: a live stream of key transitions plus the handle
/// needed to tear the hook down again.
pub struct EventSource {
    events: Receiver<KeyTransition>,
    hook: HookHandle,
}

impl EventSource {
    /// Assemble a source from a transition channel and a hook handle
    pub fn new(events: Receiver<KeyTransition>, hook: HookHandle) -> Self {
        Self { events, hook }
    }

    /// Wait up to `timeout` for the next transition
    pub fn recv_timeout(&self, timeout: Duration) -> Result<KeyTransition, RecvTimeoutError> {
        self.events.recv_timeout(timeout)
    }

    fn shutdown(self) -> Result<(), HookError> {
        self.hook.shutdown()
    }
}

/// Ownership of a hook thread: a cooperative stop flag and a bounded join
pub struct HookHandle {
    stop: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
    teardown_timeout: Duration,
}

impl HookHandle {
    /// Create a handle for a spawned hook thread
    pub fn new(stop: Arc<AtomicBool>, thread: JoinHandle<()>, teardown_timeout: Duration) -> Self {
        Self {
            stop,
            thread: Some(thread),
            teardown_timeout,
        }
    }

    /// Request the hook thread to stop and wait for it, bounded by the
    /// teardown timeout.
    fn shutdown(mut self) -> Result<(), HookError> {
        self.stop.store(true, Ordering::SeqCst);

        let Some(thread) = self.thread.take() else {
            return Ok(());
        };

        let deadline = Instant::now() + self.teardown_timeout;
        while !thread.is_finished() && Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(10));
        }

        if !thread.is_finished() {
            return Err(HookError::TeardownTimeout(self.teardown_timeout));
        }

        thread
            .join()
            .map_err(|_| HookError::Teardown("hook thread panicked".to_string()))
    }
}

/// Contract for installing and removing the OS keyboard hook.
///
/// `register` installs the hook and returns the live transition stream;
/// `unregister` removes it within a bounded time. Implementations must
/// deliver transitions in hardware order per key and must not coalesce.
pub trait HookAdapter: Send + Sync {
    /// Install the OS hook and begin emitting transitions
    fn register(&self) -> Result<EventSource, HookError>;

    /// Remove the hook, consuming the source. Bounded; reports
    /// [`HookError::TeardownTimeout`] instead of hanging.
    fn unregister(&self, source: EventSource) -> Result<(), HookError> {
        source.shutdown()
    }
}

/// The default adapter for the current platform
pub(crate) fn platform_adapter(config: &Config) -> Arc<dyn HookAdapter> {
    #[cfg(target_os = "macos")]
    return Arc::new(EventTapAdapter::new(config));
    #[cfg(not(target_os = "macos"))]
    return Arc::new(PollAdapter::new(config));
}

// Process-wide registration gate. Released by the hook thread as its last
// act, so the gate stays held exactly as long as the hook might be live.
static HOOK_ACTIVE: AtomicBool = AtomicBool::new(false);

pub(crate) fn acquire_registration() -> Result<(), HookError> {
    HOOK_ACTIVE
        .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
        .map(|_| ())
        .map_err(|_| HookError::AlreadyRegistered)
}

pub(crate) fn release_registration() {
    HOOK_ACTIVE.store(false, Ordering::SeqCst);
}
