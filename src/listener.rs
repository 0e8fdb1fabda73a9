//! Lifecycle controller: the host-facing listener surface
//!
//! `KeyListener` owns the listener worker's lifecycle. Start is idempotent
//! and race-safe; stop and unload block the caller until teardown is
//! confirmed or a bounded timeout elapses, and report unclean teardown
//! instead of claiming success.

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::mpsc::{self, Receiver};
use std::sync::Arc;
use std::thread::JoinHandle;

use parking_lot::Mutex;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::error::Error;
use crate::hook::{self, HookAdapter, HookError};
use crate::state::Snapshot;
use crate::worker::{ListenerWorker, SnapshotSink};

/// Lifecycle status of the listener subsystem
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ListenerStatus {
    /// No worker; teardown (if any) was confirmed
    Stopped,
    /// A worker is being spawned and is registering the hook
    Starting,
    /// The worker is active and draining key events
    Running,
    /// Teardown was requested; not yet (or never) confirmed clean
    Stopping,
}

impl fmt::Display for ListenerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ListenerStatus::Stopped => write!(f, "Stopped"),
            ListenerStatus::Starting => write!(f, "Starting"),
            ListenerStatus::Running => write!(f, "Running"),
            ListenerStatus::Stopping => write!(f, "Stopping"),
        }
    }
}

/// Lock-free cell so status reads never block. Shared with the worker,
/// which flips it to `Stopping` if its event stream dies underneath it.
pub(crate) struct StatusCell(AtomicU8);

impl StatusCell {
    pub(crate) fn new(status: ListenerStatus) -> Self {
        Self(AtomicU8::new(status as u8))
    }

    pub(crate) fn get(&self) -> ListenerStatus {
        match self.0.load(Ordering::SeqCst) {
            0 => ListenerStatus::Stopped,
            1 => ListenerStatus::Starting,
            2 => ListenerStatus::Running,
            _ => ListenerStatus::Stopping,
        }
    }

    pub(crate) fn set(&self, status: ListenerStatus) {
        self.0.store(status as u8, Ordering::SeqCst);
    }
}

struct WorkerHandle {
    thread: JoinHandle<()>,
    stop: Arc<AtomicBool>,
    done_rx: Receiver<Result<(), HookError>>,
}

#[derive(Default)]
struct Inner {
    worker: Option<WorkerHandle>,
}

/// Process-wide keyboard state listener.
///
/// One listener supervises at most one worker (and thus one hook
/// registration) at a time. All operations are callable from any thread.
pub struct KeyListener {
    adapter: Arc<dyn HookAdapter>,
    config: Config,
    status: Arc<StatusCell>,
    published: Arc<Mutex<Snapshot>>,
    inner: Mutex<Inner>,
}

impl KeyListener {
    /// Create a listener using the platform hook adapter and defaults
    pub fn new() -> Self {
        Self::with_config(Config::default())
    }

    /// Create a listener using the platform hook adapter
    pub fn with_config(config: Config) -> Self {
        let adapter = hook::platform_adapter(&config);
        Self::with_adapter(adapter, config)
    }

    /// Create a listener over a custom hook adapter
    pub fn with_adapter(adapter: Arc<dyn HookAdapter>, config: Config) -> Self {
        Self {
            adapter,
            config,
            status: Arc::new(StatusCell::new(ListenerStatus::Stopped)),
            published: Arc::new(Mutex::new(Snapshot::default())),
            inner: Mutex::new(Inner::default()),
        }
    }

    /// Start observing without a push callback (poll via [`get_keys`](Self::get_keys))
    pub fn start(&self) -> Result<(), Error> {
        self.start_inner(None)
    }

    /// Start observing, invoking `sink` with the new snapshot on every
    /// state change, in hardware event order.
    pub fn start_with_sink<F>(&self, sink: F) -> Result<(), Error>
    where
        F: Fn(Snapshot) + Send + 'static,
    {
        self.start_inner(Some(Box::new(sink)))
    }

    /// Current lifecycle status, read without blocking
    pub fn status(&self) -> ListenerStatus {
        self.status.get()
    }

    /// Whether the subsystem should be considered live.
    ///
    /// Reads `false` only once teardown is confirmed; an unclean stop keeps
    /// reading `true` because the OS hook may still be installed.
    pub fn is_running(&self) -> bool {
        matches!(
            self.status.get(),
            ListenerStatus::Running | ListenerStatus::Stopping
        )
    }

    /// Snapshot of the currently-pressed keys
    pub fn get_keys(&self) -> Result<Snapshot, Error> {
        if self.status.get() != ListenerStatus::Running {
            return Err(Error::NotRunning);
        }
        Ok(self.published.lock().clone())
    }

    /// Stop the listener, blocking until teardown is confirmed or the stop
    /// timeout elapses. Idempotent when already stopped.
    pub fn stop(&self) -> Result<(), Error> {
        let mut inner = self.inner.lock();
        self.stop_locked(&mut inner)
    }

    /// Stop and release all subsystem resources (worker handle, sink,
    /// published snapshot) so a later `start` is a fresh initialization.
    pub fn unload(&self) -> Result<(), Error> {
        let mut inner = self.inner.lock();
        let result = self.stop_locked(&mut inner);

        if inner.worker.take().is_some() {
            // A stuck worker is detached; its thread still owns the sink
            // and will drop it whenever it finally exits
            warn!("unload detaching unresponsive worker");
        }
        *self.published.lock() = Snapshot::default();

        result
    }

    fn start_inner(&self, sink: Option<SnapshotSink>) -> Result<(), Error> {
        let mut inner = self.inner.lock();

        match self.status.get() {
            ListenerStatus::Starting | ListenerStatus::Running => {
                debug!("start ignored, listener already active");
                return Ok(());
            }
            ListenerStatus::Stopping => {
                // A previous stop never confirmed. Reap the worker if it
                // has since terminated; refuse to race it otherwise.
                if let Some(worker) = inner.worker.take() {
                    if worker.thread.is_finished() {
                        let _ = worker.thread.join();
                    } else {
                        inner.worker = Some(worker);
                        return Err(Error::StopInProgress);
                    }
                }
            }
            ListenerStatus::Stopped => {}
        }

        self.status.set(ListenerStatus::Starting);
        *self.published.lock() = Snapshot::default();

        let stop = Arc::new(AtomicBool::new(false));
        let (ack_tx, ack_rx) = mpsc::channel();
        let (done_tx, done_rx) = mpsc::channel();
        let worker = ListenerWorker::new(
            self.adapter.clone(),
            self.published.clone(),
            self.status.clone(),
            sink,
            stop.clone(),
        );

        let thread = std::thread::Builder::new()
            .name("keywatch-worker".to_string())
            .spawn(move || worker.run(ack_tx, done_tx))
            .map_err(|e| {
                self.status.set(ListenerStatus::Stopped);
                Error::Spawn(e.to_string())
            })?;

        match ack_rx.recv_timeout(self.config.start_timeout) {
            Ok(Ok(())) => {
                inner.worker = Some(WorkerHandle {
                    thread,
                    stop,
                    done_rx,
                });
                self.status.set(ListenerStatus::Running);
                info!("listener running");
                Ok(())
            }
            Ok(Err(e)) => {
                let _ = thread.join();
                self.status.set(ListenerStatus::Stopped);
                Err(e.into())
            }
            Err(_) => {
                // Worker never confirmed; ask it to wind down on its own
                stop.store(true, Ordering::SeqCst);
                self.status.set(ListenerStatus::Stopped);
                Err(Error::StartTimeout(self.config.start_timeout))
            }
        }
    }

    fn stop_locked(&self, inner: &mut Inner) -> Result<(), Error> {
        match self.status.get() {
            ListenerStatus::Stopped => return Ok(()),
            ListenerStatus::Stopping if inner.worker.is_none() => {
                // Teardown failure was already reported; this call
                // acknowledges it and settles the status
                self.status.set(ListenerStatus::Stopped);
                return Ok(());
            }
            _ => {}
        }

        let Some(worker) = inner.worker.take() else {
            self.status.set(ListenerStatus::Stopped);
            return Ok(());
        };

        self.status.set(ListenerStatus::Stopping);
        worker.stop.store(true, Ordering::SeqCst);

        match worker.done_rx.recv_timeout(self.config.stop_timeout) {
            Ok(Ok(())) => {
                let _ = worker.thread.join();
                self.status.set(ListenerStatus::Stopped);
                info!("listener stopped");
                Ok(())
            }
            Ok(Err(e)) => {
                // Worker terminated but the hook teardown was unclean;
                // status stays Stopping so hosts can see it
                let _ = worker.thread.join();
                warn!(error = %e, "listener stopped uncleanly");
                Err(e.into())
            }
            Err(_) => {
                // Worker unresponsive; keep the handle so a retry can wait
                // for it again
                inner.worker = Some(worker);
                warn!("listener did not confirm termination in time");
                Err(Error::StopTimeout(self.config.stop_timeout))
            }
        }
    }
}

impl Default for KeyListener {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for KeyListener {
    fn drop(&mut self) {
        if self.is_running() {
            let _ = self.unload();
        }
    }
}
