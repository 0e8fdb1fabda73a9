//! Listener worker: sole consumer of the hook event stream
//!
//! Owns one hook registration for its lifetime and drives the state
//! machine Idle -> Registering -> Active -> Unregistering -> Terminated
//! (Registering -> Terminated on adapter failure). Applies transitions to
//! the key state table, publishes each changed snapshot, and invokes the
//! sink synchronously in hardware order.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{RecvTimeoutError, Sender};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tracing::{debug, error, info, trace, warn};

use crate::hook::{HookAdapter, HookError};
use crate::keys::KeyTransition;
use crate::listener::{ListenerStatus, StatusCell};
use crate::state::{KeyStateTable, Snapshot};

/// How long a single receive waits before re-checking the stop flag
const RECV_TICK: Duration = Duration::from_millis(100);

pub(crate) type SnapshotSink = Box<dyn Fn(Snapshot) + Send + 'static>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WorkerState {
    Registering,
    Active,
    Unregistering,
    Terminated,
}

impl fmt::Display for WorkerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WorkerState::Registering => write!(f, "Registering"),
            WorkerState::Active => write!(f, "Active"),
            WorkerState::Unregistering => write!(f, "Unregistering"),
            WorkerState::Terminated => write!(f, "Terminated"),
        }
    }
}

/// Background worker draining one hook registration
pub(crate) struct ListenerWorker {
    adapter: Arc<dyn HookAdapter>,
    table: KeyStateTable,
    published: Arc<Mutex<Snapshot>>,
    status: Arc<StatusCell>,
    sink: Option<SnapshotSink>,
    stop: Arc<AtomicBool>,
}

impl ListenerWorker {
    pub(crate) fn new(
        adapter: Arc<dyn HookAdapter>,
        published: Arc<Mutex<Snapshot>>,
        status: Arc<StatusCell>,
        sink: Option<SnapshotSink>,
        stop: Arc<AtomicBool>,
    ) -> Self {
        Self {
            adapter,
            table: KeyStateTable::new(),
            published,
            status,
            sink,
            stop,
        }
    }

    /// Run to termination. `ack_tx` reports the registration outcome once;
    /// `done_tx` reports the teardown outcome once.
    pub(crate) fn run(
        mut self,
        ack_tx: Sender<Result<(), HookError>>,
        done_tx: Sender<Result<(), HookError>>,
    ) {
        let mut state = WorkerState::Registering;
        debug!(%state, "worker starting");

        let source = match self.adapter.register() {
            Ok(source) => source,
            Err(e) => {
                state = WorkerState::Terminated;
                error!(%state, error = %e, "hook registration failed");
                let _ = ack_tx.send(Err(e));
                return;
            }
        };

        let _ = ack_tx.send(Ok(()));
        state = WorkerState::Active;
        info!(%state, "worker draining key events");

        while !self.stop.load(Ordering::SeqCst) {
            match source.recv_timeout(RECV_TICK) {
                Ok(transition) => {
                    // A stop may have been requested while this event was
                    // in flight; drop it so nothing is processed once
                    // teardown begins.
                    if self.stop.load(Ordering::SeqCst) {
                        break;
                    }
                    self.handle(transition);
                }
                Err(RecvTimeoutError::Timeout) => continue,
                Err(RecvTimeoutError::Disconnected) => {
                    // No stop was requested, so the controller is not
                    // watching; flip the status ourselves so polls stop
                    // serving the stale snapshot
                    warn!("hook event stream closed unexpectedly");
                    self.status.set(ListenerStatus::Stopping);
                    break;
                }
            }
        }

        state = WorkerState::Unregistering;
        debug!(%state, "worker unregistering hook");

        let result = self.adapter.unregister(source);
        if let Err(e) = &result {
            warn!(error = %e, "hook teardown was unclean");
        }

        state = WorkerState::Terminated;
        debug!(%state, "worker terminated");
        let _ = done_tx.send(result);
    }

    fn handle(&mut self, transition: KeyTransition) {
        trace!(
            key = %transition.key,
            direction = ?transition.direction,
            queued_for = ?transition.at.elapsed(),
            "key transition"
        );

        if let Some(snapshot) = self.table.apply(&transition) {
            *self.published.lock() = snapshot.clone();
            if let Some(sink) = &self.sink {
                sink(snapshot);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hook::{EventSource, HookHandle};
    use crate::keys::KeyId;
    use std::sync::mpsc;

    /// Adapter handing out a pre-built source, counting registrations
    struct FakeAdapter {
        source: Mutex<Option<EventSource>>,
        fail_with: Mutex<Option<HookError>>,
    }

    impl FakeAdapter {
        fn with_source(source: EventSource) -> Self {
            Self {
                source: Mutex::new(Some(source)),
                fail_with: Mutex::new(None),
            }
        }

        fn failing(error: HookError) -> Self {
            Self {
                source: Mutex::new(None),
                fail_with: Mutex::new(Some(error)),
            }
        }
    }

    impl HookAdapter for FakeAdapter {
        fn register(&self) -> Result<EventSource, HookError> {
            if let Some(e) = self.fail_with.lock().take() {
                return Err(e);
            }
            Ok(self.source.lock().take().expect("source already taken"))
        }
    }

    fn fake_source() -> (mpsc::Sender<KeyTransition>, EventSource) {
        let (tx, rx) = mpsc::channel();
        let stop = Arc::new(AtomicBool::new(false));
        let stop_seen = stop.clone();
        let thread = std::thread::spawn(move || {
            while !stop_seen.load(Ordering::SeqCst) {
                std::thread::sleep(Duration::from_millis(2));
            }
        });
        let source = EventSource::new(rx, HookHandle::new(stop, thread, Duration::from_secs(1)));
        (tx, source)
    }

    struct WorkerUnderTest {
        published: Arc<Mutex<Snapshot>>,
        status: Arc<StatusCell>,
        stop: Arc<AtomicBool>,
        ack_rx: mpsc::Receiver<Result<(), HookError>>,
        done_rx: mpsc::Receiver<Result<(), HookError>>,
        handle: std::thread::JoinHandle<()>,
    }

    fn spawn_worker(adapter: Arc<dyn HookAdapter>, sink: Option<SnapshotSink>) -> WorkerUnderTest {
        let published = Arc::new(Mutex::new(Snapshot::default()));
        let status = Arc::new(StatusCell::new(ListenerStatus::Running));
        let stop = Arc::new(AtomicBool::new(false));
        let worker = ListenerWorker::new(
            adapter,
            published.clone(),
            status.clone(),
            sink,
            stop.clone(),
        );
        let (ack_tx, ack_rx) = mpsc::channel();
        let (done_tx, done_rx) = mpsc::channel();
        let handle = std::thread::spawn(move || worker.run(ack_tx, done_tx));
        WorkerUnderTest {
            published,
            status,
            stop,
            ack_rx,
            done_rx,
            handle,
        }
    }

    #[test]
    fn test_sink_receives_ordered_snapshots() {
        let (tx, source) = fake_source();
        let adapter = Arc::new(FakeAdapter::with_source(source));

        let seen: Arc<Mutex<Vec<Vec<String>>>> = Arc::new(Mutex::new(Vec::new()));
        let seen_sink = seen.clone();
        let sink: SnapshotSink = Box::new(move |snapshot| {
            seen_sink.lock().push(snapshot.names());
        });

        let worker = spawn_worker(adapter, Some(sink));
        worker
            .ack_rx
            .recv_timeout(Duration::from_secs(1))
            .unwrap()
            .unwrap();

        tx.send(KeyTransition::down("LControl")).unwrap();
        tx.send(KeyTransition::down("Key0")).unwrap();
        tx.send(KeyTransition::up("LControl")).unwrap();

        // Wait until all three notifications landed
        let deadline = std::time::Instant::now() + Duration::from_secs(2);
        while seen.lock().len() < 3 && std::time::Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(5));
        }

        assert_eq!(
            *seen.lock(),
            vec![
                vec!["LControl".to_string()],
                vec!["LControl".to_string(), "Key0".to_string()],
                vec!["Key0".to_string()],
            ]
        );
        assert_eq!(worker.published.lock().names(), vec!["Key0".to_string()]);

        worker.stop.store(true, Ordering::SeqCst);
        worker
            .done_rx
            .recv_timeout(Duration::from_secs(2))
            .unwrap()
            .unwrap();
        worker.handle.join().unwrap();
    }

    #[test]
    fn test_duplicate_transition_produces_no_notification() {
        let (tx, source) = fake_source();
        let adapter = Arc::new(FakeAdapter::with_source(source));

        let count = Arc::new(Mutex::new(0usize));
        let count_sink = count.clone();
        let sink: SnapshotSink = Box::new(move |_| {
            *count_sink.lock() += 1;
        });

        let worker = spawn_worker(adapter, Some(sink));
        worker
            .ack_rx
            .recv_timeout(Duration::from_secs(1))
            .unwrap()
            .unwrap();

        tx.send(KeyTransition::down("A")).unwrap();
        tx.send(KeyTransition::down("A")).unwrap();
        tx.send(KeyTransition::up("A")).unwrap();
        tx.send(KeyTransition::up("A")).unwrap();

        let deadline = std::time::Instant::now() + Duration::from_secs(2);
        while *count.lock() < 2 && std::time::Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(5));
        }
        // Give the worker a beat to (incorrectly) deliver more
        std::thread::sleep(Duration::from_millis(50));
        assert_eq!(*count.lock(), 2);

        worker.stop.store(true, Ordering::SeqCst);
        worker
            .done_rx
            .recv_timeout(Duration::from_secs(2))
            .unwrap()
            .unwrap();
        worker.handle.join().unwrap();
    }

    #[test]
    fn test_registration_failure_reported_via_ack() {
        let adapter = Arc::new(FakeAdapter::failing(HookError::PermissionDenied(
            "denied".to_string(),
        )));

        let worker = spawn_worker(adapter, None);
        let ack = worker.ack_rx.recv_timeout(Duration::from_secs(1)).unwrap();
        assert!(matches!(ack, Err(HookError::PermissionDenied(_))));
        worker.handle.join().unwrap();
    }

    #[test]
    fn test_no_sink_still_publishes() {
        let (tx, source) = fake_source();
        let adapter = Arc::new(FakeAdapter::with_source(source));

        let worker = spawn_worker(adapter, None);
        worker
            .ack_rx
            .recv_timeout(Duration::from_secs(1))
            .unwrap()
            .unwrap();

        tx.send(KeyTransition::down("LShift")).unwrap();

        let key = KeyId::new("LShift");
        let deadline = std::time::Instant::now() + Duration::from_secs(2);
        while !worker.published.lock().contains(&key) && std::time::Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(5));
        }
        assert!(worker.published.lock().contains(&key));

        worker.stop.store(true, Ordering::SeqCst);
        worker
            .done_rx
            .recv_timeout(Duration::from_secs(2))
            .unwrap()
            .unwrap();
        worker.handle.join().unwrap();
    }

    #[test]
    fn test_stream_loss_terminates_and_flags_stopping() {
        let (tx, source) = fake_source();
        let adapter = Arc::new(FakeAdapter::with_source(source));

        let worker = spawn_worker(adapter, None);
        worker
            .ack_rx
            .recv_timeout(Duration::from_secs(1))
            .unwrap()
            .unwrap();
        assert_eq!(worker.status.get(), ListenerStatus::Running);

        // Sender gone with no stop requested: the worker must tear down
        // on its own and make the loss visible through the status
        drop(tx);
        worker
            .done_rx
            .recv_timeout(Duration::from_secs(2))
            .unwrap()
            .unwrap();
        worker.handle.join().unwrap();
        assert_eq!(worker.status.get(), ListenerStatus::Stopping);
    }
}
