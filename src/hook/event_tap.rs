//! macOS hook adapter built on CGEventTap
//!
//! Installs a listen-only event tap on a dedicated thread with its own
//! CFRunLoop and translates KeyDown/KeyUp/FlagsChanged events into
//! [`KeyTransition`]s. Requires Accessibility permission.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Sender};
use std::sync::Arc;
use std::time::Duration;

use core_foundation::runloop::{kCFRunLoopCommonModes, kCFRunLoopDefaultMode, CFRunLoop};
use core_graphics::event::{
    CGEvent, CGEventTap, CGEventTapLocation, CGEventTapOptions, CGEventTapPlacement, CGEventType,
    EventField,
};
use tracing::{debug, info, warn};

use super::{keycodes, EventSource, HookError, HookHandle};
use crate::config::Config;
use crate::keys::{KeyDirection, KeyId, KeyTransition};

/// Run-loop slice length; bounds how long a stop request can go unnoticed
const RUN_LOOP_SLICE: Duration = Duration::from_millis(100);

/// Hook adapter backed by a CGEventTap
pub struct EventTapAdapter {
    ready_timeout: Duration,
    teardown_timeout: Duration,
}

impl EventTapAdapter {
    /// Create an adapter with the given timing configuration
    pub fn new(config: &Config) -> Self {
        Self {
            ready_timeout: config.start_timeout,
            teardown_timeout: config.teardown_timeout,
        }
    }
}

impl super::HookAdapter for EventTapAdapter {
    fn register(&self) -> Result<EventSource, HookError> {
        super::acquire_registration()?;

        let stop = Arc::new(AtomicBool::new(false));
        let (event_tx, event_rx) = mpsc::channel();
        let (ready_tx, ready_rx) = mpsc::channel();

        let thread_stop = stop.clone();
        let thread = std::thread::Builder::new()
            .name("keywatch-hook".to_string())
            .spawn(move || {
                run_tap_loop(event_tx, thread_stop, ready_tx);
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
                // Thread exits right after reporting; gate already released
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

/// Create the tap, pump the run loop until stopped, emit transitions
fn run_tap_loop(
    event_tx: Sender<KeyTransition>,
    stop: Arc<AtomicBool>,
    ready_tx: Sender<Result<(), HookError>>,
) {
    // Tap callback - must be fast and non-blocking
    let callback = move |_proxy: core_graphics::event::CGEventTapProxy,
                         event_type: CGEventType,
                         event: &CGEvent|
          -> Option<CGEvent> {
        match event_type {
            CGEventType::KeyDown | CGEventType::KeyUp => {
                // OS auto-repeat re-delivers KeyDown while a key is held
                let autorepeat =
                    event.get_integer_value_field(EventField::KEYBOARD_EVENT_AUTOREPEAT);
                if autorepeat == 0 {
                    let key_code =
                        event.get_integer_value_field(EventField::KEYBOARD_EVENT_KEYCODE) as u32;
                    let direction = if matches!(event_type, CGEventType::KeyDown) {
                        KeyDirection::Down
                    } else {
                        KeyDirection::Up
                    };
                    let key = KeyId::new(keycodes::keycode_to_name(key_code));
                    let _ = event_tx.send(KeyTransition::new(key, direction));
                }
            }
            CGEventType::FlagsChanged => {
                let key_code =
                    event.get_integer_value_field(EventField::KEYBOARD_EVENT_KEYCODE) as u32;
                let flags = event.get_flags().bits();
                if let Some((token, pressed)) = keycodes::modifier_transition(key_code, flags) {
                    let direction = if pressed {
                        KeyDirection::Down
                    } else {
                        KeyDirection::Up
                    };
                    let _ = event_tx.send(KeyTransition::new(KeyId::new(token), direction));
                }
            }
            CGEventType::TapDisabledByTimeout | CGEventType::TapDisabledByUserInput => {
                warn!("event tap disabled by the OS, key events may be missed");
            }
            _ => {}
        }
        Some(event.clone())
    };

    let tap = match CGEventTap::new(
        CGEventTapLocation::Session,
        CGEventTapPlacement::HeadInsertEventTap,
        CGEventTapOptions::ListenOnly,
        vec![
            CGEventType::KeyDown,
            CGEventType::KeyUp,
            CGEventType::FlagsChanged,
        ],
        callback,
    ) {
        Ok(tap) => tap,
        Err(()) => {
            let _ = ready_tx.send(Err(HookError::PermissionDenied(
                "failed to create event tap (is Accessibility permission granted?)".to_string(),
            )));
            return;
        }
    };

    let run_loop_source = match tap.mach_port.create_runloop_source(0) {
        Ok(source) => source,
        Err(_) => {
            let _ = ready_tx.send(Err(HookError::Install(
                "failed to create run loop source for event tap".to_string(),
            )));
            return;
        }
    };

    let run_loop = CFRunLoop::get_current();
    unsafe {
        run_loop.add_source(&run_loop_source, kCFRunLoopCommonModes);
    }
    tap.enable();

    info!("event tap installed");
    let _ = ready_tx.send(Ok(()));

    // Pump the run loop in short slices so the stop flag is observed
    while !stop.load(Ordering::SeqCst) {
        unsafe {
            CFRunLoop::run_in_mode(kCFRunLoopDefaultMode, RUN_LOOP_SLICE, true);
        }
    }

    // Tap and run loop source are cleaned up when they drop
    debug!("event tap removed, hook thread exiting");
}
