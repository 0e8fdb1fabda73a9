//! keywatch: process-wide observation of global keyboard state
//!
//! Reports which keys are currently held down anywhere in the OS,
//! regardless of window focus. A supervised background worker installs a
//! low-level keyboard hook, keeps a consistent pressed-key snapshot as
//! transitions arrive, and republishes it to the host either on demand
//! (poll) or through a push callback fired on every change.
//!
//! - [`KeyListener`]: lifecycle controller (`start` / `stop` / `unload` /
//!   `get_keys` / `is_running`)
//! - [`hook`]: the adapter seam over the OS hook mechanism, with bundled
//!   platform adapters
//! - [`Snapshot`] / [`KeyId`]: the host-visible key state types
//!
//! Observation only: this crate never synthesizes input.
//!
//! ```no_run
//! use keywatch::KeyListener;
//!
//! let listener = KeyListener::new();
//! listener.start_with_sink(|snapshot| {
//!     println!("held: {:?}", snapshot.names());
//! })?;
//! // ...
//! listener.unload()?;
//! # Ok::<(), keywatch::Error>(())
//! ```

mod config;
mod error;
pub mod hook;
mod keys;
mod listener;
mod state;
mod worker;

pub use config::Config;
pub use error::Error;
pub use keys::{KeyDirection, KeyId, KeyTransition};
pub use listener::{KeyListener, ListenerStatus};
pub use state::{KeyStateTable, Snapshot};

/// Crate version string, for hosts that surface it
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

#[cfg(test)]
mod tests {
    #[test]
    fn test_version_matches_manifest() {
        assert_eq!(super::version(), env!("CARGO_PKG_VERSION"));
        assert!(!super::version().is_empty());
    }
}
