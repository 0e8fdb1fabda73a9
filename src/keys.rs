//! Key identifiers and raw key transitions
//!
//! Provides the stable key token type used across the crate and the
//! transition events emitted by hook adapters.

use std::fmt;
use std::time::Instant;

use serde::{Deserialize, Serialize};

/// Stable, opaque token for a physical key (e.g. `"LControl"`, `"Key0"`).
///
/// Adapters must produce the same token for the same physical key for the
/// lifetime of the process. The token family follows device_query's key
/// naming so both the polling and event-tap adapters agree.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct KeyId(String);

impl KeyId {
    /// Create a key identifier from a token
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    /// The token as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for KeyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for KeyId {
    fn from(token: &str) -> Self {
        Self(token.to_string())
    }
}

impl From<String> for KeyId {
    fn from(token: String) -> Self {
        Self(token)
    }
}

/// Direction of a key transition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeyDirection {
    /// Key was pressed
    Down,
    /// Key was released
    Up,
}

/// A single physical key transition reported by a hook adapter.
///
/// Adapters emit exactly one transition per hardware event and never
/// coalesce. Duplicate suppression (e.g. OS auto-repeat that slips through)
/// is the state table's job.
#[derive(Debug, Clone)]
pub struct KeyTransition {
    /// Which key changed
    pub key: KeyId,
    /// Press or release
    pub direction: KeyDirection,
    /// Monotonic instant the adapter observed the event
    pub at: Instant,
}

impl KeyTransition {
    /// Create a transition stamped with the current instant
    pub fn new(key: KeyId, direction: KeyDirection) -> Self {
        Self {
            key,
            direction,
            at: Instant::now(),
        }
    }

    /// Shorthand for a press transition
    pub fn down(key: impl Into<KeyId>) -> Self {
        Self::new(key.into(), KeyDirection::Down)
    }

    /// Shorthand for a release transition
    pub fn up(key: impl Into<KeyId>) -> Self {
        Self::new(key.into(), KeyDirection::Up)
    }
}
