//! Key state table: the set of currently-pressed keys
//!
//! Pure state with no failure modes. The listener worker is the only
//! writer; everyone else sees immutable snapshots.

use serde::Serialize;

use crate::keys::{KeyDirection, KeyId, KeyTransition};

/// Immutable point-in-time view of the pressed-key set.
///
/// Keys appear in insertion order of the current press. Callers must treat
/// the sequence as a set; ordering across snapshots is not part of the
/// contract.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct Snapshot {
    keys: Vec<KeyId>,
}

impl Snapshot {
    /// The pressed keys as a slice
    pub fn keys(&self) -> &[KeyId] {
        &self.keys
    }

    /// Number of keys currently down
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    /// True if no keys are down
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// True if the given key is in the pressed set
    pub fn contains(&self, key: &KeyId) -> bool {
        self.keys.contains(key)
    }

    /// Key tokens as owned strings, for hosts that want plain names
    pub fn names(&self) -> Vec<String> {
        self.keys.iter().map(|k| k.to_string()).collect()
    }
}

impl<'a> IntoIterator for &'a Snapshot {
    type Item = &'a KeyId;
    type IntoIter = std::slice::Iter<'a, KeyId>;

    fn into_iter(self) -> Self::IntoIter {
        self.keys.iter()
    }
}

/// Tracks which keys are currently down.
///
/// Invariant: a key is present iff its most recent transition was `Down`.
/// `apply` guards against adapter-level duplicates, so a repeated `Down`
/// (or an `Up` for a key that is not held) changes nothing and produces no
/// snapshot.
#[derive(Debug, Default)]
pub struct KeyStateTable {
    pressed: Vec<KeyId>,
}

impl KeyStateTable {
    /// Create an empty table
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply a transition, returning the new snapshot only if the pressed
    /// set actually changed.
    pub fn apply(&mut self, transition: &KeyTransition) -> Option<Snapshot> {
        let changed = match transition.direction {
            KeyDirection::Down => {
                if self.pressed.contains(&transition.key) {
                    false
                } else {
                    self.pressed.push(transition.key.clone());
                    true
                }
            }
            KeyDirection::Up => {
                if let Some(pos) = self.pressed.iter().position(|k| k == &transition.key) {
                    self.pressed.remove(pos);
                    true
                } else {
                    false
                }
            }
        };

        changed.then(|| self.snapshot())
    }

    /// Point-in-time copy of the pressed set
    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            keys: self.pressed.clone(),
        }
    }
}
