//! Tracked-entity store: the relay's only shared mutable state.
//!
//! The list is replaced wholesale by the control endpoint and read by every
//! dispatch decision. Readers receive an immutable snapshot that shares the
//! underlying allocation, so a snapshot is an `Arc` clone under a read lock
//! and a replace is an `Arc` swap under a write lock. No I/O ever happens
//! while either lock is held.

use std::ops::Deref;
use std::sync::{Arc, RwLock};

use serde::{Serialize, Serializer};

/// Immutable snapshot of the tracked entity names, in configured order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackedEntities(Arc<[String]>);

impl TrackedEntities {
    /// Build a snapshot from a list of names.
    pub fn new(names: Vec<String>) -> Self {
        Self(names.into())
    }

    /// Exact, case-sensitive membership test.
    pub fn contains(&self, name: &str) -> bool {
        self.0.iter().any(|n| n == name)
    }

    /// Names as a slice.
    pub fn as_slice(&self) -> &[String] {
        &self.0
    }

    /// Copy the names into an owned vector.
    pub fn to_vec(&self) -> Vec<String> {
        self.0.to_vec()
    }

    /// Whether two snapshots share the same allocation.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl Deref for TrackedEntities {
    type Target = [String];

    fn deref(&self) -> &[String] {
        &self.0
    }
}

impl Default for TrackedEntities {
    fn default() -> Self {
        Self::new(Vec::new())
    }
}

impl From<Vec<String>> for TrackedEntities {
    fn from(names: Vec<String>) -> Self {
        Self::new(names)
    }
}

impl Serialize for TrackedEntities {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.as_slice().serialize(serializer)
    }
}

/// Synchronized holder of the current [`TrackedEntities`].
#[derive(Debug, Default)]
pub struct TrackedEntityStore {
    current: RwLock<TrackedEntities>,
}

impl TrackedEntityStore {
    /// Create a store holding the initial list.
    pub fn new(initial: Vec<String>) -> Self {
        Self {
            current: RwLock::new(TrackedEntities::new(initial)),
        }
    }

    /// Current list. Never observes a partially replaced list.
    pub fn snapshot(&self) -> TrackedEntities {
        // A poisoned lock still guards a whole list: the only write is a
        // single assignment, which cannot be observed half-done.
        match self.current.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Atomically substitute the stored list.
    pub fn replace(&self, names: Vec<String>) {
        let next = TrackedEntities::new(names);
        match self.current.write() {
            Ok(mut guard) => *guard = next,
            Err(poisoned) => *poisoned.into_inner() = next,
        }
    }
}
