//! Types for the registry watch API.
//!
//! The server bootstraps a subscriber with one `Added` per currently-
//! live instance, then emits deltas.

use serde::{Deserialize, Serialize};
use std::fmt::Debug;

/// An event observed on a `Watch` stream for resource `K`.
#[derive(Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "object", rename_all = "UPPERCASE")]
pub enum WatchEvent<K> {
    /// `K` is newly observed (covers both genuinely-new instances and
    /// the bootstrap snapshot sent when a watch subscribes).
    Added(K),
    /// A watched field changed: `endpoint`, `status`, `weight`,
    /// `protocol`, or `metadata`. Heartbeat-only refreshes never
    /// produce this.
    Modified(K),
    /// `K` was deregistered or reaped.
    Deleted(K),
}

impl<K> Debug for WatchEvent<K> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WatchEvent::Added(_) => write!(f, "Added"),
            WatchEvent::Modified(_) => write!(f, "Modified"),
            WatchEvent::Deleted(_) => write!(f, "Deleted"),
        }
    }
}

impl<K> WatchEvent<K> {
    pub fn as_inner(&self) -> &K {
        match self {
            WatchEvent::Added(k) | WatchEvent::Modified(k) | WatchEvent::Deleted(k) => k,
        }
    }

    pub fn into_inner(self) -> K {
        match self {
            WatchEvent::Added(k) | WatchEvent::Modified(k) | WatchEvent::Deleted(k) => k,
        }
    }
}
