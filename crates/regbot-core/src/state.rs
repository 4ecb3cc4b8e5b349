//! Short-lived per-user interaction state for multi-step commands.
//!
//! Expiry is lazy: an entry is only checked (and dropped) when its own key is
//! read. A key that is set once and never read again stays resident until
//! [`EphemeralStateStore::clear`] or process exit.

use std::{collections::HashMap, time::Duration};

use parking_lot::Mutex;
use tokio::time::Instant;

/// Opaque per-user payload, e.g. `{"command": "query"}`.
pub type StatePayload = serde_json::Map<String, serde_json::Value>;

#[derive(Clone, Debug)]
struct UserStateEntry {
    payload: StatePayload,
    last_updated: Instant,
}

pub struct EphemeralStateStore {
    ttl: Duration,
    entries: Mutex<HashMap<String, UserStateEntry>>,
}

impl EphemeralStateStore {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Insert or replace the entry for `key`, refreshing its timestamp.
    pub fn set(&self, key: &str, payload: StatePayload) {
        self.entries.lock().insert(
            key.to_string(),
            UserStateEntry {
                payload,
                last_updated: Instant::now(),
            },
        );
    }

    /// Current payload for `key`; an expired entry is removed and reported absent.
    pub fn get(&self, key: &str) -> Option<StatePayload> {
        let mut entries = self.entries.lock();
        let expired = entries.get(key)?.last_updated.elapsed() > self.ttl;
        if expired {
            entries.remove(key);
            tracing::debug!(key, "user state expired");
            return None;
        }
        entries.get(key).map(|e| e.payload.clone())
    }

    pub fn clear(&self, key: &str) {
        self.entries.lock().remove(key);
    }

    /// Resident entries, including expired ones not yet touched.
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
