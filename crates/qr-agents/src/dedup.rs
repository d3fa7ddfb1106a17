//! Deduplication window for redelivered stage messages.
//!
//! A message is identified by the SHA-256 of its JSON encoding. A digest is
//! claimed when a hop starts and recorded as completed only when the hop
//! succeeds; a failed hop releases its claim so a redelivery can retry it.
//! Completed digests are kept in a bounded FIFO.

use std::collections::{HashSet, VecDeque};
use std::sync::{Mutex, PoisonError};

use sha2::{Digest, Sha256};

use qr_core::{Error, StageMessage};

pub fn message_digest(message: &StageMessage) -> Result<String, Error> {
    let payload = message.to_json()?;
    Ok(hex::encode(Sha256::digest(payload.as_bytes())))
}

pub struct DedupWindow {
    inner: Mutex<WindowState>,
}

struct WindowState {
    capacity: usize,
    in_flight: HashSet<String>,
    completed: HashSet<String>,
    order: VecDeque<String>,
}

impl DedupWindow {
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(WindowState {
                capacity: capacity.max(1),
                in_flight: HashSet::new(),
                completed: HashSet::new(),
                order: VecDeque::new(),
            }),
        }
    }

    /// Claim `digest` for handling. Returns `false` if it is already being
    /// handled or was handled recently.
    pub fn begin(&self, digest: &str) -> bool {
        let mut state = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        if state.completed.contains(digest) || state.in_flight.contains(digest) {
            return false;
        }
        state.in_flight.insert(digest.to_string());
        true
    }

    /// Record a successful hop.
    pub fn complete(&self, digest: &str) {
        let mut state = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        state.in_flight.remove(digest);
        if state.completed.insert(digest.to_string()) {
            state.order.push_back(digest.to_string());
        }
        while state.order.len() > state.capacity {
            if let Some(oldest) = state.order.pop_front() {
                state.completed.remove(&oldest);
            }
        }
    }

    /// Release the claim of a failed hop.
    pub fn abandon(&self, digest: &str) {
        let mut state = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        state.in_flight.remove(digest);
    }

    pub fn len(&self) -> usize {
        let state = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        state.completed.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
