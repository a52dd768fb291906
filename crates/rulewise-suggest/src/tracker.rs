use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};

/// Proof that an analysis was started for `key` at a given submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ticket {
    key: String,
    generation: u64,
}

impl Ticket {
    pub fn key(&self) -> &str {
        &self.key
    }
}

/// Orders concurrent analyses of the same rule by submission, not by
/// completion. Only the newest ticket for a key may publish its result.
#[derive(Debug, Default)]
pub struct AnalysisTracker {
    latest: Mutex<HashMap<String, u64>>,
    next: AtomicU64,
}

impl AnalysisTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start an analysis for `key`, superseding any in flight.
    pub fn begin(&self, key: impl Into<String>) -> Ticket {
        let key = key.into();
        let generation = self.next.fetch_add(1, Ordering::SeqCst) + 1;
        self.latest
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.clone(), generation);
        Ticket { key, generation }
    }

    pub fn is_current(&self, ticket: &Ticket) -> bool {
        self.latest
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&ticket.key)
            == Some(&ticket.generation)
    }

    /// Whether any ticket for `key` is still unpublished.
    pub fn in_flight(&self, key: &str) -> bool {
        self.latest
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(key)
    }

    /// `Some(value)` if `ticket` is still the newest for its key.
    pub fn accept<T>(&self, ticket: &Ticket, value: T) -> Option<T> {
        if self.is_current(ticket) {
            Some(value)
        } else {
            tracing::warn!(
                key = %ticket.key,
                generation = ticket.generation,
                "dropping stale analysis"
            );
            None
        }
    }

    /// Drop tracking for `key` so any in-flight result for it is discarded.
    pub fn forget(&self, key: &str) {
        self.latest
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(key);
    }

    /// Release `ticket` once its result is published. A newer ticket for the
    /// same key is left in place.
    pub fn finish(&self, ticket: &Ticket) {
        let mut latest = self.latest.lock().unwrap_or_else(PoisonError::into_inner);
        if latest.get(&ticket.key) == Some(&ticket.generation) {
            latest.remove(&ticket.key);
        }
    }
}
