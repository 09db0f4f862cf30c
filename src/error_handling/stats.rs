//! Refresh statistics tracking.
//!
//! Thread-safe counters for every refresh outcome, shared between the
//! background scheduler and request-serving tasks.

use std::collections::BTreeMap;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use strum::IntoEnumIterator;

use super::types::RefreshEvent;

/// Thread-safe refresh statistics tracker.
///
/// Every [`RefreshEvent`] is initialized to zero on creation, so counters can
/// be bumped from any task without further setup.
pub struct RefreshStats {
    events: HashMap<RefreshEvent, AtomicUsize>,
}

impl RefreshStats {
    pub fn new() -> Self {
        let mut events = HashMap::new();
        for event in RefreshEvent::iter() {
            events.insert(event, AtomicUsize::new(0));
        }

        RefreshStats { events }
    }

    /// Increment the counter for an event.
    pub fn record(&self, event: RefreshEvent) {
        if let Some(counter) = self.events.get(&event) {
            counter.fetch_add(1, Ordering::Relaxed);
        } else {
            log::error!(
                "Attempted to record refresh event {:?} which is not in the map. \
                 This indicates a bug in RefreshStats initialization.",
                event
            );
        }
    }

    /// Get the count for an event.
    pub fn count(&self, event: RefreshEvent) -> usize {
        self.events
            .get(&event)
            .map(|c| c.load(Ordering::SeqCst))
            .unwrap_or(0)
    }

    /// Snapshot of all counters keyed by their stable name.
    pub fn snapshot(&self) -> BTreeMap<&'static str, usize> {
        RefreshEvent::iter()
            .map(|event| (event.as_str(), self.count(event)))
            .collect()
    }
}

impl Default for RefreshStats {
    fn default() -> Self {
        Self::new()
    }
}
