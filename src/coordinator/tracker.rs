//! Local membership subscription
//!
//! Components running in the coordinator's process (recovery orchestration,
//! tablet placement, and the like) observe membership changes through
//! trackers registered with the server list. Mutator paths enqueue the change
//! on every tracker and then fire the callbacks, all while holding the list
//! lock; callbacks must therefore never call back into the list.

use crate::coordinator::entry::Entry;
use std::collections::VecDeque;
use std::sync::Mutex;

/// What happened to a server.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerChangeEvent {
    Added,
    Crashed,
    Removed,
}

/// Receiver of membership changes. Event order mirrors the order of rows in
/// the published deltas.
pub trait ServerTracker: Send + Sync {
    fn enqueue_change(&self, entry: &Entry, event: ServerChangeEvent);
    fn fire_callback(&self);
}

/// One queued change.
#[derive(Debug, Clone)]
pub struct TrackedChange {
    pub entry: Entry,
    pub event: ServerChangeEvent,
}

type Callback = Box<dyn Fn() + Send + Sync>;

/// Queue-backed tracker for consumers that poll changes on their own thread.
#[derive(Default)]
pub struct EventQueueTracker {
    changes: Mutex<VecDeque<TrackedChange>>,
    callback: Option<Callback>,
}

impl EventQueueTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Tracker that runs `callback` after each batch of enqueued changes.
    /// The callback runs under the server list lock; it must only signal.
    pub fn with_callback(callback: impl Fn() + Send + Sync + 'static) -> Self {
        Self {
            changes: Mutex::new(VecDeque::new()),
            callback: Some(Box::new(callback)),
        }
    }

    /// Take the oldest pending change, if any.
    pub fn poll(&self) -> Option<TrackedChange> {
        self.changes.lock().unwrap().pop_front()
    }

    pub fn len(&self) -> usize {
        self.changes.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.changes.lock().unwrap().is_empty()
    }
}

impl ServerTracker for EventQueueTracker {
    fn enqueue_change(&self, entry: &Entry, event: ServerChangeEvent) {
        self.changes.lock().unwrap().push_back(TrackedChange {
            entry: entry.clone(),
            event,
        });
    }

    fn fire_callback(&self) {
        if let Some(callback) = &self.callback {
            callback();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::service_mask::ServiceType;
    use crate::common::{ServerId, ServiceMask};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn entry(index: u32) -> Entry {
        Entry::new(
            ServerId::new(index, 0),
            format!("mock:host=s{}", index),
            ServiceMask::from(ServiceType::Master),
        )
    }

    #[test]
    fn test_queue_order() {
        let tracker = EventQueueTracker::new();
        tracker.enqueue_change(&entry(1), ServerChangeEvent::Added);
        tracker.enqueue_change(&entry(1), ServerChangeEvent::Crashed);

        let first = tracker.poll().unwrap();
        assert_eq!(first.event, ServerChangeEvent::Added);
        let second = tracker.poll().unwrap();
        assert_eq!(second.event, ServerChangeEvent::Crashed);
        assert!(tracker.poll().is_none());
    }

    #[test]
    fn test_callback_fires() {
        let fired = Arc::new(AtomicUsize::new(0));
        let counter = fired.clone();
        let tracker = EventQueueTracker::with_callback(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        tracker.enqueue_change(&entry(1), ServerChangeEvent::Added);
        tracker.fire_callback();
        assert_eq!(fired.load(Ordering::SeqCst), 1);
        assert_eq!(tracker.len(), 1);
    }
}
