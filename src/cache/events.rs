//! Purge events and the in-memory queue they wait in.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

use metrics::gauge;
use time::OffsetDateTime;
use tracing::info;
use uuid::Uuid;

use super::lock::mutex_lock;

const SOURCE: &str = "cache::events";

/// Monotonic epoch for ordering events within this process.
pub type Epoch = u64;

/// Purge event with idempotency and ordering support.
#[derive(Debug, Clone)]
pub struct CacheEvent {
    /// Unique identifier for idempotency (UUIDv4).
    pub id: Uuid,
    pub epoch: Epoch,
    pub kind: EventKind,
    pub timestamp: OffsetDateTime,
}

impl CacheEvent {
    pub fn new(kind: EventKind, epoch: Epoch) -> Self {
        Self {
            id: Uuid::new_v4(),
            epoch,
            kind,
            timestamp: OffsetDateTime::now_utc(),
        }
    }
}

/// What a write asked the frontend cache to drop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventKind {
    /// Everything (`X-Cache-Invalidate: /*`).
    PurgeAll,
    /// Specific site paths, e.g. a post preview.
    PurgePaths { paths: Vec<String> },
}

impl EventKind {
    /// Parse an `X-Cache-Invalidate` header value.
    pub fn from_header(value: &str) -> Option<Self> {
        let paths: Vec<String> = value
            .split(',')
            .map(str::trim)
            .filter(|path| !path.is_empty())
            .map(str::to_string)
            .collect();

        if paths.is_empty() {
            None
        } else if paths.iter().any(|path| path == "/*") {
            Some(Self::PurgeAll)
        } else {
            Some(Self::PurgePaths { paths })
        }
    }
}

/// In-memory event queue. Contention is low, so a mutex is enough.
pub struct EventQueue {
    queue: Mutex<VecDeque<CacheEvent>>,
    epoch_counter: AtomicU64,
}

impl EventQueue {
    pub fn new() -> Self {
        Self {
            queue: Mutex::new(VecDeque::new()),
            epoch_counter: AtomicU64::new(0),
        }
    }

    pub fn next_epoch(&self) -> Epoch {
        self.epoch_counter.fetch_add(1, Ordering::SeqCst)
    }

    pub fn publish(&self, kind: EventKind) {
        let epoch = self.next_epoch();
        let event = CacheEvent::new(kind.clone(), epoch);

        info!(
            target = "quire::cache::events",
            event_id = %event.id,
            event_epoch = event.epoch,
            event_kind = ?kind,
            "purge event enqueued"
        );

        let mut queue = mutex_lock(&self.queue, SOURCE, "publish");
        queue.push_back(event);
        gauge!("quire_cache_event_queue_len").set(queue.len() as f64);
    }

    /// Drain up to `limit` events in FIFO order.
    pub fn drain(&self, limit: usize) -> Vec<CacheEvent> {
        let mut queue = mutex_lock(&self.queue, SOURCE, "drain");
        let count = limit.min(queue.len());
        let drained: Vec<CacheEvent> = queue.drain(..count).collect();
        gauge!("quire_cache_event_queue_len").set(queue.len() as f64);
        drained
    }

    pub fn len(&self) -> usize {
        mutex_lock(&self.queue, SOURCE, "len").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        mutex_lock(&self.queue, SOURCE, "clear").clear();
    }
}

impl Default for EventQueue {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use std::panic::{AssertUnwindSafe, catch_unwind};

    use super::*;

    fn paths(values: &[&str]) -> EventKind {
        EventKind::PurgePaths {
            paths: values.iter().map(|value| value.to_string()).collect(),
        }
    }

    #[test]
    fn header_values_parse() {
        assert_eq!(EventKind::from_header("/*"), Some(EventKind::PurgeAll));
        assert_eq!(EventKind::from_header("/p/abc/"), Some(paths(&["/p/abc/"])));
        assert_eq!(
            EventKind::from_header("/p/a/, /p/b/"),
            Some(paths(&["/p/a/", "/p/b/"]))
        );
        assert_eq!(EventKind::from_header("/p/a/, /*"), Some(EventKind::PurgeAll));
        assert_eq!(EventKind::from_header(" , "), None);
    }

    #[test]
    fn epoch_monotonicity() {
        let queue = EventQueue::new();

        let e1 = queue.next_epoch();
        let e2 = queue.next_epoch();
        assert!(e1 < e2);
    }

    #[test]
    fn publish_and_drain() {
        let queue = EventQueue::new();

        queue.publish(EventKind::PurgeAll);
        queue.publish(paths(&["/p/one/"]));
        queue.publish(paths(&["/p/two/"]));
        assert_eq!(queue.len(), 3);

        let events = queue.drain(2);
        assert_eq!(events.len(), 2);
        assert_eq!(queue.len(), 1);
        assert_eq!(events[0].kind, EventKind::PurgeAll);
        assert_eq!(events[1].kind, paths(&["/p/one/"]));

        queue.clear();
        assert!(queue.is_empty());
    }

    #[test]
    fn event_queue_recovers_from_poisoned_lock() {
        let queue = EventQueue::new();

        let _ = catch_unwind(AssertUnwindSafe(|| {
            let _guard = queue.queue.lock().expect("queue lock should be acquired");
            panic!("poison queue lock");
        }));

        queue.publish(EventKind::PurgeAll);
        assert_eq!(queue.len(), 1);
    }
}
