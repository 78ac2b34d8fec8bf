//! Per-route FIFO queues and the process-wide registry over them.
//!
//! Producers enqueue records for a route; consumers and the spill
//! scheduler dequeue them. Each route owns one [`RouteBuffer`] holding its
//! queue and a running byte counter under a single mutex, so queue and
//! counter always move together. The registry itself is constructed once
//! at startup and shared by `Arc` — there is no ambient global state.
//!
//! Enqueue never blocks and never rejects for capacity: budgets are
//! enforced asynchronously by the scheduler, not at the producer boundary.

use std::collections::HashMap;
use std::collections::VecDeque;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};

use crate::estimate::estimated_size;
use crate::record::DataRecord;

/// A record queued in memory together with the size estimate computed at
/// enqueue time.
///
/// The stored estimate is what dequeue subtracts, never a recomputed one,
/// keeping the counter symmetric whatever happens to the record meanwhile.
struct QueuedRecord {
    record: DataRecord,
    estimate: u64,
}

struct RouteBufferInner {
    queue: VecDeque<QueuedRecord>,
    size_bytes: u64,
}

/// One route's FIFO queue plus its running size counter.
///
/// Created lazily on first access and kept for the life of the registry.
pub struct RouteBuffer {
    inner: Mutex<RouteBufferInner>,
}

impl RouteBuffer {
    fn new() -> Self {
        RouteBuffer {
            inner: Mutex::new(RouteBufferInner {
                queue: VecDeque::new(),
                size_bytes: 0,
            }),
        }
    }

    /// Appends a record and adds its estimate to the counter.
    pub fn enqueue(&self, record: DataRecord) {
        let estimate = estimated_size(&record);
        let mut inner = self.inner.lock();
        inner.size_bytes += estimate;
        inner.queue.push_back(QueuedRecord { record, estimate });
    }

    /// Removes the oldest record, subtracting its recorded estimate.
    pub fn try_dequeue(&self) -> Option<DataRecord> {
        let mut inner = self.inner.lock();
        let queued = inner.queue.pop_front()?;
        inner.size_bytes = inner.size_bytes.saturating_sub(queued.estimate);
        Some(queued.record)
    }

    /// The running size counter, in estimated bytes.
    pub fn size_bytes(&self) -> u64 {
        self.inner.lock().size_bytes
    }

    /// Number of records currently queued.
    pub fn len(&self) -> usize {
        self.inner.lock().queue.len()
    }

    /// True if no records are queued.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Lookup and creation of per-route buffers, plus the enqueue / dequeue /
/// size-query surface producers and consumers use.
///
/// One buffer per route name: dequeue order is FIFO within a route.
#[derive(Default)]
pub struct BufferRegistry {
    buffers: RwLock<HashMap<String, Arc<RouteBuffer>>>,
}

impl BufferRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the buffer for `route`, creating it on first access.
    pub fn get_or_create(&self, route: &str) -> Arc<RouteBuffer> {
        if let Some(buffer) = self.buffers.read().get(route) {
            return Arc::clone(buffer);
        }
        let mut buffers = self.buffers.write();
        Arc::clone(
            buffers
                .entry(route.to_string())
                .or_insert_with(|| Arc::new(RouteBuffer::new())),
        )
    }

    /// Appends a record to `route`'s queue.
    ///
    /// Never blocks and never rejects for capacity; the spill scheduler
    /// enforces budgets asynchronously.
    pub fn enqueue(&self, route: &str, record: DataRecord) {
        self.get_or_create(route).enqueue(record);
    }

    /// Re-enqueues a record under a route name, used by disk recovery.
    ///
    /// Recovered data is not tied to the producer that originally queued
    /// it, so this entry point is keyed by route name alone.
    pub fn broadcast_enqueue(&self, route: &str, record: DataRecord) {
        self.get_or_create(route).enqueue(record);
    }

    /// Removes and returns the oldest record queued for `route`.
    ///
    /// Returns `None` when the route has no buffer or the buffer is empty.
    pub fn try_dequeue(&self, route: &str) -> Option<DataRecord> {
        let buffer = Arc::clone(self.buffers.read().get(route)?);
        buffer.try_dequeue()
    }

    /// The estimated byte footprint currently queued for `route`.
    pub fn size_of(&self, route: &str) -> u64 {
        self.buffers
            .read()
            .get(route)
            .map_or(0, |buffer| buffer.size_bytes())
    }

    /// Number of records currently queued for `route`.
    pub fn depth_of(&self, route: &str) -> usize {
        self.buffers.read().get(route).map_or(0, |buffer| buffer.len())
    }

    /// The distinct registered route names, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.buffers.read().keys().cloned().collect();
        names.sort();
        names
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::FieldValue;
    use crate::timefmt::TimeFormat;
    use chrono::DateTime;

    fn record(route: &str, value: f64) -> DataRecord {
        let mut record = DataRecord::new(route);
        record
            .append_row(
                &["value"],
                &[FieldValue::Number(value)],
                DateTime::from_timestamp_millis(1_700_000_000_000).unwrap(),
                TimeFormat::UnixMillis,
            )
            .unwrap();
        record
    }

    #[test]
    fn test_fifo_order_and_counter_symmetry() {
        let registry = BufferRegistry::new();
        let before = registry.size_of("r");

        for i in 0..10 {
            registry.enqueue("r", record("r", f64::from(i)));
        }
        assert!(registry.size_of("r") > before);
        assert_eq!(registry.depth_of("r"), 10);

        for i in 0..10 {
            let out = registry.try_dequeue("r").unwrap();
            assert_eq!(
                out.samples[0].fields()[0].value,
                FieldValue::Number(f64::from(i))
            );
        }
        assert_eq!(registry.size_of("r"), before);
        assert!(registry.try_dequeue("r").is_none());
    }

    #[test]
    fn test_get_or_create_is_idempotent() {
        let registry = BufferRegistry::new();
        let a = registry.get_or_create("r");
        let b = registry.get_or_create("r");
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(registry.names(), vec!["r".to_string()]);
    }

    #[test]
    fn test_unknown_route_reads_as_empty() {
        let registry = BufferRegistry::new();
        assert_eq!(registry.size_of("missing"), 0);
        assert_eq!(registry.depth_of("missing"), 0);
        assert!(registry.try_dequeue("missing").is_none());
        // A size query never creates a buffer.
        assert!(registry.names().is_empty());
    }

    #[test]
    fn test_routes_are_isolated() {
        let registry = BufferRegistry::new();
        registry.enqueue("a", record("a", 1.0));
        registry.enqueue("b", record("b", 2.0));

        assert_eq!(registry.depth_of("a"), 1);
        assert_eq!(registry.depth_of("b"), 1);
        assert_eq!(registry.names(), vec!["a".to_string(), "b".to_string()]);

        registry.try_dequeue("a").unwrap();
        assert_eq!(registry.depth_of("a"), 0);
        assert_eq!(registry.depth_of("b"), 1);
    }

    #[test]
    fn test_broadcast_enqueue_reaches_route_buffer() {
        let registry = BufferRegistry::new();
        registry.broadcast_enqueue("r", record("r", 7.0));
        assert_eq!(registry.depth_of("r"), 1);
        assert!(registry.size_of("r") > 0);
    }

    #[test]
    fn test_concurrent_producers_account_consistently() {
        let registry = Arc::new(BufferRegistry::new());
        let mut handles = Vec::new();
        for t in 0..4 {
            let registry = Arc::clone(&registry);
            handles.push(std::thread::spawn(move || {
                for i in 0..100 {
                    registry.enqueue("shared", record("shared", f64::from(t * 100 + i)));
                }
            }));
        }
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(registry.depth_of("shared"), 400);
        while registry.try_dequeue("shared").is_some() {}
        assert_eq!(registry.size_of("shared"), 0);
    }
}
