//! Lossy read buffer for frequency-sketch updates.
//!
//! Cache reads record their key-hash here instead of touching the policy.
//! Each producer thread owns a fixed-capacity stripe (a plain `Vec<u64>`
//! behind a `thread_local` slot), so the hot path is an uncontended
//! append.  When a stripe fills, the whole batch is handed to the
//! consumer in one call; if absorption contends, the batch is discarded.
//!
//! Read signals are best-effort by design.  Losing some under contention
//! is cheaper than stalling a `get`, and the frequency sketch only needs
//! representative counts.  Ordering among pushed hashes is not preserved.

use std::cell::RefCell;
use std::sync::Arc;

use thread_local::ThreadLocal;

use crate::metrics::{MetricType, Metrics};

/// Absorbs batches of key-hashes flushed from full stripes.
///
/// Returning `false` means the batch was dropped (absorption contended).
pub(crate) trait RingConsumer: Send + Sync {
    fn accept(&self, batch: &[u64]) -> bool;
}

/// Pool of per-thread stripes feeding a [`RingConsumer`].
pub(crate) struct RingBuffer<C> {
    consumer: Arc<C>,
    capacity: usize,
    stripes: ThreadLocal<RefCell<Vec<u64>>>,
    metrics: Option<Arc<Metrics>>,
}

impl<C: RingConsumer> RingBuffer<C> {
    pub(crate) fn new(consumer: Arc<C>, capacity: usize, metrics: Option<Arc<Metrics>>) -> Self {
        RingBuffer {
            consumer,
            capacity,
            stripes: ThreadLocal::new(),
            metrics,
        }
    }

    /// Records `key_hash` in this thread's stripe, flushing on fill.
    ///
    /// Never blocks the caller beyond the consumer's own `try_lock`.
    pub(crate) fn push(&self, key_hash: u64) {
        let stripe = self
            .stripes
            .get_or(|| RefCell::new(Vec::with_capacity(self.capacity)));
        let mut batch = stripe.borrow_mut();
        batch.push(key_hash);
        if batch.len() >= self.capacity {
            let kept = self.consumer.accept(&batch);
            if let Some(m) = &self.metrics {
                let t = if kept {
                    MetricType::GetsKept
                } else {
                    MetricType::GetsDropped
                };
                m.add(t, key_hash, batch.len() as u64);
            }
            batch.clear();
        }
    }
}
