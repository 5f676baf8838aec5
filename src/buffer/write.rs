//! The write channel: a bounded MPSC buffer between producers and the
//! single pipeline consumer.
//!
//! `insert` and `remove` never mutate policy state themselves — they
//! enqueue a [`WriteOp`] and return.  The consumer drains the channel and
//! applies every op in order, which is what keeps the policy's cost map
//! and the store in lockstep without cross-locking.
//!
//! Overflow on `insert` is not an error: the op is dropped and counted as
//! `sets-dropped`.  Capacity is generous enough that drops only happen
//! under sustained write pressure.

use std::sync::Arc;

use crossbeam_channel::{bounded, Receiver, Sender};

/// Capacity of the write channel.
pub(crate) const WRITE_BUFFER_SIZE: usize = 32 * 1024;

/// Work items serialized through the pipeline.
pub(crate) enum WriteOp<V> {
    /// A key the store hasn't seen: run admission, write on acceptance.
    Add {
        key_hash: u64,
        conflict: u64,
        value: Arc<V>,
        cost: i64,
    },
    /// The producer already replaced the stored value optimistically;
    /// only the cost accounting is left to do.
    Update {
        key_hash: u64,
        value: Arc<V>,
        cost: i64,
    },
    /// Remove from policy and store.
    Remove { key_hash: u64, conflict: u64 },
    /// Quiesce marker: the consumer acks once everything enqueued before
    /// it has been applied.
    Drain(Sender<()>),
}

pub(crate) fn write_channel<V>() -> (Sender<WriteOp<V>>, Receiver<WriteOp<V>>) {
    bounded(WRITE_BUFFER_SIZE)
}
