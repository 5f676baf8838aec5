use std::hash::Hash;
use std::sync::{Arc, Weak};
use std::thread::JoinHandle;

use crossbeam_channel::{bounded, select, Receiver, Sender};
use parking_lot::{Mutex, RwLock};
use tracing::{debug, trace};

use crate::buffer::read::RingBuffer;
use crate::buffer::write::{write_channel, WriteOp};
use crate::builder::CacheBuilder;
use crate::cost::Coster;
use crate::hasher::KeyHasher;
use crate::listener::EvictionListener;
use crate::metrics::{MetricType, Metrics};
use crate::policy::LfuPolicy;
use crate::store::sharded::ShardedStore;

// ---------------------------------------------------------------------------
// Cache interior
// ---------------------------------------------------------------------------

/// Shared interior of a [`Cache`].
pub(crate) struct Inner<K, V> {
    pub(crate) store: ShardedStore<V>,
    pub(crate) policy: Arc<LfuPolicy>,
    pub(crate) read_buf: RingBuffer<LfuPolicy>,
    /// Swapped out wholesale by `clear`, hence the lock.
    pub(crate) write_tx: RwLock<Sender<WriteOp<V>>>,
    pub(crate) hasher: Box<dyn KeyHasher<K>>,
    /// Conflict-hash chain length; `< 2` disables collision checking.
    pub(crate) hashes: u8,
    pub(crate) coster: Option<Box<dyn Coster<V>>>,
    pub(crate) listener: Option<Box<dyn EvictionListener<V>>>,
    pub(crate) metrics: Option<Arc<Metrics>>,
    /// The live pipeline consumer; `None` once closed.
    pub(crate) worker: Mutex<Option<Worker>>,
}

pub(crate) struct Worker {
    stop_tx: Sender<()>,
    handle: JoinHandle<()>,
}

impl<K, V> Inner<K, V> {
    #[inline]
    fn record(&self, t: MetricType, hash: u64, delta: u64) {
        if let Some(m) = &self.metrics {
            m.add(t, hash, delta);
        }
    }
}

// ---------------------------------------------------------------------------
// Cache handle
// ---------------------------------------------------------------------------

/// A concurrent, bounded cache with TinyLFU admission and sampled-LFU
/// eviction.
///
/// Keys are reduced to 64-bit hashes at the boundary and never stored;
/// values are shared out as `Arc<V>`.  Writes are admitted asynchronously
/// by a single background consumer, so a fresh `insert` only becomes
/// visible to `get` after the pipeline has processed it (replacements of
/// existing keys are visible immediately).  [`wait`](Cache::wait) blocks
/// until everything enqueued so far has been applied.
///
/// Handles are cheap to clone and share one cache.  The consumer thread
/// exits when [`close`](Cache::close) is called or the last handle is
/// dropped, but `close` is the supported shutdown path — don't lean on
/// drop order.
///
/// # Example
/// ```
/// use lungo::CacheBuilder;
///
/// let cache: lungo::Cache<String, String> = CacheBuilder::new(10_000, 1_000)
///     .build()
///     .unwrap();
/// cache.insert(&"hello".to_string(), "world".to_string(), 1);
/// cache.wait();
/// assert_eq!(
///     cache.get(&"hello".to_string()).as_deref(),
///     Some(&"world".to_string())
/// );
/// ```
pub struct Cache<K, V> {
    inner: Arc<Inner<K, V>>,
}

impl<K, V> Clone for Cache<K, V> {
    fn clone(&self) -> Self {
        Cache {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<K, V> Cache<K, V>
where
    K: Hash + 'static,
    V: Send + Sync + 'static,
{
    pub(crate) fn new(builder: CacheBuilder<K, V>) -> Self {
        let metrics = builder.metrics.then(|| Arc::new(Metrics::new()));
        let policy = Arc::new(LfuPolicy::new(
            builder.num_counters,
            builder.max_cost,
            metrics.clone(),
        ));
        let (tx, rx) = write_channel();
        let inner = Arc::new(Inner {
            store: ShardedStore::new(),
            read_buf: RingBuffer::new(Arc::clone(&policy), builder.buffer_items, metrics.clone()),
            policy,
            write_tx: RwLock::new(tx),
            hasher: builder
                .hasher
                .unwrap_or_else(|| Box::new(crate::hasher::DefaultKeyHasher::new())),
            hashes: builder.hashes,
            coster: builder.coster,
            listener: builder.listener,
            metrics,
            worker: Mutex::new(None),
        });
        *inner.worker.lock() = Some(spawn_worker(&inner, rx));
        Cache { inner }
    }

    // -----------------------------------------------------------------------
    // Hashing
    // -----------------------------------------------------------------------

    /// Returns `(key_hash, conflict)` for `key`.  The conflict identifier
    /// folds seeds `1..hashes` into one word; 0 means "not configured".
    fn key_to_hash(&self, key: &K) -> (u64, u64) {
        let key_hash = self.inner.hasher.hash_key(key, 0);
        if self.inner.hashes < 2 {
            return (key_hash, 0);
        }
        let mut conflict = self.inner.hasher.hash_key(key, 1);
        for seed in 2..self.inner.hashes {
            conflict = conflict.rotate_left(17) ^ self.inner.hasher.hash_key(key, seed);
        }
        if conflict == 0 {
            // 0 is the "unchecked" sentinel.
            conflict = 1;
        }
        (key_hash, conflict)
    }

    // -----------------------------------------------------------------------
    // Hot paths
    // -----------------------------------------------------------------------

    /// Returns the value for `key` if present.
    ///
    /// Never blocks on the policy: the lookup takes one shard read-lock
    /// and the access signal goes to a per-thread buffer.
    pub fn get(&self, key: &K) -> Option<Arc<V>> {
        let (key_hash, conflict) = self.key_to_hash(key);
        let value = self.inner.store.get(key_hash, conflict);
        self.inner.read_buf.push(key_hash);
        let t = if value.is_some() {
            MetricType::Hit
        } else {
            MetricType::Miss
        };
        self.inner.record(t, key_hash, 1);
        value
    }

    /// Attempts to add `key → value` at `cost`.
    ///
    /// Returns `false` when the write channel was full and the item was
    /// dropped (counted as `sets-dropped`).  `true` means the item was
    /// buffered; the policy may still reject it asynchronously.
    ///
    /// A `cost` of 0 defers to the configured coster, evaluated by the
    /// pipeline.  If the key already exists the stored value is replaced
    /// immediately and only the cost accounting is deferred.
    pub fn insert(&self, key: &K, value: V, cost: i64) -> bool {
        let (key_hash, conflict) = self.key_to_hash(key);
        let value = Arc::new(value);

        // Optimistic in-place update: a replacement becomes visible to
        // readers before the pipeline gets to the cost accounting.
        let op = if self.inner.store.update(key_hash, conflict, Arc::clone(&value)) {
            WriteOp::Update {
                key_hash,
                value,
                cost,
            }
        } else {
            WriteOp::Add {
                key_hash,
                conflict,
                value,
                cost,
            }
        };

        match self.inner.write_tx.read().try_send(op) {
            Ok(()) => true,
            Err(_) => {
                self.inner.record(MetricType::SetsDropped, key_hash, 1);
                false
            }
        }
    }

    /// Removes the entry for `key`, if present.
    ///
    /// The removal is applied by the pipeline; unlike `insert`, deletes
    /// are never dropped — the send waits for channel room.
    pub fn remove(&self, key: &K) {
        let (key_hash, conflict) = self.key_to_hash(key);
        let _ = self
            .inner
            .write_tx
            .read()
            .send(WriteOp::Remove { key_hash, conflict });
    }

    // -----------------------------------------------------------------------
    // Lifecycle
    // -----------------------------------------------------------------------

    /// Blocks until every write enqueued before this call has been
    /// applied by the pipeline.
    pub fn wait(&self) {
        let worker = self.inner.worker.lock();
        if worker.is_none() {
            return;
        }
        let (ack_tx, ack_rx) = bounded(0);
        if self
            .inner
            .write_tx
            .read()
            .send(WriteOp::Drain(ack_tx))
            .is_ok()
        {
            let _ = ack_rx.recv();
        }
    }

    /// Stops the pipeline consumer and joins it.  Idempotent.
    ///
    /// Items still queued in the write channel are dropped.  Reads keep
    /// working against the frozen store; further writes are dropped.
    pub fn close(&self) {
        let Some(worker) = self.inner.worker.lock().take() else {
            return;
        };
        // Rendezvous send: returns once the consumer took the signal.
        let _ = worker.stop_tx.send(());
        let _ = worker.handle.join();
    }

    /// Empties the cache: store, policy state, and metrics.
    ///
    /// The pipeline is stopped, the write channel replaced (pending items
    /// are dropped), and a fresh consumer started.  Callers must quiesce
    /// producers around `clear`; concurrent access during it is undefined.
    pub fn clear(&self) {
        let mut worker = self.inner.worker.lock();
        if let Some(w) = worker.take() {
            let _ = w.stop_tx.send(());
            let _ = w.handle.join();
        }
        let (tx, rx) = write_channel();
        *self.inner.write_tx.write() = tx;
        self.inner.policy.clear();
        self.inner.store.clear();
        if let Some(m) = &self.inner.metrics {
            m.clear();
        }
        debug!("cache cleared");
        *worker = Some(spawn_worker(&self.inner, rx));
    }

    // -----------------------------------------------------------------------
    // Introspection
    // -----------------------------------------------------------------------

    /// Statistics, if the cache was built with `metrics(true)`.
    pub fn metrics(&self) -> Option<&Metrics> {
        self.inner.metrics.as_deref()
    }

    /// Number of entries currently in the store.
    pub fn entry_count(&self) -> usize {
        self.inner.store.len()
    }
}

// ---------------------------------------------------------------------------
// Write pipeline
// ---------------------------------------------------------------------------

fn spawn_worker<K, V>(inner: &Arc<Inner<K, V>>, rx: Receiver<WriteOp<V>>) -> Worker
where
    K: 'static,
    V: Send + Sync + 'static,
{
    let (stop_tx, stop_rx) = bounded(0);
    let weak = Arc::downgrade(inner);
    let handle = std::thread::Builder::new()
        .name("lungo-pipeline".to_string())
        .spawn(move || process_items(&weak, &rx, &stop_rx))
        .expect("failed to spawn pipeline thread");
    Worker { stop_tx, handle }
}

/// The single consumer: drains the write channel until stopped.
///
/// Every policy mutation, store admission write, and victim removal
/// happens here, on one thread, so the policy's cost map and the store
/// can never diverge.
fn process_items<K, V>(inner: &Weak<Inner<K, V>>, rx: &Receiver<WriteOp<V>>, stop_rx: &Receiver<()>)
where
    K: 'static,
    V: Send + Sync + 'static,
{
    debug!("write pipeline started");
    loop {
        select! {
            recv(rx) -> op => {
                let Ok(op) = op else { return };
                // Holding only a weak reference lets the cache drop (and
                // this thread exit) without an explicit close.
                let Some(inner) = inner.upgrade() else { return };
                apply(&inner, op);
            }
            recv(stop_rx) -> _ => {
                debug!("write pipeline stopped");
                return;
            }
        }
    }
}

fn apply<K, V>(inner: &Inner<K, V>, op: WriteOp<V>)
where
    V: Send + Sync + 'static,
{
    match op {
        WriteOp::Add {
            key_hash,
            conflict,
            value,
            cost,
        } => {
            let cost = resolve_cost(inner, &value, cost);
            let (victims, added) = inner.policy.add(key_hash, cost);
            if added {
                inner.store.set(key_hash, conflict, value);
            }
            for victim in victims {
                // The victim's original key is unknown here, so both the
                // fetch and the delete go through the force path.
                if let Some(listener) = &inner.listener {
                    let value = inner.store.get(victim.key_hash, 0);
                    listener.on_evict(victim.key_hash, value, victim.cost);
                }
                inner.store.remove(victim.key_hash, 0);
                trace!(key_hash = victim.key_hash, cost = victim.cost, "evicted");
            }
        }
        WriteOp::Update {
            key_hash,
            value,
            cost,
        } => {
            let cost = resolve_cost(inner, &value, cost);
            inner.policy.update(key_hash, cost);
        }
        WriteOp::Remove { key_hash, conflict } => {
            inner.policy.del(key_hash);
            inner.store.remove(key_hash, conflict);
        }
        WriteOp::Drain(ack) => {
            let _ = ack.send(());
        }
    }
}

#[inline]
fn resolve_cost<K, V: 'static>(inner: &Inner<K, V>, value: &V, cost: i64) -> i64 {
    match (&inner.coster, cost) {
        (Some(coster), 0) => coster.cost(value),
        _ => cost,
    }
}
