//! Tiered Store: three similarity collections behind two background queues.
//!
//! Commits go through a bounded store queue drained by a single worker, so
//! index writes for new records are serialized and callers never wait on
//! index latency. Access bookkeeping goes through a second queue whose
//! worker batches bumps by count or time, whichever comes first.
//!
//! Records waiting in the store queue stay visible through
//! [`PendingCommits`], so a newer utterance can cancel a queued one it
//! supersedes before it ever reaches an index.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::clock::Clock;
use crate::config::{MemoryConfig, StoreConfig};
use crate::decay;
use crate::error::{HumemError, Result};
use crate::index::Collection;
use crate::memory::MemoryRecord;
use crate::metrics::EngineCounters;
use crate::types::{EmotionType, MemoryId, Tier};

/// Emotion intensity at which an utterance lands in the emotional tier.
const EMOTIONAL_INTENSITY: u8 = 2;
/// Importance at which a non-emotional utterance lands in the long-term tier.
const LONG_TERM_IMPORTANCE: f32 = 0.35;

/// Route a record to its tier.
///
/// Emotional when intensity ≥ 2 or the speaker flagged it important,
/// otherwise long-term when importance ≥ 0.35, otherwise working.
#[must_use]
pub fn classify_tier(importance: f32, intensity: u8, kind: EmotionType) -> Tier {
    if intensity >= EMOTIONAL_INTENSITY || kind == EmotionType::Important {
        Tier::Emotional
    } else if importance >= LONG_TERM_IMPORTANCE {
        Tier::LongTerm
    } else {
        Tier::Working
    }
}

// ---------------------------------------------------------------------------
// Queue messages
// ---------------------------------------------------------------------------

enum StoreCommand {
    Commit(Box<MemoryRecord>),
    Flush(oneshot::Sender<()>),
}

enum UpdateCommand {
    Touch { id: MemoryId, tier: Tier },
    Flush(oneshot::Sender<()>),
}

/// Point-in-time view of the store.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StoreStats {
    /// Record count per tier, in query order.
    pub per_tier: Vec<(Tier, usize)>,
    /// Records accepted but not yet committed.
    pub pending_stores: usize,
    /// Access bumps queued but not yet applied.
    pub pending_updates: usize,
}

impl StoreStats {
    /// Total records across tiers.
    #[must_use]
    pub fn total(&self) -> usize {
        self.per_tier.iter().map(|(_, n)| n).sum()
    }

    /// Record count of one tier.
    #[must_use]
    pub fn count(&self, tier: Tier) -> usize {
        self.per_tier
            .iter()
            .find(|(t, _)| *t == tier)
            .map_or(0, |(_, n)| *n)
    }
}

// ---------------------------------------------------------------------------
// PendingCommits
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
struct PendingInner {
    next_ticket: u64,
    by_text: HashMap<String, (u64, MemoryRecord)>,
    cancelled: HashSet<MemoryId>,
}

/// Records accepted by [`TieredStore`] but not yet settled in an index.
///
/// Each reservation gets a ticket in arrival order. A record stays here
/// from reservation until the store worker has written it (or skipped it
/// because it was cancelled), so cancellation can never miss a commit.
#[derive(Debug, Default)]
pub struct PendingCommits {
    inner: Mutex<PendingInner>,
}

impl PendingCommits {
    /// Claim `record`'s text. Returns the ticket, or `None` if an identical
    /// text is already pending.
    pub fn reserve(&self, record: &MemoryRecord) -> Option<u64> {
        let mut inner = self.inner.lock();
        if inner.by_text.contains_key(&record.text) {
            return None;
        }
        let ticket = inner.next_ticket;
        inner.next_ticket += 1;
        inner
            .by_text
            .insert(record.text.clone(), (ticket, record.clone()));
        Some(ticket)
    }

    /// Drop a reservation without committing it.
    pub fn release(&self, text: &str) {
        let mut inner = self.inner.lock();
        if let Some((_, record)) = inner.by_text.remove(text) {
            inner.cancelled.remove(&record.id);
        }
    }

    /// Records reserved before `ticket` and not cancelled, oldest first.
    #[must_use]
    pub fn queued_before(&self, ticket: u64) -> Vec<MemoryRecord> {
        let inner = self.inner.lock();
        let mut queued: Vec<(u64, MemoryRecord)> = inner
            .by_text
            .values()
            .filter(|(t, r)| *t < ticket && !inner.cancelled.contains(&r.id))
            .cloned()
            .collect();
        queued.sort_by_key(|(t, _)| *t);
        queued.into_iter().map(|(_, r)| r).collect()
    }

    /// Mark a pending record so it is never left in an index.
    ///
    /// Returns `false` when the record is no longer pending; it has then
    /// already been written and must be deleted from its index instead.
    pub fn cancel(&self, id: MemoryId) -> bool {
        let mut inner = self.inner.lock();
        if inner.by_text.values().any(|(_, r)| r.id == id) {
            inner.cancelled.insert(id);
            true
        } else {
            false
        }
    }

    /// Number of pending records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.lock().by_text.len()
    }

    /// Whether nothing is pending.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Before a write: settle and report `true` if the record was cancelled.
    fn withdraw_if_cancelled(&self, id: MemoryId, text: &str) -> bool {
        let mut inner = self.inner.lock();
        if inner.cancelled.remove(&id) {
            inner.by_text.remove(text);
            true
        } else {
            false
        }
    }

    /// After a write: settle and report `true` if it was cancelled meanwhile.
    fn settle(&self, id: MemoryId, text: &str) -> bool {
        let mut inner = self.inner.lock();
        inner.by_text.remove(text);
        inner.cancelled.remove(&id)
    }
}

// ---------------------------------------------------------------------------
// TieredStore
// ---------------------------------------------------------------------------

/// The three persistent tiers plus their background workers.
pub struct TieredStore {
    collections: Arc<[Collection]>,
    store_tx: Mutex<Option<mpsc::Sender<StoreCommand>>>,
    update_tx: Mutex<Option<mpsc::Sender<UpdateCommand>>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    pending: Arc<PendingCommits>,
    counters: Arc<EngineCounters>,
    clock: Arc<dyn Clock>,
    memory: MemoryConfig,
}

impl fmt::Debug for TieredStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TieredStore")
            .field("collections", &self.collections)
            .field("pending", &self.pending.len())
            .finish_non_exhaustive()
    }
}

impl TieredStore {
    /// Start the store and its two workers on the current tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns [`HumemError::NoRuntime`] when called outside a runtime.
    pub fn start(
        collections: Vec<Collection>,
        store: &StoreConfig,
        memory: MemoryConfig,
        clock: Arc<dyn Clock>,
        counters: Arc<EngineCounters>,
    ) -> Result<Self> {
        let handle = tokio::runtime::Handle::try_current().map_err(|_| HumemError::NoRuntime)?;
        let collections: Arc<[Collection]> = collections.into();
        let pending = Arc::new(PendingCommits::default());

        let (store_tx, store_rx) = mpsc::channel(store.store_queue_capacity.max(1));
        let (update_tx, update_rx) = mpsc::channel(store.update_queue_capacity.max(1));

        let store_worker = handle.spawn(run_store_worker(
            store_rx,
            Arc::clone(&collections),
            Arc::clone(&pending),
            Arc::clone(&counters),
        ));
        let update_worker = handle.spawn(run_update_worker(
            update_rx,
            Arc::clone(&collections),
            Arc::clone(&clock),
            Arc::clone(&counters),
            store.update_batch_size.max(1),
            Duration::from_millis(store.update_flush_interval_ms.max(1)),
        ));

        info!(
            tiers = collections.len(),
            store_queue = store.store_queue_capacity,
            update_batch = store.update_batch_size,
            "tiered store started"
        );

        Ok(Self {
            collections,
            store_tx: Mutex::new(Some(store_tx)),
            update_tx: Mutex::new(Some(update_tx)),
            workers: Mutex::new(vec![store_worker, update_worker]),
            pending,
            counters,
            clock,
            memory,
        })
    }

    /// Ordered `(tier, index)` pairs: emotional, long-term, working.
    #[must_use]
    pub fn get_collections(&self) -> &[Collection] {
        &self.collections
    }

    /// Shared handle to the collections, for components that outlive a borrow.
    #[must_use]
    pub fn shared_collections(&self) -> Arc<[Collection]> {
        Arc::clone(&self.collections)
    }

    /// The collection for one tier.
    #[must_use]
    pub fn collection(&self, tier: Tier) -> Option<&Collection> {
        self.collections.iter().find(|c| c.tier == tier)
    }

    /// Shared handle to the records waiting in the store queue.
    #[must_use]
    pub fn pending(&self) -> Arc<PendingCommits> {
        Arc::clone(&self.pending)
    }

    /// Claim `record` as pending. Returns its ticket, or `None` if an
    /// identical text is already waiting to be committed.
    pub fn reserve(&self, record: &MemoryRecord) -> Option<u64> {
        self.pending.reserve(record)
    }

    /// Drop a claim made with [`TieredStore::reserve`] without committing.
    pub fn release(&self, text: &str) {
        self.pending.release(text);
    }

    /// Enqueue a record for commit. Returns once queued, not once written.
    ///
    /// The record's text should have been claimed with
    /// [`TieredStore::reserve`]; the worker releases it after the write.
    ///
    /// # Errors
    ///
    /// Returns [`HumemError::Worker`] if the store has been shut down.
    pub async fn store(&self, record: MemoryRecord) -> Result<()> {
        let Some(tx) = self.store_tx.lock().clone() else {
            self.release(&record.text);
            return Err(HumemError::Worker("store queue closed".into()));
        };
        let text = record.text.clone();
        if tx.send(StoreCommand::Commit(Box::new(record))).await.is_err() {
            self.release(&text);
            return Err(HumemError::Worker("store worker stopped".into()));
        }
        Ok(())
    }

    /// Schedule an access bump. Never blocks; the bump is dropped if the
    /// update queue is full or closed.
    pub fn update_access(&self, id: MemoryId, tier: Tier) {
        let Some(tx) = self.update_tx.lock().clone() else {
            return;
        };
        if let Err(e) = tx.try_send(UpdateCommand::Touch { id, tier }) {
            EngineCounters::inc(&self.counters.access_updates_dropped);
            debug!(%id, %tier, error = %e, "access bump dropped");
        }
    }

    /// Wait until everything queued before this call has been processed by
    /// both workers.
    pub async fn flush(&self) {
        let store_tx = self.store_tx.lock().clone();
        if let Some(tx) = store_tx {
            let (ack, done) = oneshot::channel();
            if tx.send(StoreCommand::Flush(ack)).await.is_ok() {
                let _ = done.await;
            }
        }
        let update_tx = self.update_tx.lock().clone();
        if let Some(tx) = update_tx {
            let (ack, done) = oneshot::channel();
            if tx.send(UpdateCommand::Flush(ack)).await.is_ok() {
                let _ = done.await;
            }
        }
    }

    /// Evict faded records from the working and long-term tiers.
    ///
    /// A record goes only when its strength is below the floor **and** its
    /// importance is below the guard. Blocking; returns the number evicted.
    pub fn cleanup(&self) -> usize {
        let now = self.clock.now();
        let mut evicted = 0;
        for collection in self.collections.iter().filter(|c| c.tier.is_evictable()) {
            let rows = match collection.index.get_all() {
                Ok(rows) => rows,
                Err(e) => {
                    error!(tier = %collection.tier, error = %e, "cleanup scan failed");
                    continue;
                }
            };
            let doomed: Vec<MemoryId> = rows
                .iter()
                .filter(|hit| {
                    decay::should_evict(
                        &hit.metadata,
                        now,
                        self.memory.forgetting_rate,
                        self.memory.eviction_strength_floor,
                        self.memory.eviction_importance_guard,
                    )
                })
                .map(|hit| hit.id)
                .collect();
            if doomed.is_empty() {
                continue;
            }
            match collection.index.delete(&doomed) {
                Ok(n) => {
                    evicted += n;
                    info!(tier = %collection.tier, evicted = n, "faded memories evicted");
                }
                Err(e) => error!(tier = %collection.tier, error = %e, "eviction failed"),
            }
        }
        EngineCounters::add(&self.counters.records_evicted, evicted as u64);
        evicted
    }

    /// Per-tier counts and queue depths. Blocking.
    pub fn stats(&self) -> StoreStats {
        let per_tier = self
            .collections
            .iter()
            .map(|c| {
                let n = c.index.count().unwrap_or_else(|e| {
                    warn!(tier = %c.tier, error = %e, "count failed");
                    0
                });
                (c.tier, n)
            })
            .collect();
        let pending_updates = self
            .update_tx
            .lock()
            .as_ref()
            .map_or(0, |tx| tx.max_capacity() - tx.capacity());
        StoreStats {
            per_tier,
            pending_stores: self.pending.len(),
            pending_updates,
        }
    }

    /// Close both queues and wait for the workers to drain them.
    ///
    /// Every record enqueued before this call is committed. Idempotent.
    pub async fn shutdown(&self) {
        self.store_tx.lock().take();
        self.update_tx.lock().take();
        let workers: Vec<JoinHandle<()>> = std::mem::take(&mut *self.workers.lock());
        for worker in workers {
            if let Err(e) = worker.await {
                error!(error = %e, "store worker panicked during shutdown");
            }
        }
        info!("tiered store shut down");
    }
}

// ---------------------------------------------------------------------------
// Workers
// ---------------------------------------------------------------------------

fn collection_for(collections: &[Collection], tier: Tier) -> Result<&Collection> {
    collections
        .iter()
        .find(|c| c.tier == tier)
        .ok_or_else(|| HumemError::Index {
            tier,
            message: "no collection for tier".into(),
        })
}

/// Write `record`, then undo the write if it was cancelled while in flight.
/// Returns whether the record is live afterwards.
fn commit(
    collections: &[Collection],
    pending: &PendingCommits,
    record: &MemoryRecord,
) -> Result<bool> {
    let collection = collection_for(collections, record.tier())?;
    let written = collection.index.add(record.id, &record.text, &record.meta);
    let cancelled = pending.settle(record.id, &record.text);
    written?;
    if cancelled {
        collection.index.delete(&[record.id])?;
        return Ok(false);
    }
    Ok(true)
}

async fn run_store_worker(
    mut rx: mpsc::Receiver<StoreCommand>,
    collections: Arc<[Collection]>,
    pending: Arc<PendingCommits>,
    counters: Arc<EngineCounters>,
) {
    while let Some(command) = rx.recv().await {
        match command {
            StoreCommand::Commit(record) => {
                let (id, tier, text) = (record.id, record.tier(), record.text.clone());
                if pending.withdraw_if_cancelled(id, &text) {
                    info!(%id, %tier, text = %text, "superseded while queued, not committed");
                    continue;
                }
                let collections = Arc::clone(&collections);
                let settle = Arc::clone(&pending);
                let result =
                    tokio::task::spawn_blocking(move || commit(&collections, &settle, &record))
                        .await;
                match result {
                    Ok(Ok(true)) => {
                        EngineCounters::inc(&counters.records_committed);
                        info!(%id, %tier, text = %text, "memory committed");
                    }
                    Ok(Ok(false)) => {
                        info!(%id, %tier, text = %text, "superseded while committing, removed");
                    }
                    Ok(Err(e)) => {
                        EngineCounters::inc(&counters.write_failures);
                        error!(%id, %tier, error = %e, "memory commit failed, dropped");
                    }
                    Err(e) => {
                        pending.release(&text);
                        EngineCounters::inc(&counters.write_failures);
                        error!(%id, %tier, error = %e, "memory commit task failed, dropped");
                    }
                }
            }
            StoreCommand::Flush(ack) => {
                let _ = ack.send(());
            }
        }
    }
    debug!("store worker drained");
}

async fn run_update_worker(
    mut rx: mpsc::Receiver<UpdateCommand>,
    collections: Arc<[Collection]>,
    clock: Arc<dyn Clock>,
    counters: Arc<EngineCounters>,
    batch_size: usize,
    interval: Duration,
) {
    let mut batch: HashMap<(MemoryId, Tier), u32> = HashMap::new();
    let mut queued = 0usize;
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            command = rx.recv() => match command {
                Some(UpdateCommand::Touch { id, tier }) => {
                    *batch.entry((id, tier)).or_insert(0) += 1;
                    queued += 1;
                    if queued >= batch_size {
                        flush_access(&collections, &clock, &counters, &mut batch).await;
                        queued = 0;
                    }
                }
                Some(UpdateCommand::Flush(ack)) => {
                    flush_access(&collections, &clock, &counters, &mut batch).await;
                    queued = 0;
                    let _ = ack.send(());
                }
                None => {
                    flush_access(&collections, &clock, &counters, &mut batch).await;
                    break;
                }
            },
            _ = ticker.tick() => {
                if !batch.is_empty() {
                    flush_access(&collections, &clock, &counters, &mut batch).await;
                    queued = 0;
                }
            }
        }
    }
    debug!("update worker drained");
}

async fn flush_access(
    collections: &Arc<[Collection]>,
    clock: &Arc<dyn Clock>,
    counters: &Arc<EngineCounters>,
    batch: &mut HashMap<(MemoryId, Tier), u32>,
) {
    if batch.is_empty() {
        return;
    }
    let work: Vec<((MemoryId, Tier), u32)> = batch.drain().collect();
    let collections = Arc::clone(collections);
    let now = clock.now();
    let result = tokio::task::spawn_blocking(move || {
        let mut applied = 0u64;
        for ((id, tier), times) in work {
            let Some(collection) = collections.iter().find(|c| c.tier == tier) else {
                continue;
            };
            let outcome = collection.index.get(id).and_then(|hit| match hit {
                Some(hit) => {
                    let mut meta = hit.metadata;
                    meta.touch(now, times);
                    collection.index.update_metadata(id, &meta).map(|()| true)
                }
                None => Ok(false),
            });
            match outcome {
                Ok(true) => applied += u64::from(times),
                Ok(false) => debug!(%id, %tier, "access bump for a deleted record"),
                Err(e) => warn!(%id, %tier, error = %e, "access bump failed, dropped"),
            }
        }
        applied
    })
    .await;
    match result {
        Ok(applied) => EngineCounters::add(&counters.access_updates, applied),
        Err(e) => error!(error = %e, "access flush task failed"),
    }
}
