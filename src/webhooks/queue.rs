//! Deduplicating delivery queue.
//!
//! Each task identifier moves through `absent → queued → in-flight → absent`.
//! The transition table lives here and nowhere else:
//!
//! | From | Operation | To | Result |
//! |------|-----------|----|--------|
//! | absent | [`DedupQueue::push`] | queued | [`PushOutcome::Queued`] |
//! | queued / in-flight | [`DedupQueue::push`] | unchanged | [`PushOutcome::AlreadyQueued`] |
//! | queued | [`DedupQueue::pop`] | in-flight | lease |
//! | absent | [`DedupQueue::try_claim`] | in-flight | lease |
//! | in-flight | [`QueueLease::complete`] | absent | removed from the durable store |
//! | in-flight | lease dropped | absent | durable entry kept for the next start |
//!
//! Identifiers are written to a [`QueueStore`] before they enter the bounded
//! in-memory buffer, so anything not completed survives a restart. A push
//! cancelled while waiting for buffer space hands its identifier to a
//! background feeder; the entry stays queued.

use crate::models::TaskId;
use crate::storage::{QueueStore, acquire_lock};
use crate::{Error, Result};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::{Notify, mpsc, watch};

/// Result of a push.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushOutcome {
    /// The identifier entered the queue.
    Queued,
    /// The identifier was already queued or in flight; nothing changed.
    AlreadyQueued,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EntryState {
    Queued,
    InFlight,
}

/// Entry states, shared with background feeders.
#[derive(Default)]
struct Entries {
    states: Mutex<HashMap<TaskId, EntryState>>,
    changed: Notify,
}

impl Entries {
    fn release(&self, id: TaskId) {
        acquire_lock(&self.states).remove(&id);
        self.changed.notify_waiters();
    }
}

/// Bounded, durable queue of task identifiers with per-identifier dedup.
pub struct DedupQueue {
    sender: mpsc::Sender<TaskId>,
    receiver: tokio::sync::Mutex<mpsc::Receiver<TaskId>>,
    entries: Arc<Entries>,
    store: Arc<dyn QueueStore>,
    closed: watch::Sender<bool>,
}

impl std::fmt::Debug for DedupQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DedupQueue")
            .field("len", &self.len())
            .field("closed", &self.is_closed())
            .finish_non_exhaustive()
    }
}

impl DedupQueue {
    /// Creates a queue whose in-memory buffer holds `capacity` identifiers.
    #[must_use]
    pub fn new(capacity: usize, store: Arc<dyn QueueStore>) -> Self {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        let (closed, _) = watch::channel(false);
        Self {
            sender,
            receiver: tokio::sync::Mutex::new(receiver),
            entries: Arc::default(),
            store,
            closed,
        }
    }

    /// Enqueues `id` unless it is already queued or in flight.
    ///
    /// Waits for buffer space when the buffer is full.
    ///
    /// # Errors
    ///
    /// Returns [`Error::QueueClosed`] after [`close`](Self::close), or a
    /// storage error if the durable write fails. A failed push leaves no
    /// in-memory entry behind. Once the durable write succeeded, cancelling
    /// the push does not drop the identifier: it is fed to the buffer in the
    /// background.
    pub async fn push(&self, id: TaskId) -> Result<PushOutcome> {
        if self.is_closed() {
            return Err(Error::QueueClosed);
        }
        let Some(reservation) = self.reserve(id) else {
            metrics::counter!("webhook_queue_duplicates_total").increment(1);
            tracing::debug!(task_id = %id, "Task already queued");
            return Ok(PushOutcome::AlreadyQueued);
        };

        self.store.persist(id)?;
        let id = reservation.keep();

        let mut handoff = Handoff {
            queue: self,
            id,
            armed: true,
        };
        let sent = self.send(id).await;
        handoff.armed = false;
        if let Err(e) = sent {
            self.release(id);
            return Err(e);
        }
        metrics::counter!("webhook_queue_pushed_total").increment(1);
        Ok(PushOutcome::Queued)
    }

    /// Re-enqueues identifiers found after a restart.
    ///
    /// Identifiers are reserved and persisted immediately; feeding them into
    /// the buffer happens in the background so a backlog larger than the
    /// buffer cannot stall the caller before workers start.
    ///
    /// # Errors
    ///
    /// Returns [`Error::QueueClosed`] after close, or a storage error.
    ///
    /// # Panics
    ///
    /// Panics if identifiers need feeding outside a Tokio runtime.
    pub fn restore(self: &Arc<Self>, ids: impl IntoIterator<Item = TaskId>) -> Result<usize> {
        if self.is_closed() {
            return Err(Error::QueueClosed);
        }

        let mut reservations = Vec::new();
        for id in ids {
            if let Some(reservation) = self.reserve(id) {
                self.store.persist(id)?;
                reservations.push(reservation);
            }
        }
        let fresh: Vec<TaskId> = reservations
            .into_iter()
            .map(Reservation::keep)
            .collect();

        let restored = fresh.len();
        if restored > 0 {
            let queue = Arc::clone(self);
            tokio::spawn(async move {
                let mut pending = fresh.into_iter();
                for id in pending.by_ref() {
                    if queue.send(id).await.is_err() {
                        queue.release(id);
                        break;
                    }
                }
                pending.for_each(|id| queue.release(id));
            });
        }
        Ok(restored)
    }

    /// Waits for the next identifier and marks it in flight.
    ///
    /// Returns `None` once the queue is closed.
    pub async fn pop(&self) -> Option<QueueLease<'_>> {
        let mut receiver = tokio::select! {
            biased;
            () = closed_signal(self.closed.subscribe()) => return None,
            guard = self.receiver.lock() => guard,
        };

        loop {
            let id = tokio::select! {
                biased;
                () = closed_signal(self.closed.subscribe()) => return None,
                id = receiver.recv() => id?,
            };

            if self.start_flight(id) {
                return Some(QueueLease::new(self, id));
            }
        }
    }

    /// Moves a buffered identifier from queued to in flight.
    fn start_flight(&self, id: TaskId) -> bool {
        let mut entries = acquire_lock(&self.entries.states);
        match entries.get_mut(&id) {
            Some(state @ EntryState::Queued) => {
                *state = EntryState::InFlight;
                true
            },
            // Released while buffered (push rolled back)
            None => false,
            Some(EntryState::InFlight) => {
                tracing::debug!(task_id = %id, "Skipping stale buffered task");
                false
            },
        }
    }

    /// Marks an absent identifier in flight without queueing it.
    ///
    /// Returns `None` if the identifier is already queued or in flight.
    #[must_use]
    pub fn try_claim(&self, id: TaskId) -> Option<QueueLease<'_>> {
        let mut entries = acquire_lock(&self.entries.states);
        if entries.contains_key(&id) {
            return None;
        }
        entries.insert(id, EntryState::InFlight);
        Some(QueueLease::new(self, id))
    }

    /// Stops accepting pushes and wakes idle workers.
    ///
    /// Buffered identifiers stay in the durable store.
    pub fn close(&self) {
        self.closed.send_replace(true);
        self.entries.changed.notify_waiters();
    }

    /// Accepts pushes again after [`close`](Self::close).
    ///
    /// Identifiers still buffered from before the close are popped again.
    pub fn reopen(&self) {
        self.closed.send_replace(false);
    }

    /// Whether [`close`](Self::close) has been called.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        *self.closed.borrow()
    }

    /// Number of identifiers queued or in flight.
    #[must_use]
    pub fn len(&self) -> usize {
        acquire_lock(&self.entries.states).len()
    }

    /// Returns `true` if nothing is queued or in flight.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether `id` is queued or in flight.
    #[must_use]
    pub fn contains(&self, id: TaskId) -> bool {
        acquire_lock(&self.entries.states).contains_key(&id)
    }

    /// Waits until nothing is queued or in flight.
    ///
    /// After [`close`](Self::close) buffered identifiers are never popped,
    /// so only in-flight deliveries are waited for.
    pub async fn wait_idle(&self) {
        loop {
            let notified = self.entries.changed.notified();
            if self.is_settled() {
                return;
            }
            notified.await;
        }
    }

    fn is_settled(&self) -> bool {
        let states = acquire_lock(&self.entries.states);
        states.is_empty()
            || (self.is_closed() && !states.values().any(|state| *state == EntryState::InFlight))
    }

    async fn send(&self, id: TaskId) -> Result<()> {
        let sent = tokio::select! {
            sent = self.sender.send(id) => sent.is_ok(),
            () = closed_signal(self.closed.subscribe()) => false,
        };
        if sent {
            Ok(())
        } else {
            Err(Error::QueueClosed)
        }
    }

    /// Marks `id` queued; `None` if it is already present.
    fn reserve(&self, id: TaskId) -> Option<Reservation<'_>> {
        let mut entries = acquire_lock(&self.entries.states);
        if entries.contains_key(&id) {
            return None;
        }
        entries.insert(id, EntryState::Queued);
        Some(Reservation {
            queue: self,
            id,
            kept: false,
        })
    }

    fn release(&self, id: TaskId) {
        self.entries.release(id);
    }

    /// Feeds a persisted identifier whose push was cancelled.
    fn hand_off(&self, id: TaskId) {
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            self.release(id);
            return;
        };
        tracing::debug!(task_id = %id, "Push cancelled, feeding task in background");
        let sender = self.sender.clone();
        let entries = Arc::clone(&self.entries);
        let closed = self.closed.subscribe();
        runtime.spawn(async move {
            let sent = tokio::select! {
                sent = sender.send(id) => sent.is_ok(),
                () = closed_signal(closed) => false,
            };
            if !sent {
                entries.release(id);
            }
        });
    }
}

async fn closed_signal(mut closed: watch::Receiver<bool>) {
    let _ = closed.wait_for(|closed| *closed).await;
}

/// Queued entry that is released again unless the push finishes.
struct Reservation<'a> {
    queue: &'a DedupQueue,
    id: TaskId,
    kept: bool,
}

impl Reservation<'_> {
    fn keep(mut self) -> TaskId {
        self.kept = true;
        self.id
    }
}

impl Drop for Reservation<'_> {
    fn drop(&mut self) {
        if !self.kept {
            self.queue.release(self.id);
        }
    }
}

/// Persisted identifier on its way into the buffer.
struct Handoff<'a> {
    queue: &'a DedupQueue,
    id: TaskId,
    armed: bool,
}

impl Drop for Handoff<'_> {
    fn drop(&mut self) {
        if self.armed {
            self.queue.hand_off(self.id);
        }
    }
}

/// Exclusive right to deliver one task.
///
/// [`complete`](Self::complete) removes the identifier durably; dropping the
/// lease without completing only frees it in memory.
#[derive(Debug)]
pub struct QueueLease<'a> {
    queue: &'a DedupQueue,
    id: TaskId,
    completed: bool,
}

impl<'a> QueueLease<'a> {
    const fn new(queue: &'a DedupQueue, id: TaskId) -> Self {
        Self {
            queue,
            id,
            completed: false,
        }
    }

    /// The leased task.
    #[must_use]
    pub const fn task_id(&self) -> TaskId {
        self.id
    }

    /// Finishes the lease and removes the identifier from the durable store.
    ///
    /// # Errors
    ///
    /// Returns a storage error if the durable entry cannot be removed; the
    /// in-memory entry is released regardless.
    pub fn complete(mut self) -> Result<()> {
        self.completed = true;
        let result = self.queue.store.remove(self.id);
        self.queue.release(self.id);
        result
    }
}

impl Drop for QueueLease<'_> {
    fn drop(&mut self) {
        if !self.completed {
            self.queue.release(self.id);
        }
    }
}
