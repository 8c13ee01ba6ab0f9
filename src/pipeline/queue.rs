//! Work queue between the source enumerator and the workers
//!
//! One producer publishes [`WorkItem`]s; any number of workers take them
//! with a timeout. The queue is unbounded unless a capacity is given.
//!
//! The queue keeps its own sender alive, so an empty queue reports
//! `Empty` after the timeout rather than `Closed` while it exists. Workers
//! rely on the timeout to decide when to stop.
//!
//! For the same reason a full bounded queue never reports `Closed` to the
//! producer. Live workers are counted separately with a [`WorkGuard`] so
//! the producer can tell a slow queue from an abandoned one.

use crate::store::Record;
use crossbeam_channel::{bounded, unbounded, Receiver, RecvTimeoutError, SendTimeoutError, Sender};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// One entity to copy, tagged with where it came from
#[derive(Debug, Clone, PartialEq)]
pub struct WorkItem {
    pub source_org: String,
    pub source_app: String,
    pub source_collection: String,
    pub record: Record,
}

impl WorkItem {
    pub fn new(
        source_org: impl Into<String>,
        source_app: impl Into<String>,
        source_collection: impl Into<String>,
        record: Record,
    ) -> Self {
        Self {
            source_org: source_org.into(),
            source_app: source_app.into(),
            source_collection: source_collection.into(),
            record,
        }
    }
}

/// Statistics for the work queue
#[derive(Debug, Default)]
pub struct QueueStats {
    /// Total items enqueued
    pub enqueued: AtomicU64,

    /// Total items handed to a worker
    pub dequeued: AtomicU64,

    /// Total `take` calls, including ones that timed out
    pub polls: AtomicU64,
}

impl QueueStats {
    pub fn enqueued(&self) -> u64 {
        self.enqueued.load(Ordering::Relaxed)
    }

    pub fn dequeued(&self) -> u64 {
        self.dequeued.load(Ordering::Relaxed)
    }

    pub fn polls(&self) -> u64 {
        self.polls.load(Ordering::Relaxed)
    }
}

/// Result of waiting on the queue
#[derive(Debug)]
pub enum Take {
    /// An item was available
    Item(WorkItem),

    /// Nothing arrived before the timeout
    Empty,

    /// Every sender is gone; nothing will ever arrive
    Closed,
}

/// Result of a bounded put that could not complete in time
#[derive(Debug)]
pub enum PutError {
    /// Queue stayed full for the whole timeout; the item is returned
    Full(WorkItem),

    /// No receiver is left
    Closed(WorkItem),
}

/// Work queue for entities awaiting a write
pub struct WorkQueue {
    sender: Sender<WorkItem>,
    receiver: Receiver<WorkItem>,

    /// Workers currently holding a [`WorkGuard`]
    active_workers: Arc<AtomicUsize>,

    stats: Arc<QueueStats>,
}

impl WorkQueue {
    /// Create a queue, bounded when `capacity` is given
    pub fn new(capacity: Option<usize>) -> Self {
        let (sender, receiver) = match capacity {
            Some(cap) => bounded(cap),
            None => unbounded(),
        };

        Self {
            sender,
            receiver,
            active_workers: Arc::new(AtomicUsize::new(0)),
            stats: Arc::new(QueueStats::default()),
        }
    }

    pub fn unbounded() -> Self {
        Self::new(None)
    }

    /// Get a sender for this queue
    pub fn sender(&self) -> WorkQueueSender {
        WorkQueueSender {
            sender: self.sender.clone(),
            active_workers: Arc::clone(&self.active_workers),
            stats: Arc::clone(&self.stats),
        }
    }

    /// Get a receiver for this queue (clone for each worker)
    pub fn receiver(&self) -> WorkQueueReceiver {
        WorkQueueReceiver {
            receiver: self.receiver.clone(),
            active_workers: Arc::clone(&self.active_workers),
            stats: Arc::clone(&self.stats),
        }
    }

    /// Get queue statistics
    pub fn stats(&self) -> Arc<QueueStats> {
        Arc::clone(&self.stats)
    }

    pub fn is_empty(&self) -> bool {
        self.receiver.is_empty()
    }

    pub fn len(&self) -> usize {
        self.receiver.len()
    }

    /// Number of live workers
    pub fn active_workers(&self) -> usize {
        self.active_workers.load(Ordering::SeqCst)
    }
}

/// Handle for publishing items
#[derive(Clone)]
pub struct WorkQueueSender {
    sender: Sender<WorkItem>,
    active_workers: Arc<AtomicUsize>,
    stats: Arc<QueueStats>,
}

impl WorkQueueSender {
    /// Publish an item, blocking while a bounded queue is full
    ///
    /// Returns the item back if every receiver is gone.
    pub fn put(&self, item: WorkItem) -> Result<(), WorkItem> {
        self.sender.send(item).map_err(|e| e.into_inner())?;
        self.stats.enqueued.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    /// Publish an item, waiting at most `timeout` for room
    pub fn put_timeout(&self, item: WorkItem, timeout: Duration) -> Result<(), PutError> {
        match self.sender.send_timeout(item, timeout) {
            Ok(()) => {
                self.stats.enqueued.fetch_add(1, Ordering::Relaxed);
                Ok(())
            }
            Err(SendTimeoutError::Timeout(item)) => Err(PutError::Full(item)),
            Err(SendTimeoutError::Disconnected(item)) => Err(PutError::Closed(item)),
        }
    }

    /// Number of workers still able to take items
    pub fn active_workers(&self) -> usize {
        self.active_workers.load(Ordering::SeqCst)
    }

    /// Items published through any sender of this queue
    pub fn enqueued(&self) -> u64 {
        self.stats.enqueued()
    }
}

/// Handle for taking items
#[derive(Clone)]
pub struct WorkQueueReceiver {
    receiver: Receiver<WorkItem>,
    active_workers: Arc<AtomicUsize>,
    stats: Arc<QueueStats>,
}

impl WorkQueueReceiver {
    /// Wait up to `timeout` for an item
    pub fn take(&self, timeout: Duration) -> Take {
        self.stats.polls.fetch_add(1, Ordering::Relaxed);

        match self.receiver.recv_timeout(timeout) {
            Ok(item) => {
                self.stats.dequeued.fetch_add(1, Ordering::Relaxed);
                Take::Item(item)
            }
            Err(RecvTimeoutError::Timeout) => Take::Empty,
            Err(RecvTimeoutError::Disconnected) => Take::Closed,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.receiver.is_empty()
    }

    pub fn len(&self) -> usize {
        self.receiver.len()
    }
}

/// RAII guard counting one live worker
///
/// Owned by the worker thread, so the count drops even if the thread
/// panics or never starts.
#[derive(Debug)]
pub struct WorkGuard {
    active_workers: Arc<AtomicUsize>,
}

impl WorkGuard {
    pub fn new(receiver: &WorkQueueReceiver) -> Self {
        receiver.active_workers.fetch_add(1, Ordering::SeqCst);
        Self {
            active_workers: Arc::clone(&receiver.active_workers),
        }
    }
}

impl Drop for WorkGuard {
    fn drop(&mut self) {
        self.active_workers.fetch_sub(1, Ordering::SeqCst);
    }
}
