//! Worker thread logic for parallel entity writes
//!
//! Each worker:
//! - Pulls one item at a time from the work queue, waiting up to
//!   `queue_timeout` per take
//! - Hands the item to the write handler and logs progress
//! - Counts consecutive empty takes and stops after `max_empty_count`
//! - Stops immediately when the shutdown flag is raised
//!
//! There is no end-of-stream message: running out of patience is the only
//! way a worker finishes on its own.

use super::handler::WriteHandler;
use super::queue::{Take, WorkGuard, WorkQueueReceiver};
use crate::error::{ItemOutcome, WorkerError};
use crate::store::StoreClient;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Lifecycle of a worker
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum WorkerState {
    /// Taking and processing items
    Running = 0,

    /// Last take timed out; the idle counter is above zero
    Idle = 1,

    /// Finished; no further takes will be issued
    Stopped = 2,
}

impl WorkerState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => WorkerState::Running,
            1 => WorkerState::Idle,
            _ => WorkerState::Stopped,
        }
    }
}

/// Timing knobs for a worker
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkerSettings {
    /// How long one take waits for an item
    pub queue_timeout: Duration,

    /// Consecutive empty takes that stop the worker
    pub max_empty_count: u32,
}

impl Default for WorkerSettings {
    fn default() -> Self {
        Self {
            queue_timeout: Duration::from_secs(10),
            max_empty_count: 10,
        }
    }
}

/// Statistics collected by a worker
#[derive(Debug, Default)]
pub struct WorkerStats {
    /// Items written successfully
    pub processed: AtomicU64,

    /// Items the target rejected
    pub failed: AtomicU64,

    /// Current run of empty takes
    pub consecutive_empty: AtomicU32,
}

impl WorkerStats {
    fn record_processed(&self) -> u64 {
        self.processed.fetch_add(1, Ordering::Relaxed) + 1
    }

    fn record_failed(&self) {
        self.failed.fetch_add(1, Ordering::Relaxed);
    }

    fn record_empty(&self) -> u32 {
        self.consecutive_empty.fetch_add(1, Ordering::Relaxed) + 1
    }

    fn reset_empty(&self) {
        self.consecutive_empty.store(0, Ordering::Relaxed);
    }

    pub fn processed(&self) -> u64 {
        self.processed.load(Ordering::Relaxed)
    }

    pub fn failed(&self) -> u64 {
        self.failed.load(Ordering::Relaxed)
    }

    pub fn consecutive_empty(&self) -> u32 {
        self.consecutive_empty.load(Ordering::Relaxed)
    }
}

/// Everything a worker thread needs, moved into the thread
pub struct WorkerContext {
    pub settings: WorkerSettings,
    pub queue: WorkQueueReceiver,
    pub source: Arc<dyn StoreClient>,
    pub target: Arc<dyn StoreClient>,
    pub handler: Arc<dyn WriteHandler>,
    pub shutdown: Arc<AtomicBool>,
}

/// A worker thread that writes entities to the target
pub struct Worker {
    id: usize,
    handle: Option<JoinHandle<()>>,
    stats: Arc<WorkerStats>,
    state: Arc<AtomicU8>,
}

impl Worker {
    /// Spawn a new worker thread
    pub fn spawn(id: usize, context: WorkerContext) -> Result<Self, WorkerError> {
        let stats = Arc::new(WorkerStats::default());
        let state = Arc::new(AtomicU8::new(WorkerState::Running as u8));

        let stats_clone = Arc::clone(&stats);
        let state_clone = Arc::clone(&state);

        warn!(worker = id, "Creating worker");

        // Counted before the thread starts so the producer never sees a gap
        let guard = WorkGuard::new(&context.queue);

        let handle = thread::Builder::new()
            .name(format!("worker-{}", id))
            .spawn(move || {
                let _guard = guard;
                worker_loop(id, &context, &stats_clone, &state_clone)
            })
            .map_err(|e| WorkerError::InitFailed {
                id,
                reason: e.to_string(),
            })?;

        Ok(Self {
            id,
            handle: Some(handle),
            stats,
            state,
        })
    }

    pub fn stats(&self) -> &WorkerStats {
        &self.stats
    }

    pub fn state(&self) -> WorkerState {
        WorkerState::from_u8(self.state.load(Ordering::SeqCst))
    }

    /// Whether the worker thread is still alive
    pub fn is_running(&self) -> bool {
        match &self.handle {
            Some(handle) => !handle.is_finished(),
            None => false,
        }
    }

    /// Wait for the worker to finish
    pub fn join(mut self) -> Result<(), WorkerError> {
        match self.handle.take() {
            Some(handle) => handle.join().map_err(|_| WorkerError::Panicked {
                id: self.id,
                message: "Worker thread panicked".into(),
            }),
            None => Ok(()),
        }
    }
}

/// Main worker loop
fn worker_loop(id: usize, ctx: &WorkerContext, stats: &WorkerStats, state: &AtomicU8) {
    info!(worker = id, "Worker starting");

    let timeout = ctx.settings.queue_timeout;
    let max_empty = ctx.settings.max_empty_count.max(1);

    loop {
        if ctx.shutdown.load(Ordering::SeqCst) {
            warn!(worker = id, "Interrupt received, worker stopping");
            break;
        }

        match ctx.queue.take(timeout) {
            Take::Item(item) => {
                // Hard stop: an item taken after the interrupt is abandoned
                if ctx.shutdown.load(Ordering::SeqCst) {
                    warn!(worker = id, "Interrupt received, dropping in-flight item");
                    break;
                }

                stats.reset_empty();
                state.store(WorkerState::Running as u8, Ordering::SeqCst);

                let app = item.source_app.clone();
                let collection = item.source_collection.clone();
                let name = item.record.name().unwrap_or_default().to_string();
                let entity_id = item.record.id().unwrap_or_default().to_string();

                match ctx.handler.handle(item, ctx.source.as_ref(), ctx.target.as_ref()) {
                    outcome @ ItemOutcome::Created { .. } => {
                        let processed = stats.record_processed();
                        info!(
                            worker = id,
                            processed = processed,
                            app = %app,
                            collection = %collection,
                            name = %name,
                            id = %entity_id,
                            dest = %outcome.path(),
                            "Processed entity"
                        );
                    }
                    ItemOutcome::Failed { path, .. } => {
                        stats.record_failed();
                        debug!(worker = id, dest = %path, name = %name, "Dropped item after failed write");
                    }
                }
            }
            Take::Empty => {
                let empty_count = stats.record_empty();
                state.store(WorkerState::Idle as u8, Ordering::SeqCst);
                warn!(
                    worker = id,
                    timeout_secs = timeout.as_secs_f64(),
                    empty_count = empty_count,
                    "No task received after timeout"
                );

                if empty_count >= max_empty {
                    warn!(worker = id, empty_count = empty_count, "Stopping work after empty count reached");
                    break;
                }
            }
            Take::Closed => {
                info!(worker = id, "Work queue closed");
                break;
            }
        }
    }

    state.store(WorkerState::Stopped as u8, Ordering::SeqCst);
    warn!(
        worker = id,
        processed = stats.processed(),
        failed = stats.failed(),
        "Worker finished"
    );
}

/// Number of workers whose thread is still alive
pub fn count_running(workers: &[Worker]) -> usize {
    workers.iter().filter(|w| w.is_running()).count()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mapping::MappingTable;
    use crate::pipeline::handler::CreateNew;
    use crate::pipeline::queue::{WorkItem, WorkQueue};
    use crate::store::{MemoryStore, Record};
    use serde_json::json;

    /// Writes normally, raising the shutdown flag after the `after`th item
    struct InterruptAfter {
        inner: CreateNew,
        seen: AtomicU64,
        after: u64,
        shutdown: Arc<AtomicBool>,
    }

    impl WriteHandler for InterruptAfter {
        fn handle(
            &self,
            item: WorkItem,
            source: &dyn StoreClient,
            target: &dyn StoreClient,
        ) -> ItemOutcome {
            let outcome = self.inner.handle(item, source, target);
            if self.seen.fetch_add(1, Ordering::SeqCst) + 1 == self.after {
                self.shutdown.store(true, Ordering::SeqCst);
            }
            outcome
        }
    }

    const SHORT: Duration = Duration::from_millis(20);

    fn context(
        queue: &WorkQueue,
        target: Arc<MemoryStore>,
        max_empty_count: u32,
        shutdown: Arc<AtomicBool>,
    ) -> WorkerContext {
        WorkerContext {
            settings: WorkerSettings {
                queue_timeout: SHORT,
                max_empty_count,
            },
            queue: queue.receiver(),
            source: Arc::new(MemoryStore::new()),
            target,
            handler: Arc::new(CreateNew::new(Arc::new(MappingTable::default()))),
            shutdown,
        }
    }

    fn item(name: &str) -> WorkItem {
        let record = Record::from_value(json!({"uuid": format!("id-{name}"), "name": name})).unwrap();
        WorkItem::new("red", "shop", "users", record)
    }

    #[test]
    fn test_worker_stats() {
        let stats = WorkerStats::default();

        assert_eq!(stats.record_processed(), 1);
        assert_eq!(stats.record_processed(), 2);
        stats.record_failed();
        assert_eq!(stats.record_empty(), 1);
        assert_eq!(stats.record_empty(), 2);
        stats.reset_empty();

        assert_eq!(stats.processed(), 2);
        assert_eq!(stats.failed(), 1);
        assert_eq!(stats.consecutive_empty(), 0);
    }

    #[test]
    fn test_idle_worker_stops_after_max_empty_polls() {
        let queue = WorkQueue::unbounded();
        let target = Arc::new(MemoryStore::new());
        let shutdown = Arc::new(AtomicBool::new(false));

        let worker = Worker::spawn(0, context(&queue, target, 3, shutdown)).unwrap();
        let stats = queue.stats();
        worker.join().unwrap();

        assert_eq!(stats.polls(), 3);
        assert_eq!(stats.dequeued(), 0);

        // No takes after stopping
        thread::sleep(SHORT * 3);
        assert_eq!(stats.polls(), 3);
    }

    #[test]
    fn test_worker_processes_items_then_stops() {
        let queue = WorkQueue::unbounded();
        let sender = queue.sender();
        for name in ["alice", "bob", "carol"] {
            sender.put(item(name)).unwrap();
        }

        let target = Arc::new(MemoryStore::new());
        let shutdown = Arc::new(AtomicBool::new(false));
        let worker = Worker::spawn(1, context(&queue, Arc::clone(&target), 1, shutdown)).unwrap();

        while worker.is_running() {
            thread::sleep(Duration::from_millis(5));
        }

        assert_eq!(worker.state(), WorkerState::Stopped);
        assert_eq!(worker.stats().processed(), 3);
        assert_eq!(worker.stats().consecutive_empty(), 1);
        assert_eq!(target.created().len(), 3);
        assert_eq!(queue.stats().polls(), 4);
    }

    #[test]
    fn test_failed_write_does_not_stop_worker() {
        let queue = WorkQueue::unbounded();
        let sender = queue.sender();
        for name in ["alice", "mallory", "bob"] {
            sender.put(item(name)).unwrap();
        }

        let target = Arc::new(MemoryStore::new());
        target.reject_name("mallory");
        let shutdown = Arc::new(AtomicBool::new(false));
        let worker = Worker::spawn(2, context(&queue, Arc::clone(&target), 1, shutdown)).unwrap();

        while worker.is_running() {
            thread::sleep(Duration::from_millis(5));
        }

        assert_eq!(worker.stats().processed(), 2);
        assert_eq!(worker.stats().failed(), 1);
        assert_eq!(target.create_calls(), 3);
        // The failure did not count as an empty poll
        assert_eq!(queue.stats().polls(), 4);
    }

    #[test]
    fn test_shutdown_stops_worker_without_draining() {
        let queue = WorkQueue::unbounded();
        let sender = queue.sender();
        for i in 0..10 {
            sender.put(item(&format!("user{i}"))).unwrap();
        }

        let target = Arc::new(MemoryStore::new());
        let shutdown = Arc::new(AtomicBool::new(true));
        let worker = Worker::spawn(3, context(&queue, Arc::clone(&target), 100, shutdown)).unwrap();
        worker.join().unwrap();

        assert!(target.created().is_empty());
        assert_eq!(queue.len(), 10);
    }

    #[test]
    fn test_interrupt_while_draining_leaves_rest_queued() {
        let queue = WorkQueue::unbounded();
        let sender = queue.sender();
        for i in 0..10 {
            sender.put(item(&format!("user{i}"))).unwrap();
        }

        let target = Arc::new(MemoryStore::new());
        let shutdown = Arc::new(AtomicBool::new(false));
        let handler = InterruptAfter {
            inner: CreateNew::new(Arc::new(MappingTable::default())),
            seen: AtomicU64::new(0),
            after: 3,
            shutdown: Arc::clone(&shutdown),
        };
        let ctx = WorkerContext {
            handler: Arc::new(handler),
            ..context(&queue, Arc::clone(&target), 100, shutdown)
        };

        let worker = Worker::spawn(5, ctx).unwrap();
        worker.join().unwrap();

        assert_eq!(target.created().len(), 3);
        assert_eq!(queue.len(), 7);
        assert_eq!(queue.stats().polls(), 3);
        assert_eq!(queue.active_workers(), 0);
    }

    #[test]
    fn test_closed_queue_stops_worker() {
        let queue = WorkQueue::unbounded();
        let target = Arc::new(MemoryStore::new());
        let shutdown = Arc::new(AtomicBool::new(false));
        let ctx = WorkerContext {
            settings: WorkerSettings {
                queue_timeout: Duration::from_secs(30),
                max_empty_count: 100,
            },
            ..context(&queue, target, 100, shutdown)
        };
        drop(queue);

        let worker = Worker::spawn(4, ctx).unwrap();
        worker.join().unwrap();
    }

    #[test]
    fn test_count_running() {
        let queue = WorkQueue::unbounded();
        let shutdown = Arc::new(AtomicBool::new(false));
        let workers: Vec<Worker> = (0..2)
            .map(|id| {
                Worker::spawn(id, context(&queue, Arc::new(MemoryStore::new()), 1, Arc::clone(&shutdown)))
                    .unwrap()
            })
            .collect();

        while count_running(&workers) > 0 {
            thread::sleep(Duration::from_millis(5));
        }
        assert!(workers.iter().all(|w| w.state() == WorkerState::Stopped));
    }
}
