//! Migration coordinator - orchestrates the parallel copy
//!
//! The coordinator is responsible for:
//! - Authenticating against the source and target
//! - Setting up the work queue and workers
//! - Driving source enumeration on the calling thread
//! - Waiting until every worker has stopped
//! - Signal handling (hard stop on interrupt)

use super::enumerator::{EnumerationStats, SourceEnumerator};
use super::handler::WriteHandler;
use super::queue::WorkQueue;
use super::worker::{count_running, Worker, WorkerContext, WorkerSettings};
use crate::config::{MigrateConfig, StoreSide};
use crate::error::{MigrateError, Result};
use crate::store::StoreClient;
use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tracing::{error, info, warn};

/// Result of a migration run
#[derive(Debug)]
pub struct MigrationResult {
    /// Wall-clock start of the run
    pub started_at: DateTime<Utc>,

    /// Time taken for the run
    pub duration: Duration,

    /// Counters from the enumeration pass
    pub enumeration: EnumerationStats,

    /// Items handed to workers
    pub dequeued: u64,

    /// `take` calls made by all workers, including empty ones
    pub polls: u64,

    /// Whether the run finished (vs was interrupted or could not enumerate)
    pub completed: bool,
}

/// Coordinates enumeration and the worker pool
pub struct MigrationCoordinator {
    config: Arc<MigrateConfig>,
    source: Arc<dyn StoreClient>,
    target: Arc<dyn StoreClient>,
    handler: Arc<dyn WriteHandler>,
    queue: WorkQueue,
    workers: Vec<Worker>,
    shutdown: Arc<AtomicBool>,
}

impl MigrationCoordinator {
    pub fn new(
        config: Arc<MigrateConfig>,
        source: Arc<dyn StoreClient>,
        target: Arc<dyn StoreClient>,
        handler: Arc<dyn WriteHandler>,
    ) -> Self {
        let queue = WorkQueue::new(config.queue_capacity);

        Self {
            config,
            source,
            target,
            handler,
            queue,
            workers: Vec::new(),
            shutdown: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Get a clone of the shutdown flag (for signal handlers)
    pub fn shutdown_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.shutdown)
    }

    /// Run the migration
    ///
    /// Authentication failures abort before any worker starts. After that,
    /// only a failure to list the source applications is returned as an
    /// error, once the workers have stopped.
    pub fn run(mut self) -> Result<MigrationResult> {
        let started_at = Utc::now();
        let start = Instant::now();

        info!(
            org = %self.config.org,
            target_org = %self.config.target.org,
            workers = self.config.worker_count,
            started_at = %started_at.to_rfc3339(),
            "Starting migration"
        );

        authenticate(self.source.as_ref(), &self.config.source, "source")?;
        authenticate(self.target.as_ref(), &self.config.target, "target")?;

        warn!("Starting workers...");
        self.spawn_workers()?;

        let enumerated = SourceEnumerator::new(
            &self.config,
            self.source.as_ref(),
            self.queue.sender(),
            Arc::clone(&self.shutdown),
        )
        .run();

        let (enumeration, failure) = match enumerated {
            Ok(stats) => {
                info!(
                    apps = stats.apps,
                    collections = stats.collections,
                    published = stats.published,
                    failed_collections = stats.failed_collections,
                    "Publishing entities complete"
                );
                (stats, None)
            }
            Err(MigrateError::Interrupted) => {
                warn!("Interrupt received, abandoning workers");
                return Ok(self.result(started_at, start.elapsed(), EnumerationStats::default(), false));
            }
            Err(e) => {
                error!(error = %e, "Enumeration failed, waiting for workers to drain");
                (EnumerationStats::default(), Some(e))
            }
        };

        let drained = self.wait_for_workers();
        let duration = start.elapsed();

        if let Some(e) = failure {
            // Interrupted while waiting: hard stop, leave the threads behind
            if drained {
                self.join_workers();
            }
            return Err(e);
        }

        if drained {
            self.join_workers();
            warn!("Worker threads finished");
        }

        info!(
            published = enumeration.published,
            duration_secs = duration.as_secs(),
            "Migration finished"
        );

        Ok(self.result(started_at, duration, enumeration, drained))
    }

    fn result(
        &self,
        started_at: DateTime<Utc>,
        duration: Duration,
        enumeration: EnumerationStats,
        completed: bool,
    ) -> MigrationResult {
        let stats = self.queue.stats();
        MigrationResult {
            started_at,
            duration,
            enumeration,
            dequeued: stats.dequeued(),
            polls: stats.polls(),
            completed,
        }
    }

    /// Spawn worker threads
    fn spawn_workers(&mut self) -> Result<()> {
        let settings = WorkerSettings {
            queue_timeout: self.config.queue_timeout,
            max_empty_count: self.config.max_empty_count,
        };

        for id in 0..self.config.worker_count {
            let context = WorkerContext {
                settings,
                queue: self.queue.receiver(),
                source: Arc::clone(&self.source),
                target: Arc::clone(&self.target),
                handler: Arc::clone(&self.handler),
                shutdown: Arc::clone(&self.shutdown),
            };

            self.workers.push(Worker::spawn(id, context)?);
        }

        info!(count = self.workers.len(), "Workers spawned");
        Ok(())
    }

    /// Poll worker liveness until all have stopped
    ///
    /// Returns false if interrupted; running workers are then left behind.
    fn wait_for_workers(&self) -> bool {
        loop {
            if self.shutdown.load(Ordering::SeqCst) {
                warn!("Interrupt received, not waiting for workers");
                return false;
            }

            let running = count_running(&self.workers);
            if running == 0 {
                return true;
            }

            warn!(running = running, "Waiting for workers to finish");
            self.sleep_interruptibly(self.config.wait_interval);
        }
    }

    /// Sleep for `total`, waking early if shutdown is raised
    fn sleep_interruptibly(&self, total: Duration) {
        let step = Duration::from_millis(50).min(total);
        let deadline = Instant::now() + total;

        while Instant::now() < deadline {
            if self.shutdown.load(Ordering::Relaxed) || count_running(&self.workers) == 0 {
                return;
            }
            thread::sleep(step);
        }
    }

    fn join_workers(&mut self) {
        for worker in std::mem::take(&mut self.workers) {
            if let Err(e) = worker.join() {
                warn!(error = %e, "Worker failed to join cleanly");
            }
        }
    }
}

/// Log in to one side, skipping sides without credentials
fn authenticate(client: &dyn StoreClient, side: &StoreSide, label: &str) -> Result<()> {
    match &side.credentials {
        Some(credentials) => {
            client.authenticate(credentials)?;
            info!(side = label, org = %side.org, url = %side.endpoint.api_url, "Authenticated");
        }
        None => {
            warn!(side = label, org = %side.org, "Skipping authentication, no credentials");
        }
    }
    Ok(())
}
