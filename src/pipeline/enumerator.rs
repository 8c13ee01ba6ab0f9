//! Source enumeration
//!
//! Walks apps, then collections, then entities of the source org and
//! publishes every entity to the work queue. A failure inside one
//! collection is logged and the walk moves on; only an interrupt ends it
//! early.

use super::queue::{PutError, WorkItem, WorkQueueSender};
use crate::config::MigrateConfig;
use crate::error::{MigrateError, Result};
use crate::store::{CollectionRef, EntityQuery, StoreClient};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

/// Collections the store manages itself and that are never copied
pub const INTERNAL_COLLECTIONS: [&str; 2] = ["events", "queues"];

/// How often a blocked put re-checks the shutdown flag
const PUT_RETRY_INTERVAL: Duration = Duration::from_millis(100);

/// Counters from one enumeration pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EnumerationStats {
    pub apps: u64,
    pub collections: u64,
    pub published: u64,

    /// Collections whose query failed part-way
    pub failed_collections: u64,
}

/// Publishes source entities onto the work queue
pub struct SourceEnumerator<'a> {
    config: &'a MigrateConfig,
    source: &'a dyn StoreClient,
    queue: WorkQueueSender,
    shutdown: Arc<AtomicBool>,
}

impl<'a> SourceEnumerator<'a> {
    pub fn new(
        config: &'a MigrateConfig,
        source: &'a dyn StoreClient,
        queue: WorkQueueSender,
        shutdown: Arc<AtomicBool>,
    ) -> Self {
        Self {
            config,
            source,
            queue,
            shutdown,
        }
    }

    /// Enumerate the whole org
    ///
    /// Returns `MigrateError::Interrupted` if the shutdown flag is raised,
    /// or the store error if the application list itself cannot be read.
    pub fn run(&self) -> Result<EnumerationStats> {
        let org = self.config.org.as_str();
        let mut stats = EnumerationStats::default();

        let apps = self.source.list_applications(org)?;

        for app in apps {
            self.check_shutdown()?;

            if !self.config.apps.allows(&app) {
                warn!(app = %app, "Skipping app");
                continue;
            }

            warn!(app = %app, "Processing app");
            stats.apps += 1;

            let collections = match self.source.list_collections(org, &app) {
                Ok(collections) => collections,
                Err(e) => {
                    error!(app = %app, error = %e, "Failed to list collections");
                    continue;
                }
            };

            for collection in collections {
                if INTERNAL_COLLECTIONS.contains(&collection.as_str()) {
                    warn!(app = %app, collection = %collection, "Skipping internal collection");
                    continue;
                }

                if !self.config.collections.allows(&collection) {
                    warn!(app = %app, collection = %collection, "Skipping collection");
                    continue;
                }

                warn!(app = %app, collection = %collection, "Processing collection");
                stats.collections += 1;

                let coll = CollectionRef::new(org, app.as_str(), collection.as_str());
                let (count, failed) = self.publish_collection(&coll)?;
                stats.published += count;
                if failed {
                    stats.failed_collections += 1;
                }

                info!(app = %app, collection = %collection, count = count, "Finished collection");
            }

            info!(app = %app, "Publishing entities complete");
        }

        Ok(stats)
    }

    /// Publish one collection; returns the count and whether the query failed
    fn publish_collection(&self, coll: &CollectionRef) -> Result<(u64, bool)> {
        let query = EntityQuery::new(
            self.source,
            coll.clone(),
            self.config.ql.as_str(),
            self.config.page_limit(),
        );

        let mut count = 0u64;

        for record in query {
            self.check_shutdown()?;

            let record = match record {
                Ok(record) => record,
                Err(e) => {
                    error!(collection = %coll, published = count, error = %e, "Query failed, moving on");
                    return Ok((count, true));
                }
            };

            let item = WorkItem::new(&coll.org, &coll.app, &coll.collection, record);
            self.publish(item)?;
            count += 1;
        }

        Ok((count, false))
    }

    /// Put an item, staying responsive to shutdown while a bounded queue is full
    ///
    /// Gives up with `NoLiveWorkers` once the queue is full and every worker
    /// has stopped, since nothing will ever make room.
    fn publish(&self, mut item: WorkItem) -> Result<()> {
        loop {
            match self.queue.put_timeout(item, PUT_RETRY_INTERVAL) {
                Ok(()) => return Ok(()),
                Err(PutError::Full(returned)) => {
                    self.check_shutdown()?;

                    if self.queue.active_workers() == 0 {
                        let published = self.queue.enqueued();
                        error!(published = published, "Work queue is full and every worker has stopped");
                        return Err(MigrateError::NoLiveWorkers { published });
                    }

                    item = returned;
                }
                Err(PutError::Closed(_)) => return Err(MigrateError::ChannelClosed),
            }
        }
    }

    fn check_shutdown(&self) -> Result<()> {
        if self.shutdown.load(Ordering::SeqCst) {
            Err(MigrateError::Interrupted)
        } else {
            Ok(())
        }
    }
}
