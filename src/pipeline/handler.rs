//! Per-item write logic
//!
//! A [`WriteHandler`] turns one [`WorkItem`] into a write against the
//! target store. [`CreateNew`] is the handler used for migrations: it
//! strips store-internal metadata, renames org/app/collection through the
//! [`MappingTable`] and issues an idempotent create.

use super::queue::WorkItem;
use crate::error::ItemOutcome;
use crate::mapping::MappingTable;
use crate::store::{CollectionRef, StoreClient};
use std::sync::Arc;
use tracing::{error, trace};

/// Writes a single work item to the target
pub trait WriteHandler: Send + Sync {
    fn handle(
        &self,
        item: WorkItem,
        source: &dyn StoreClient,
        target: &dyn StoreClient,
    ) -> ItemOutcome;
}

/// Recreate each entity in the mapped target collection
#[derive(Debug, Clone)]
pub struct CreateNew {
    mapping: Arc<MappingTable>,
}

impl CreateNew {
    pub fn new(mapping: Arc<MappingTable>) -> Self {
        Self { mapping }
    }

    /// Where an item from `org/app/collection` lands in the target
    pub fn target_collection(&self, item: &WorkItem) -> CollectionRef {
        CollectionRef::new(
            self.mapping.target_org(&item.source_org),
            self.mapping.target_app(&item.source_app),
            self.mapping.target_collection(&item.source_collection),
        )
    }
}

impl WriteHandler for CreateNew {
    fn handle(
        &self,
        item: WorkItem,
        _source: &dyn StoreClient,
        target: &dyn StoreClient,
    ) -> ItemOutcome {
        let collection = self.target_collection(&item);
        let mut record = item.record;

        if record.strip_metadata().is_some() {
            trace!(collection = %collection, "Stripped metadata");
        }

        let key = record.natural_key().unwrap_or("<unnamed>").to_string();

        match target.create_entity(&collection, &record) {
            Ok(()) => ItemOutcome::Created {
                path: collection.path(),
                key,
            },
            Err(e) => {
                error!(
                    collection = %collection,
                    key = %key,
                    retryable = e.is_retryable(),
                    error = %e,
                    details = ?e,
                    "Failed to create entity"
                );
                ItemOutcome::Failed {
                    path: collection.path(),
                    error: e,
                }
            }
        }
    }
}
