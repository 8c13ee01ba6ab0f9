//! Fault-injecting wrapper around [`MemoryStore`] for tests

use super::{CollectionRef, Credentials, MemoryStore, Page, Record, StoreClient};
use crate::error::{StoreError, StoreResult};
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::thread;
use std::time::Duration;

/// Delegates to a [`MemoryStore`], failing or stalling where told to
#[derive(Debug, Default)]
pub struct FaultyStore {
    inner: MemoryStore,
    listing_delay: Duration,
    failing_apps: HashSet<String>,

    /// Collection name to the number of pages served before queries fail
    failing_queries: HashMap<String, usize>,
    pages_served: Mutex<HashMap<String, usize>>,
}

impl FaultyStore {
    pub fn new(inner: MemoryStore) -> Self {
        Self {
            inner,
            ..Self::default()
        }
    }

    /// Sleep before answering `list_applications`
    pub fn with_listing_delay(mut self, delay: Duration) -> Self {
        self.listing_delay = delay;
        self
    }

    /// Make `list_collections` fail for this app
    pub fn fail_collections_of(mut self, app: &str) -> Self {
        self.failing_apps.insert(app.to_string());
        self
    }

    /// Serve `pages` pages of this collection, then fail
    pub fn fail_query_after(mut self, collection: &str, pages: usize) -> Self {
        self.failing_queries.insert(collection.to_string(), pages);
        self
    }
}

impl StoreClient for FaultyStore {
    fn authenticate(&self, credentials: &Credentials) -> StoreResult<()> {
        self.inner.authenticate(credentials)
    }

    fn list_applications(&self, org: &str) -> StoreResult<Vec<String>> {
        if !self.listing_delay.is_zero() {
            thread::sleep(self.listing_delay);
        }
        self.inner.list_applications(org)
    }

    fn list_collections(&self, org: &str, app: &str) -> StoreResult<Vec<String>> {
        if self.failing_apps.contains(app) {
            return Err(StoreError::Transport {
                url: format!("memory://{org}/{app}"),
                reason: "connection reset".into(),
            });
        }
        self.inner.list_collections(org, app)
    }

    fn fetch_page(
        &self,
        collection: &CollectionRef,
        ql: &str,
        limit: usize,
        cursor: Option<&str>,
    ) -> StoreResult<Page> {
        if let Some(&allowed) = self.failing_queries.get(&collection.collection) {
            let mut served = self.pages_served.lock();
            let count = served.entry(collection.path()).or_default();
            if *count >= allowed {
                return Err(StoreError::Api {
                    url: collection.path(),
                    status: 500,
                    error: "internal_error".into(),
                    description: "query failed".into(),
                });
            }
            *count += 1;
        }
        self.inner.fetch_page(collection, ql, limit, cursor)
    }

    fn create_entity(&self, collection: &CollectionRef, record: &Record) -> StoreResult<()> {
        self.inner.create_entity(collection, record)
    }
}
