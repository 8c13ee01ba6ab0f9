//! Store client abstraction
//!
//! The migrator reads from one store and writes to another through the
//! [`StoreClient`] trait. Clients are shared by every worker thread, so
//! implementations must be `Send + Sync`.
//!
//! - [`RestStore`]: blocking HTTP client for a Usergrid-style REST API
//! - [`MemoryStore`]: in-process store used by tests and benchmarks

#[cfg(test)]
pub(crate) mod faulty;
pub mod memory;
pub mod rest;
pub mod types;

pub use memory::MemoryStore;
pub use rest::RestStore;
pub use types::{Credentials, Page, Record, METADATA_FIELD};

use crate::error::{StoreError, StoreResult};
use std::fmt;

/// Handle to one collection inside an org/app
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CollectionRef {
    pub org: String,
    pub app: String,
    pub collection: String,
}

impl CollectionRef {
    pub fn new(
        org: impl Into<String>,
        app: impl Into<String>,
        collection: impl Into<String>,
    ) -> Self {
        Self {
            org: org.into(),
            app: app.into(),
            collection: collection.into(),
        }
    }

    /// `org/app/collection`
    pub fn path(&self) -> String {
        format!("{}/{}/{}", self.org, self.app, self.collection)
    }
}

impl fmt::Display for CollectionRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.org, self.app, self.collection)
    }
}

/// Operations the migrator needs from a data store
pub trait StoreClient: Send + Sync {
    /// Authenticate with client credentials; later calls use the session
    fn authenticate(&self, credentials: &Credentials) -> StoreResult<()>;

    /// Names of the applications in an org
    fn list_applications(&self, org: &str) -> StoreResult<Vec<String>>;

    /// Names of the collections in an application
    fn list_collections(&self, org: &str, app: &str) -> StoreResult<Vec<String>>;

    /// Fetch one page of a query, starting at `cursor`
    fn fetch_page(
        &self,
        collection: &CollectionRef,
        ql: &str,
        limit: usize,
        cursor: Option<&str>,
    ) -> StoreResult<Page>;

    /// Create an entity; repeating the call for the same record is safe
    fn create_entity(&self, collection: &CollectionRef, record: &Record) -> StoreResult<()>;
}

/// Lazy iterator over every record matching a query
///
/// Pages are fetched on demand. The first error is yielded once and ends
/// the iteration.
pub struct EntityQuery<'a> {
    client: &'a dyn StoreClient,
    collection: CollectionRef,
    ql: String,
    limit: usize,
    cursor: Option<String>,
    buffer: std::vec::IntoIter<Record>,
    exhausted: bool,
}

impl<'a> EntityQuery<'a> {
    pub fn new(
        client: &'a dyn StoreClient,
        collection: CollectionRef,
        ql: impl Into<String>,
        limit: usize,
    ) -> Self {
        Self {
            client,
            collection,
            ql: ql.into(),
            limit,
            cursor: None,
            buffer: Vec::new().into_iter(),
            exhausted: false,
        }
    }

    fn fetch_next(&mut self) -> StoreResult<()> {
        let page = self
            .client
            .fetch_page(&self.collection, &self.ql, self.limit, self.cursor.as_deref())?;

        // A repeated cursor would loop forever
        if page.cursor.is_some() && page.cursor == self.cursor {
            return Err(StoreError::Malformed {
                url: self.collection.path(),
                reason: "store returned the same cursor twice".into(),
            });
        }

        self.exhausted = page.cursor.is_none();
        self.cursor = page.cursor;
        self.buffer = page.records.into_iter();
        Ok(())
    }
}

impl Iterator for EntityQuery<'_> {
    type Item = StoreResult<Record>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(record) = self.buffer.next() {
                return Some(Ok(record));
            }

            if self.exhausted {
                return None;
            }

            if let Err(e) = self.fetch_next() {
                self.exhausted = true;
                return Some(Err(e));
            }
        }
    }
}
