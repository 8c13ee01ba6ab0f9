//! In-process store
//!
//! Keeps org/app/collection data in ordered maps behind a lock. Creates
//! upsert on the record's natural key, which gives the same
//! retry-is-safe behaviour as the REST store's `PUT`.

use super::{CollectionRef, Credentials, Page, Record, StoreClient};
use crate::error::{StoreError, StoreResult};
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};

type Collections = BTreeMap<String, Vec<Record>>;
type Apps = BTreeMap<String, Collections>;

#[derive(Debug, Default)]
struct MemoryState {
    orgs: BTreeMap<String, Apps>,

    /// Every successful create, in call order
    created: Vec<(CollectionRef, Record)>,

    authenticated: bool,
}

/// Thread-safe in-memory [`StoreClient`]
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: RwLock<MemoryState>,

    /// Record names whose create is refused
    rejected_names: RwLock<HashSet<String>>,

    /// Credentials `authenticate` accepts; `None` accepts anything
    required_credentials: Option<Credentials>,

    page_requests: AtomicU64,
    create_calls: AtomicU64,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Only accept these credentials in `authenticate`
    pub fn with_required_credentials(mut self, credentials: Credentials) -> Self {
        self.required_credentials = Some(credentials);
        self
    }

    /// Make `create_entity` fail for any record with this name
    pub fn reject_name(&self, name: impl Into<String>) {
        self.rejected_names.write().insert(name.into());
    }

    /// Create an application with no collections
    pub fn insert_app(&self, org: &str, app: &str) {
        self.state
            .write()
            .orgs
            .entry(org.to_string())
            .or_default()
            .entry(app.to_string())
            .or_default();
    }

    /// Append records to a collection, creating it if needed
    pub fn insert_records(&self, org: &str, app: &str, collection: &str, records: Vec<Record>) {
        self.state
            .write()
            .orgs
            .entry(org.to_string())
            .or_default()
            .entry(app.to_string())
            .or_default()
            .entry(collection.to_string())
            .or_default()
            .extend(records);
    }

    /// Current contents of a collection
    pub fn records(&self, collection: &CollectionRef) -> Vec<Record> {
        let state = self.state.read();
        state
            .orgs
            .get(&collection.org)
            .and_then(|apps| apps.get(&collection.app))
            .and_then(|colls| colls.get(&collection.collection))
            .cloned()
            .unwrap_or_default()
    }

    /// Every successful create in call order
    pub fn created(&self) -> Vec<(CollectionRef, Record)> {
        self.state.read().created.clone()
    }

    pub fn is_authenticated(&self) -> bool {
        self.state.read().authenticated
    }

    pub fn page_requests(&self) -> u64 {
        self.page_requests.load(Ordering::Relaxed)
    }

    pub fn create_calls(&self) -> u64 {
        self.create_calls.load(Ordering::Relaxed)
    }
}

impl StoreClient for MemoryStore {
    fn authenticate(&self, credentials: &Credentials) -> StoreResult<()> {
        if let Some(required) = &self.required_credentials {
            if required.client_id != credentials.client_id
                || required.client_secret != credentials.client_secret
            {
                return Err(StoreError::AuthFailed {
                    url: "memory://".into(),
                    reason: format!("unknown client id '{}'", credentials.client_id),
                });
            }
        }

        self.state.write().authenticated = true;
        Ok(())
    }

    fn list_applications(&self, org: &str) -> StoreResult<Vec<String>> {
        let state = self.state.read();
        let apps = state
            .orgs
            .get(org)
            .ok_or_else(|| StoreError::NotFound { path: org.to_string() })?;
        Ok(apps.keys().cloned().collect())
    }

    fn list_collections(&self, org: &str, app: &str) -> StoreResult<Vec<String>> {
        let state = self.state.read();
        let collections = state
            .orgs
            .get(org)
            .and_then(|apps| apps.get(app))
            .ok_or_else(|| StoreError::NotFound {
                path: format!("{org}/{app}"),
            })?;
        Ok(collections.keys().cloned().collect())
    }

    fn fetch_page(
        &self,
        collection: &CollectionRef,
        _ql: &str,
        limit: usize,
        cursor: Option<&str>,
    ) -> StoreResult<Page> {
        self.page_requests.fetch_add(1, Ordering::Relaxed);

        let offset = match cursor {
            Some(c) => c.parse::<usize>().map_err(|_| StoreError::Malformed {
                url: collection.path(),
                reason: format!("invalid cursor '{c}'"),
            })?,
            None => 0,
        };

        let state = self.state.read();
        let records = state
            .orgs
            .get(&collection.org)
            .and_then(|apps| apps.get(&collection.app))
            .and_then(|colls| colls.get(&collection.collection))
            .ok_or_else(|| StoreError::NotFound {
                path: collection.path(),
            })?;

        let limit = limit.max(1);
        let end = (offset + limit).min(records.len());
        let page: Vec<Record> = records.get(offset..end).map(<[Record]>::to_vec).unwrap_or_default();
        let cursor = (end < records.len()).then(|| end.to_string());

        Ok(Page {
            records: page,
            cursor,
        })
    }

    fn create_entity(&self, collection: &CollectionRef, record: &Record) -> StoreResult<()> {
        self.create_calls.fetch_add(1, Ordering::Relaxed);

        if let Some(name) = record.name() {
            if self.rejected_names.read().contains(name) {
                return Err(StoreError::Rejected {
                    path: collection.path(),
                    key: record.natural_key().unwrap_or(name).to_string(),
                    reason: "rejected by store".into(),
                });
            }
        }

        let mut state = self.state.write();
        let records = state
            .orgs
            .entry(collection.org.clone())
            .or_default()
            .entry(collection.app.clone())
            .or_default()
            .entry(collection.collection.clone())
            .or_default();

        let existing = record
            .natural_key()
            .and_then(|key| records.iter().position(|r| r.natural_key() == Some(key)));

        match existing {
            Some(idx) => records[idx] = record.clone(),
            None => records.push(record.clone()),
        }

        state.created.push((collection.clone(), record.clone()));
        Ok(())
    }
}
