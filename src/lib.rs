//! usergrid-migrate - Parallel entity migrator for Usergrid-style stores
//!
//! Copies every entity of a source org into a target store, optionally
//! renaming the org, its applications and its collections on the way.
//!
//! # Features
//!
//! - **Parallel Writes**: A pool of worker threads drains a shared work
//!   queue, so one slow create does not hold up the others.
//!
//! - **Idempotent Creates**: Entities are written with a `PUT` on their
//!   natural key, so an interrupted run can simply be repeated.
//!
//! - **Name Mapping**: `A:B` pairs rename orgs, apps and collections
//!   independently; anything unmapped keeps its name.
//!
//! - **Idle Shutdown**: Workers stop after a configurable number of empty
//!   polls, without any end-of-stream message from the producer.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐   put    ┌───────────┐  take(timeout)  ┌──────────────┐
//! │ Source store ├─────────►│ WorkQueue ├────────────────►│ Worker 0..N  │
//! │ (enumerator) │          └───────────┘                 │  CreateNew   │
//! └──────────────┘                                        └──────┬───────┘
//!                                                                │ PUT
//!                                                                ▼
//!                                                         ┌──────────────┐
//!                                                         │ Target store │
//!                                                         └──────────────┘
//! ```
//!
//! # Example
//!
//! ```bash
//! # Copy every app of org 'red' into org 'blue' with 8 workers
//! usergrid-migrate -o red -a '*' --map-org red:blue -w 8
//!
//! # Only the users collection of one app
//! usergrid-migrate -o red -a shop -c users
//! ```

pub mod config;
pub mod error;
pub mod mapping;
pub mod pipeline;
pub mod store;

pub use config::{CliArgs, EndpointConfig, EndpointFile, MigrateConfig};
pub use error::{ItemOutcome, MigrateError, Result, StoreError};
pub use mapping::{MappingTable, NameMap};
pub use pipeline::{MigrationCoordinator, MigrationResult};
pub use store::{CollectionRef, MemoryStore, Record, RestStore, StoreClient};
