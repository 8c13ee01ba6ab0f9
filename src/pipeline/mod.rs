//! Migration pipeline
//!
//! ```text
//!                 ┌─────────────────────────┐
//!                 │    SourceEnumerator     │
//!                 │  apps → collections →   │
//!                 │  paginated entities     │
//!                 └───────────┬─────────────┘
//!                             │ put
//!                             ▼
//!                 ┌─────────────────────────┐
//!                 │       WorkQueue         │
//!                 │  (crossbeam channel)    │
//!                 └───────────┬─────────────┘
//!                             │ take(timeout)
//!       ┌─────────────────────┼─────────────────────┐
//!       │                     │                     │
//! ┌─────▼─────┐         ┌─────▼─────┐         ┌─────▼─────┐
//! │  Worker 0 │         │  Worker 1 │         │  Worker N │
//! │ CreateNew │         │ CreateNew │         │ CreateNew │
//! └─────┬─────┘         └─────┬─────┘         └─────┬─────┘
//!       └─────────────────────┼─────────────────────┘
//!                             ▼
//!                       target store
//! ```

pub mod coordinator;
pub mod enumerator;
pub mod handler;
pub mod queue;
pub mod worker;

pub use coordinator::{MigrationCoordinator, MigrationResult};
pub use enumerator::{EnumerationStats, SourceEnumerator, INTERNAL_COLLECTIONS};
pub use handler::{CreateNew, WriteHandler};
pub use queue::{Take, WorkGuard, WorkItem, WorkQueue, WorkQueueReceiver, WorkQueueSender};
pub use worker::{Worker, WorkerContext, WorkerSettings, WorkerState, WorkerStats};
