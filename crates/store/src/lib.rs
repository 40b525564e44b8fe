//! Document store seam for listshare
//!
//! The list, task and notification layers never talk to a backend directly.
//! They go through [`DocumentStore`]: collection-scoped queries, live
//! watches, and atomic field-level writes (array union, server timestamps,
//! revision preconditions).
//!
//! Two implementations ship with the crate:
//!
//! - [`MemoryStore`] keeps everything in process and delivers watches
//!   synchronously; tests and demos use it.
//! - [`RestStore`] talks to a remote document service over HTTP and
//!   implements watches by polling.

mod document;
mod error;
mod memory;
mod query;
mod rest;
mod watch;

use async_trait::async_trait;

pub use document::{Document, FieldOp, FieldOps, Precondition};
pub use error::StoreError;
pub use memory::MemoryStore;
pub use query::{Filter, FilterOperator, Query, MAX_IN_VALUES};
pub use rest::{RestStore, RestStoreOptions};
pub use watch::{WatchEvent, WatchSender, WatchStream};

/// A schemaless, multi-writer document store.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Fetch one document.
    async fn get(&self, collection: &str, id: &str) -> Result<Document, StoreError>;

    /// Insert a new document built by applying `ops` to an empty one. The
    /// store assigns the id.
    async fn create(&self, collection: &str, ops: FieldOps) -> Result<Document, StoreError>;

    /// Apply `ops` atomically to an existing document.
    async fn update(
        &self,
        collection: &str,
        id: &str,
        ops: FieldOps,
        precondition: Option<Precondition>,
    ) -> Result<Document, StoreError>;

    /// Remove a document.
    async fn delete(&self, collection: &str, id: &str) -> Result<(), StoreError>;

    /// One-shot query.
    async fn query(&self, collection: &str, query: &Query) -> Result<Vec<Document>, StoreError>;

    /// Live query. The first event is the current result set; every later
    /// event is the full result set after a change.
    async fn watch(&self, collection: &str, query: Query) -> Result<WatchStream, StoreError>;
}
