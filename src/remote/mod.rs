//! Remote document store seam.
//!
//! The feed consumes a document database through [`RemoteDocumentStore`]:
//! one-shot reads and writes by path, ordered/filtered/limited queries with
//! a `start_after` cursor, and live watches on queries and single documents.
//! Watches are channel streams ([`Subscription`]) rather than callbacks.
//!
//! [`MemoryDocumentStore`] is an in-process implementation with the same
//! change semantics, used by tests and benches.

mod memory;
mod query;

pub use memory::MemoryDocumentStore;
pub use query::{ChangeKind, Direction, DocumentChange, Filter, Query};

use crate::error::Result;
use crate::subscriptions::{Subscription, WatchEvent};
use crate::types::{DocPath, Document, DocumentSnapshot};
use serde_json::{Map, Value};

/// Event type of a query watch: the changes since the previous event.
pub type QueryEvent = WatchEvent<Vec<DocumentChange>>;

/// Event type of a document watch: the full current snapshot.
pub type DocumentEvent = WatchEvent<DocumentSnapshot>;

/// Live query handle.
pub type QueryWatch = Subscription<Vec<DocumentChange>>;

/// Live document handle.
pub type DocumentWatch = Subscription<DocumentSnapshot>;

/// A remote, ordered document database.
pub trait RemoteDocumentStore: Send + Sync {
    /// One-shot read. A missing document is `Ok` with `data == None`.
    fn get(&self, path: &DocPath) -> Result<DocumentSnapshot>;

    /// Create or overwrite a document.
    fn set(&self, path: &DocPath, data: Map<String, Value>) -> Result<()>;

    /// Shallow-merge `patch` into an existing document.
    fn update(&self, path: &DocPath, patch: Map<String, Value>) -> Result<()>;

    fn delete(&self, path: &DocPath) -> Result<()>;

    /// One-shot query.
    fn query(&self, query: &Query) -> Result<Vec<Document>>;

    /// Watch a query. The first event carries the current result set as
    /// `Added` changes.
    fn watch_query(&self, query: &Query) -> Result<QueryWatch>;

    /// Watch one document. The first event carries its current snapshot.
    fn watch_document(&self, path: &DocPath) -> Result<DocumentWatch>;
}
