//! In-process document store with live watches.

use crate::error::{FeedError, Result};
use crate::subscriptions::{CancelToken, DropReason, Subscription, SubscriptionId, WatchEvent};
use crate::types::{DocPath, Document, DocumentSnapshot};
use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use parking_lot::{Mutex, RwLock};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use super::query::diff;
use super::{DocumentEvent, DocumentWatch, Query, QueryEvent, QueryWatch, RemoteDocumentStore};

/// Default per-watch buffer (events).
const DEFAULT_BUFFER_SIZE: usize = 256;

type Collection = BTreeMap<String, Map<String, Value>>;

/// Outcome of offering an event to a watcher.
enum Delivery {
    Sent,
    /// Consumer cancelled or hung up; forget silently.
    Gone,
    /// Buffer full; drop the watcher and tell it why.
    Overflow,
}

/// Offer `event` to a watcher holding at most `capacity` events. The channel
/// keeps one extra slot so the overflow notice always fits.
fn deliver<T>(
    sender: &Sender<WatchEvent<T>>,
    token: &CancelToken,
    capacity: usize,
    event: WatchEvent<T>,
) -> Delivery {
    if token.is_cancelled() {
        return Delivery::Gone;
    }
    if sender.len() >= capacity {
        return match sender.try_send(WatchEvent::Dropped(DropReason::BufferOverflow)) {
            Err(TrySendError::Disconnected(_)) => Delivery::Gone,
            _ => Delivery::Overflow,
        };
    }
    match sender.try_send(event) {
        Ok(()) => Delivery::Sent,
        Err(TrySendError::Full(_)) => Delivery::Overflow,
        Err(TrySendError::Disconnected(_)) => Delivery::Gone,
    }
}

/// Channel for one watch: `capacity` events plus the overflow notice.
fn watch_channel<T>(capacity: usize) -> (Sender<WatchEvent<T>>, Receiver<WatchEvent<T>>) {
    bounded(capacity + 1)
}

struct QueryWatcher {
    query: Query,
    sender: Sender<QueryEvent>,
    token: CancelToken,
    /// Result set as of the last delivered event.
    last: Vec<Document>,
}

struct DocumentWatcher {
    path: DocPath,
    sender: Sender<DocumentEvent>,
    token: CancelToken,
}

/// Thread-safe in-memory [`RemoteDocumentStore`].
///
/// Every write notifies matching watches synchronously before returning, so
/// tests can drain the consumer side right after a write.
pub struct MemoryDocumentStore {
    collections: RwLock<HashMap<String, Collection>>,
    query_watchers: Mutex<HashMap<SubscriptionId, QueryWatcher>>,
    document_watchers: Mutex<HashMap<SubscriptionId, DocumentWatcher>>,
    next_id: AtomicU64,
    buffer_size: usize,
    /// Remaining reads that fail with `TransientRead`.
    failing_reads: AtomicUsize,
    /// Collection whose reads all fail while set.
    failing_collection: Mutex<Option<String>>,
    reads: AtomicU64,
}

impl MemoryDocumentStore {
    pub fn new() -> Self {
        Self::with_buffer_size(DEFAULT_BUFFER_SIZE)
    }

    /// Create a store whose watches buffer at most `buffer_size` events.
    pub fn with_buffer_size(buffer_size: usize) -> Self {
        Self {
            collections: RwLock::new(HashMap::new()),
            query_watchers: Mutex::new(HashMap::new()),
            document_watchers: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            buffer_size: buffer_size.max(1),
            failing_reads: AtomicUsize::new(0),
            failing_collection: Mutex::new(None),
            reads: AtomicU64::new(0),
        }
    }

    /// Make the next `n` one-shot reads (`get` / `query`) fail.
    pub fn fail_next_reads(&self, n: usize) {
        self.failing_reads.store(n, Ordering::SeqCst);
    }

    /// Make every one-shot read of `collection` fail until cleared with
    /// `None`.
    pub fn fail_collection_reads(&self, collection: Option<&str>) {
        *self.failing_collection.lock() = collection.map(str::to_string);
    }

    /// Number of one-shot reads served or failed so far.
    pub fn read_count(&self) -> u64 {
        self.reads.load(Ordering::SeqCst)
    }

    /// Number of watches that have not been cancelled or dropped.
    pub fn active_watch_count(&self) -> usize {
        let mut queries = self.query_watchers.lock();
        queries.retain(|_, w| !w.token.is_cancelled());
        let mut docs = self.document_watchers.lock();
        docs.retain(|_, w| !w.token.is_cancelled());
        queries.len() + docs.len()
    }

    /// Number of documents in a collection.
    pub fn collection_len(&self, collection: &str) -> usize {
        self.collections
            .read()
            .get(collection)
            .map_or(0, BTreeMap::len)
    }

    fn next_subscription_id(&self) -> SubscriptionId {
        SubscriptionId(self.next_id.fetch_add(1, Ordering::SeqCst))
    }

    fn begin_read(&self, collection: &str) -> Result<()> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        if self.failing_collection.lock().as_deref() == Some(collection) {
            return Err(FeedError::TransientRead(format!(
                "reads of {} are failing",
                collection
            )));
        }
        let failed = self
            .failing_reads
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failed {
            return Err(FeedError::TransientRead("injected read failure".into()));
        }
        Ok(())
    }

    fn read_document(&self, path: &DocPath) -> Option<Map<String, Value>> {
        self.collections
            .read()
            .get(&path.collection)
            .and_then(|c| c.get(&path.id))
            .cloned()
    }

    fn evaluate(&self, query: &Query) -> Vec<Document> {
        let collections = self.collections.read();
        let Some(collection) = collections.get(&query.collection) else {
            return Vec::new();
        };
        let docs: Vec<Document> = collection
            .iter()
            .map(|(id, data)| Document::new(id.clone(), data.clone()))
            .collect();
        query.evaluate(&docs)
    }

    /// Push the new state of `path` to every watch it can affect.
    fn notify(&self, path: &DocPath) {
        let snapshot = DocumentSnapshot {
            path: path.clone(),
            data: self.read_document(path),
        };

        {
            let mut watchers = self.document_watchers.lock();
            let mut to_remove = Vec::new();
            for (id, w) in watchers.iter().filter(|(_, w)| &w.path == path) {
                let event = WatchEvent::Snapshot(snapshot.clone());
                match deliver(&w.sender, &w.token, self.buffer_size, event) {
                    Delivery::Sent => {}
                    Delivery::Gone => to_remove.push(*id),
                    Delivery::Overflow => {
                        tracing::debug!(subscription = id.0, %path, "dropping slow document watch");
                        to_remove.push(*id);
                    }
                }
            }
            for id in to_remove {
                watchers.remove(&id);
            }
        }

        let mut watchers = self.query_watchers.lock();
        let mut to_remove = Vec::new();
        for (id, w) in watchers
            .iter_mut()
            .filter(|(_, w)| w.query.collection == path.collection)
        {
            let current = self.evaluate(&w.query);
            let changes = diff(&w.last, &current);
            if changes.is_empty() {
                continue;
            }
            match deliver(&w.sender, &w.token, self.buffer_size, WatchEvent::Snapshot(changes)) {
                Delivery::Sent => w.last = current,
                Delivery::Gone => to_remove.push(*id),
                Delivery::Overflow => {
                    tracing::debug!(subscription = id.0, collection = %path.collection, "dropping slow query watch");
                    to_remove.push(*id);
                }
            }
        }
        for id in to_remove {
            watchers.remove(&id);
        }
    }
}

impl Default for MemoryDocumentStore {
    fn default() -> Self {
        Self::new()
    }
}

impl RemoteDocumentStore for MemoryDocumentStore {
    fn get(&self, path: &DocPath) -> Result<DocumentSnapshot> {
        self.begin_read(&path.collection)?;
        Ok(DocumentSnapshot {
            path: path.clone(),
            data: self.read_document(path),
        })
    }

    fn set(&self, path: &DocPath, data: Map<String, Value>) -> Result<()> {
        self.collections
            .write()
            .entry(path.collection.clone())
            .or_default()
            .insert(path.id.clone(), data);
        self.notify(path);
        Ok(())
    }

    fn update(&self, path: &DocPath, patch: Map<String, Value>) -> Result<()> {
        {
            let mut collections = self.collections.write();
            let doc = collections
                .get_mut(&path.collection)
                .and_then(|c| c.get_mut(&path.id))
                .ok_or_else(|| FeedError::NotFound(path.clone()))?;
            doc.extend(patch);
        }
        self.notify(path);
        Ok(())
    }

    fn delete(&self, path: &DocPath) -> Result<()> {
        let removed = self
            .collections
            .write()
            .get_mut(&path.collection)
            .and_then(|c| c.remove(&path.id))
            .is_some();
        if removed {
            self.notify(path);
        }
        Ok(())
    }

    fn query(&self, query: &Query) -> Result<Vec<Document>> {
        self.begin_read(&query.collection)?;
        Ok(self.evaluate(query))
    }

    fn watch_query(&self, query: &Query) -> Result<QueryWatch> {
        let id = self.next_subscription_id();
        let (sender, receiver) = watch_channel(self.buffer_size);
        let token = CancelToken::new();

        // Register under the watcher lock so no write slips in between the
        // initial evaluation and registration.
        let mut watchers = self.query_watchers.lock();
        let current = self.evaluate(query);
        let initial = diff(&[], &current);
        sender
            .try_send(WatchEvent::Snapshot(initial))
            .map_err(|e| FeedError::TransientRead(format!("watch setup failed: {}", e)))?;
        watchers.insert(
            id,
            QueryWatcher {
                query: query.clone(),
                sender,
                token: token.clone(),
                last: current,
            },
        );

        Ok(Subscription::new(id, receiver, token))
    }

    fn watch_document(&self, path: &DocPath) -> Result<DocumentWatch> {
        let id = self.next_subscription_id();
        let (sender, receiver) = watch_channel(self.buffer_size);
        let token = CancelToken::new();

        let mut watchers = self.document_watchers.lock();
        let snapshot = DocumentSnapshot {
            path: path.clone(),
            data: self.read_document(path),
        };
        sender
            .try_send(WatchEvent::Snapshot(snapshot))
            .map_err(|e| FeedError::TransientRead(format!("watch setup failed: {}", e)))?;
        watchers.insert(
            id,
            DocumentWatcher {
                path: path.clone(),
                sender,
                token: token.clone(),
            },
        );

        Ok(Subscription::new(id, receiver, token))
    }
}
