//! Process-local document store with synchronous live watches.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use log::{debug, trace};
use serde_json::Map;

use crate::document::{Document, FieldOps, Precondition};
use crate::error::StoreError;
use crate::query::Query;
use crate::watch::{WatchEvent, WatchSender, WatchStream};
use crate::DocumentStore;

struct Watcher {
    collection: String,
    query: Query,
    tx: WatchSender,
    last: Option<Vec<Document>>,
}

#[derive(Default)]
struct Inner {
    collections: HashMap<String, BTreeMap<String, Document>>,
    watchers: Vec<Watcher>,
    offline: bool,
    last_commit: Option<DateTime<Utc>>,
}

impl Inner {
    fn check_online(&self) -> Result<(), StoreError> {
        if self.offline {
            Err(StoreError::Unavailable("memory store is offline".to_string()))
        } else {
            Ok(())
        }
    }

    /// Commit times are strictly increasing so server timestamps order writes.
    fn commit_time(&mut self) -> DateTime<Utc> {
        let now = Utc::now();
        let now = match self.last_commit {
            Some(last) if now <= last => last + Duration::microseconds(1),
            _ => now,
        };
        self.last_commit = Some(now);
        now
    }

    fn snapshot(&self, collection: &str, query: &Query) -> Vec<Document> {
        let mut docs: Vec<Document> = self
            .collections
            .get(collection)
            .map(|docs| {
                docs.values()
                    .filter(|doc| query.matches(&doc.fields))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        if let Some(limit) = query.limit {
            docs.truncate(limit);
        }
        docs
    }

    /// Push a fresh snapshot to every watcher of `collection` whose result
    /// set changed. Watchers whose stream was dropped are pruned.
    fn notify(&mut self, collection: &str) {
        let mut watchers = std::mem::take(&mut self.watchers);
        watchers.retain_mut(|watcher| {
            if watcher.collection != collection {
                return !watcher.tx.is_closed();
            }
            let snapshot = self.snapshot(collection, &watcher.query);
            if watcher.last.as_ref() == Some(&snapshot) {
                return !watcher.tx.is_closed();
            }
            watcher.last = Some(snapshot.clone());
            watcher.tx.send(WatchEvent::Snapshot(snapshot)).is_ok()
        });
        trace!(
            "notified watchers of '{}', {} watchers remain",
            collection,
            watchers.len()
        );
        self.watchers = watchers;
    }
}

/// In-memory [`DocumentStore`]. Cloning shares the same data.
///
/// Watches are delivered at write time, in write order, before the write
/// call returns.
#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Mutex<Inner>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Simulate losing (or regaining) connectivity. While offline every call
    /// fails with [`StoreError::Unavailable`].
    pub fn set_offline(&self, offline: bool) {
        debug!("memory store offline={}", offline);
        self.lock().offline = offline;
    }

    /// Terminate every open watch on `collection` with an error event.
    pub fn break_watches(&self, collection: &str, message: &str) {
        let mut inner = self.lock();
        inner.watchers.retain(|watcher| {
            if watcher.collection == collection {
                let _ = watcher
                    .tx
                    .send(WatchEvent::Error(StoreError::Unavailable(message.to_string())));
                false
            } else {
                true
            }
        });
    }

    /// Number of documents currently stored in `collection`.
    pub fn len(&self, collection: &str) -> usize {
        self.lock()
            .collections
            .get(collection)
            .map(BTreeMap::len)
            .unwrap_or(0)
    }

    pub fn is_empty(&self, collection: &str) -> bool {
        self.len(collection) == 0
    }

    /// Number of watches still attached to `collection`.
    pub fn watcher_count(&self, collection: &str) -> usize {
        let mut inner = self.lock();
        inner.watchers.retain(|watcher| !watcher.tx.is_closed());
        inner
            .watchers
            .iter()
            .filter(|watcher| watcher.collection == collection)
            .count()
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn get(&self, collection: &str, id: &str) -> Result<Document, StoreError> {
        let inner = self.lock();
        inner.check_online()?;
        inner
            .collections
            .get(collection)
            .and_then(|docs| docs.get(id))
            .cloned()
            .ok_or_else(|| StoreError::not_found(collection, id))
    }

    async fn create(&self, collection: &str, ops: FieldOps) -> Result<Document, StoreError> {
        let mut inner = self.lock();
        inner.check_online()?;
        let now = inner.commit_time();

        let mut fields = Map::new();
        ops.apply(&mut fields, now);
        let doc = Document {
            id: uuid::Uuid::new_v4().to_string(),
            revision: 1,
            fields,
        };
        debug!("created {}/{}", collection, doc.id);

        inner
            .collections
            .entry(collection.to_string())
            .or_default()
            .insert(doc.id.clone(), doc.clone());
        inner.notify(collection);
        Ok(doc)
    }

    async fn update(
        &self,
        collection: &str,
        id: &str,
        ops: FieldOps,
        precondition: Option<Precondition>,
    ) -> Result<Document, StoreError> {
        let mut inner = self.lock();
        inner.check_online()?;
        let now = inner.commit_time();

        let docs = inner.collections.entry(collection.to_string()).or_default();
        let current = docs.get(id);
        if current.is_none() {
            return Err(StoreError::not_found(collection, id));
        }
        if let Some(precondition) = precondition {
            if !precondition.holds(current) {
                debug!("precondition {:?} failed on {}/{}", precondition, collection, id);
                return Err(StoreError::precondition_failed(collection, id));
            }
        }

        let doc = docs
            .get_mut(id)
            .ok_or_else(|| StoreError::not_found(collection, id))?;
        ops.apply(&mut doc.fields, now);
        doc.revision += 1;
        let updated = doc.clone();
        debug!("updated {}/{} to revision {}", collection, id, updated.revision);

        inner.notify(collection);
        Ok(updated)
    }

    async fn delete(&self, collection: &str, id: &str) -> Result<(), StoreError> {
        let mut inner = self.lock();
        inner.check_online()?;
        let removed = inner
            .collections
            .get_mut(collection)
            .and_then(|docs| docs.remove(id));
        if removed.is_none() {
            return Err(StoreError::not_found(collection, id));
        }
        debug!("deleted {}/{}", collection, id);
        inner.notify(collection);
        Ok(())
    }

    async fn query(&self, collection: &str, query: &Query) -> Result<Vec<Document>, StoreError> {
        query.validate()?;
        let inner = self.lock();
        inner.check_online()?;
        Ok(inner.snapshot(collection, query))
    }

    async fn watch(&self, collection: &str, query: Query) -> Result<WatchStream, StoreError> {
        query.validate()?;
        let mut inner = self.lock();
        inner.check_online()?;

        let (tx, stream) = WatchStream::channel();
        let snapshot = inner.snapshot(collection, &query);
        let _ = tx.send(WatchEvent::Snapshot(snapshot.clone()));
        inner.watchers.push(Watcher {
            collection: collection.to_string(),
            query,
            tx,
            last: Some(snapshot),
        });
        debug!("watch opened on '{}'", collection);
        Ok(stream)
    }
}
