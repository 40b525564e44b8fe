#![allow(dead_code)]

use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use listshare::prelude::*;
use listshare::store::{Document, FieldOps, Precondition, Query, StoreError, WatchStream};

pub const ALICE: &str = "alice@x.com";
pub const BOB: &str = "bob@x.com";
pub const CAROL: &str = "carol@x.com";

pub struct Fixture {
    pub store: MemoryStore,
    pub app: ListShare,
    pub alice: Session,
    pub bob: Session,
    pub carol: Session,
}

pub fn setup() -> Fixture {
    let store = MemoryStore::new();
    fixture(store.clone(), Arc::new(store))
}

/// Like [`setup`], with the app talking to the store through an
/// [`InterceptStore`]. `Fixture::store` still reaches the documents directly.
pub fn setup_intercepted() -> (Fixture, InterceptStore) {
    let store = MemoryStore::new();
    let intercept = InterceptStore::new(store.clone());
    (fixture(store, Arc::new(intercept.clone())), intercept)
}

fn fixture(store: MemoryStore, backend: Arc<dyn DocumentStore>) -> Fixture {
    let app = ListShare::new_with_options(
        backend,
        ClientOptions::default().with_max_write_retries(3),
    );
    Fixture {
        store,
        app,
        alice: Session::new(Principal::new("u-alice", ALICE)),
        bob: Session::new(Principal::new("u-bob", BOB)),
        carol: Session::new(Principal::new("u-carol", CAROL)),
    }
}

/// Fail the test instead of hanging when a live query never gets there.
pub async fn within<F: Future>(fut: F) -> F::Output {
    tokio::time::timeout(Duration::from_secs(5), fut)
        .await
        .expect("timed out waiting for live query")
}

/// Wait until the live query is `Ready` with exactly `ids` (in any order).
pub async fn wait_for_ids<T, K>(query: &mut LiveQuery<T>, key: K, ids: &[&str]) -> Vec<T>
where
    T: Clone + Send + Sync + 'static,
    K: Fn(&T) -> &str,
{
    let mut want: Vec<&str> = ids.to_vec();
    want.sort_unstable();
    let state = within(query.wait_for(|state| match state {
        LiveState::Ready(items) => {
            let mut got: Vec<&str> = items.iter().map(&key).collect();
            got.sort_unstable();
            got == want
        }
        _ => false,
    }))
    .await
    .expect("live query stopped");
    match state {
        LiveState::Ready(items) => items,
        _ => unreachable!(),
    }
}

pub async fn wait_for_watchers(store: &MemoryStore, collection: &str, count: usize) {
    within(async {
        while store.watcher_count(collection) != count {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
}

/// Wraps a [`MemoryStore`] to stage what another client would do: a write
/// landing between a read and the update built from it, or a collection that
/// refuses inserts.
#[derive(Clone)]
pub struct InterceptStore {
    inner: MemoryStore,
    state: Arc<InterceptState>,
}

#[derive(Default)]
struct InterceptState {
    interleaved: Mutex<Vec<(String, String, FieldOps)>>,
    failing_creates: Mutex<Option<String>>,
    precondition_failures: AtomicUsize,
}

impl InterceptStore {
    pub fn new(inner: MemoryStore) -> Self {
        Self {
            inner,
            state: Arc::default(),
        }
    }

    /// Commit `ops` to `collection/id` right before the next update of that
    /// document goes through.
    pub fn interleave(&self, collection: &str, id: &str, ops: FieldOps) {
        self.state
            .interleaved
            .lock()
            .unwrap()
            .push((collection.to_string(), id.to_string(), ops));
    }

    /// Make every later `create` in `collection` fail as unavailable.
    pub fn fail_creates_in(&self, collection: &str) {
        *self.state.failing_creates.lock().unwrap() = Some(collection.to_string());
    }

    /// Updates rejected because the document changed since it was read.
    pub fn precondition_failures(&self) -> usize {
        self.state.precondition_failures.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DocumentStore for InterceptStore {
    async fn get(&self, collection: &str, id: &str) -> std::result::Result<Document, StoreError> {
        self.inner.get(collection, id).await
    }

    async fn create(&self, collection: &str, ops: FieldOps) -> std::result::Result<Document, StoreError> {
        if self.state.failing_creates.lock().unwrap().as_deref() == Some(collection) {
            return Err(StoreError::Unavailable(format!("{collection} is read-only")));
        }
        self.inner.create(collection, ops).await
    }

    async fn update(
        &self,
        collection: &str,
        id: &str,
        ops: FieldOps,
        precondition: Option<Precondition>,
    ) -> std::result::Result<Document, StoreError> {
        let staged = {
            let mut interleaved = self.state.interleaved.lock().unwrap();
            interleaved
                .iter()
                .position(|(c, i, _)| c == collection && i == id)
                .map(|pos| interleaved.remove(pos).2)
        };
        if let Some(competing) = staged {
            self.inner.update(collection, id, competing, None).await?;
        }
        let result = self.inner.update(collection, id, ops, precondition).await;
        if let Err(StoreError::PreconditionFailed { .. }) = &result {
            self.state.precondition_failures.fetch_add(1, Ordering::SeqCst);
        }
        result
    }

    async fn delete(&self, collection: &str, id: &str) -> std::result::Result<(), StoreError> {
        self.inner.delete(collection, id).await
    }

    async fn query(&self, collection: &str, query: &Query) -> std::result::Result<Vec<Document>, StoreError> {
        self.inner.query(collection, query).await
    }

    async fn watch(&self, collection: &str, query: Query) -> std::result::Result<WatchStream, StoreError> {
        self.inner.watch(collection, query).await
    }
}
