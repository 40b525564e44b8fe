//! Live queries over store watches
//!
//! A [`LiveQuery`] is the consumer's end of a background task that keeps a
//! result set current. The task owns one or more store watches; each emission
//! from any watch updates that watch's slot in a [`FeedMerge`], and the merged
//! view is published as a [`LiveState`].
//!
//! Merging keeps the last snapshot of every source, so a re-emission from one
//! source never discards what the others delivered.

use std::collections::BTreeMap;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use futures_util::stream::SelectAll;
use futures_util::{Stream, StreamExt};
use listshare_store::{Document, WatchEvent, WatchStream};
use serde::de::DeserializeOwned;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::session::Session;

/// Current state of a live query.
#[derive(Debug, Clone, PartialEq)]
pub enum LiveState<T> {
    /// No complete result yet
    Loading,
    /// The full current result set, possibly empty
    Ready(Vec<T>),
    /// The query failed; nothing further will be delivered
    Failed(String),
}

impl<T> LiveState<T> {
    pub fn items(&self) -> Option<&[T]> {
        match self {
            LiveState::Ready(items) => Some(items),
            _ => None,
        }
    }

    pub fn is_loading(&self) -> bool {
        matches!(self, LiveState::Loading)
    }

    pub fn is_ready(&self) -> bool {
        matches!(self, LiveState::Ready(_))
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, LiveState::Failed(_))
    }
}

/// Publishing end of a live query. States are only delivered while the
/// owning session is active.
pub(crate) struct LiveSender<T> {
    tx: watch::Sender<LiveState<T>>,
    session: Session,
}

impl<T> LiveSender<T> {
    /// Publish `state`. `false` once the consumer is gone or the session has
    /// ended; the feed should stop then.
    pub(crate) fn send(&self, state: LiveState<T>) -> bool {
        self.session
            .while_active(|| self.tx.send(state).is_ok())
            .unwrap_or(false)
    }
}

/// Handle to a running live query. Dropping it (or calling
/// [`LiveQuery::cancel`]) stops the background task and releases every store
/// watch the task holds.
#[derive(Debug)]
pub struct LiveQuery<T> {
    rx: watch::Receiver<LiveState<T>>,
    task: JoinHandle<()>,
}

impl<T> LiveQuery<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// Run `feed` in the background under `session`.
    pub(crate) fn spawn<F, Fut>(session: &Session, feed: F) -> Self
    where
        F: FnOnce(LiveSender<T>) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let (tx, rx) = watch::channel(LiveState::Loading);
        let sender = LiveSender {
            tx,
            session: session.clone(),
        };
        let task = tokio::spawn(feed(sender));
        session.register(task.abort_handle());
        Self { rx, task }
    }

    /// Snapshot of the current state.
    pub fn state(&self) -> LiveState<T> {
        self.rx.borrow().clone()
    }

    /// Wait for the next state change. `None` once the feed has stopped and
    /// every state it published has been observed.
    pub async fn changed(&mut self) -> Option<LiveState<T>> {
        self.rx.changed().await.ok()?;
        Some(self.rx.borrow_and_update().clone())
    }

    /// Wait until the state satisfies `pred`, starting with the current one.
    pub async fn wait_for<P>(&mut self, mut pred: P) -> Option<LiveState<T>>
    where
        P: FnMut(&LiveState<T>) -> bool,
    {
        loop {
            {
                let state = self.rx.borrow_and_update();
                if pred(&state) {
                    return Some(state.clone());
                }
            }
            if self.rx.changed().await.is_err() {
                let state = self.rx.borrow();
                return pred(&state).then(|| state.clone());
            }
        }
    }

    /// Wait for the next `Ready` result set. `None` if the query fails or
    /// stops first.
    pub async fn ready(&mut self) -> Option<Vec<T>> {
        match self.wait_for(|s| !s.is_loading()).await? {
            LiveState::Ready(items) => Some(items),
            _ => None,
        }
    }

    /// Stop the query.
    pub fn cancel(self) {}
}

impl<T> Drop for LiveQuery<T> {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Items that carry a stable identity across snapshots.
pub trait Keyed {
    fn key(&self) -> &str;
}

/// Reducer over several source feeds.
///
/// Each source owns one slot holding its last snapshot. The merged view is the
/// union of all slots deduplicated by key, available once every source has
/// delivered at least once. Its content depends only on the last snapshot of
/// each source, never on the order in which sources emitted.
#[derive(Debug, Clone)]
pub struct FeedMerge<T> {
    slots: Vec<Option<Vec<T>>>,
}

impl<T: Keyed + Clone> FeedMerge<T> {
    pub fn new(sources: usize) -> Self {
        Self {
            slots: vec![None; sources],
        }
    }

    /// Replace the snapshot of `source`.
    pub fn apply(&mut self, source: usize, items: Vec<T>) {
        if let Some(slot) = self.slots.get_mut(source) {
            *slot = Some(items);
        }
    }

    pub fn is_complete(&self) -> bool {
        self.slots.iter().all(Option::is_some)
    }

    /// The merged view, ordered by key. `None` until every source delivered.
    pub fn merged(&self) -> Option<Vec<T>> {
        if !self.is_complete() {
            return None;
        }
        let mut by_key = BTreeMap::new();
        for item in self.slots.iter().flatten().flatten() {
            by_key.entry(item.key().to_string()).or_insert_with(|| item.clone());
        }
        Some(by_key.into_values().collect())
    }
}

/// A watch stream whose events are tagged with the source index.
pub(crate) struct TaggedWatch {
    source: usize,
    inner: WatchStream,
}

impl Stream for TaggedWatch {
    type Item = (usize, WatchEvent);

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let source = self.source;
        self.inner
            .poll_next_unpin(cx)
            .map(|event| event.map(|e| (source, e)))
    }
}

pub(crate) type TaggedWatches = SelectAll<TaggedWatch>;

pub(crate) fn tag_watches(streams: Vec<WatchStream>) -> TaggedWatches {
    futures_util::stream::select_all(
        streams
            .into_iter()
            .enumerate()
            .map(|(source, inner)| TaggedWatch { source, inner }),
    )
}

/// Decode a snapshot, skipping documents that do not fit the model.
pub(crate) fn decode_all<T: DeserializeOwned>(collection: &str, docs: &[Document]) -> Vec<T> {
    docs.iter()
        .filter_map(|doc| match doc.decode() {
            Ok(item) => Some(item),
            Err(e) => {
                warn!(collection, id = %doc.id, error = %e, "skipping malformed document");
                None
            }
        })
        .collect()
}

/// Merge state for one generation of watches.
pub(crate) struct MergedFeed<T> {
    collection: &'static str,
    merge: FeedMerge<T>,
    finish: fn(&mut Vec<T>),
}

impl<T> MergedFeed<T>
where
    T: Keyed + Clone + DeserializeOwned,
{
    pub(crate) fn new(collection: &'static str, sources: usize, finish: fn(&mut Vec<T>)) -> Self {
        Self {
            collection,
            merge: FeedMerge::new(sources),
            finish,
        }
    }

    /// Fold one watch event in and return the state to publish, if any.
    pub(crate) fn handle(&mut self, source: usize, event: WatchEvent) -> Option<LiveState<T>> {
        match event {
            WatchEvent::Snapshot(docs) => {
                self.merge.apply(source, decode_all(self.collection, &docs));
                let mut items = self.merge.merged()?;
                (self.finish)(&mut items);
                Some(LiveState::Ready(items))
            }
            WatchEvent::Error(e) => {
                warn!(collection = self.collection, source, error = %e, "live query failed");
                Some(LiveState::Failed(e.to_string()))
            }
        }
    }
}

/// Drive a fixed set of watches into `tx` until one fails or the consumer
/// goes away.
pub(crate) async fn run_merged<T>(
    streams: Vec<WatchStream>,
    mut feed: MergedFeed<T>,
    tx: LiveSender<T>,
) where
    T: Keyed + Clone + DeserializeOwned,
{
    let mut events = tag_watches(streams);
    while let Some((source, event)) = events.next().await {
        if let Some(state) = feed.handle(source, event) {
            let failed = state.is_failed();
            if !tx.send(state) || failed {
                return;
            }
        }
    }
    debug!(collection = feed.collection, "live query sources closed");
    tx.send(LiveState::Failed("live query closed by the store".to_string()));
}
