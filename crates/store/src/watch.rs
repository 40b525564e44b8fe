use std::pin::Pin;
use std::task::{Context, Poll};

use futures_util::Stream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::document::Document;
use crate::error::StoreError;

/// One delivery on a live watch.
#[derive(Debug, Clone, PartialEq)]
pub enum WatchEvent {
    /// The full current result set of the watched query
    Snapshot(Vec<Document>),
    /// The watch failed and will deliver nothing further
    Error(StoreError),
}

/// Sending half handed to whatever produces the events.
pub type WatchSender = mpsc::UnboundedSender<WatchEvent>;

/// A live subscription to a query. Dropping it releases the subscription
/// and stops any background task feeding it.
pub struct WatchStream {
    rx: mpsc::UnboundedReceiver<WatchEvent>,
    task: Option<JoinHandle<()>>,
}

impl WatchStream {
    /// Create a connected sender/stream pair.
    pub fn channel() -> (WatchSender, WatchStream) {
        let (tx, rx) = mpsc::unbounded_channel();
        (tx, WatchStream { rx, task: None })
    }

    /// Tie a producer task to the stream's lifetime.
    pub fn with_task(mut self, task: JoinHandle<()>) -> Self {
        self.task = Some(task);
        self
    }

    /// Wait for the next event. `None` once the producer is gone.
    pub async fn next_event(&mut self) -> Option<WatchEvent> {
        self.rx.recv().await
    }
}

impl Stream for WatchStream {
    type Item = WatchEvent;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx)
    }
}

impl Drop for WatchStream {
    fn drop(&mut self) {
        self.rx.close();
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

impl std::fmt::Debug for WatchStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WatchStream")
            .field("has_task", &self.task.is_some())
            .finish()
    }
}
