// ── Reactive entity streams ──
//
// Watch-backed subscriptions to one collection of the DataStore. Every
// mutation publishes a whole new snapshot; subscribers never see a
// half-applied transition.

mod filter;

use std::sync::Arc;

use tokio::sync::watch;
use tokio_stream::wrappers::WatchStream;

use crate::model::{ImageTransfer, Observation};

pub use filter::{ObservationFilter, TransferFilter};

/// Immutable view of a collection at one version.
pub type Snapshot<T> = Arc<Vec<Arc<T>>>;

/// A subscription to one entity collection.
pub struct EntityStream<T: Send + Sync + 'static> {
    current: Snapshot<T>,
    receiver: watch::Receiver<Snapshot<T>>,
}

impl<T: Send + Sync + 'static> EntityStream<T> {
    pub(crate) fn new(receiver: watch::Receiver<Snapshot<T>>) -> Self {
        let current = receiver.borrow().clone();
        Self { current, receiver }
    }

    /// Snapshot held by this subscriber: the one taken at subscription or
    /// returned by the last [`changed`](Self::changed) / [`wait_for`](Self::wait_for).
    pub fn current(&self) -> &Snapshot<T> {
        &self.current
    }

    /// Latest published snapshot, without marking it seen.
    pub fn latest(&self) -> Snapshot<T> {
        self.receiver.borrow().clone()
    }

    /// Wait for the next mutation. `None` once the store is dropped.
    pub async fn changed(&mut self) -> Option<Snapshot<T>> {
        self.receiver.changed().await.ok()?;
        Some(self.take_latest())
    }

    /// Wait until some snapshot satisfies `ready`, checking the latest one
    /// first. `None` if the store is dropped before that happens.
    pub async fn wait_for(
        &mut self,
        mut ready: impl FnMut(&[Arc<T>]) -> bool,
    ) -> Option<Snapshot<T>> {
        let snap = self.take_latest();
        if ready(&snap) {
            return Some(snap);
        }
        loop {
            let snap = self.changed().await?;
            if ready(&snap) {
                return Some(snap);
            }
        }
    }

    /// Every future snapshot as a `Stream`, starting with the latest.
    pub fn into_stream(self) -> WatchStream<Snapshot<T>> {
        WatchStream::new(self.receiver)
    }

    fn take_latest(&mut self) -> Snapshot<T> {
        let snap = self.receiver.borrow_and_update().clone();
        self.current = Arc::clone(&snap);
        snap
    }
}

impl EntityStream<ImageTransfer> {
    /// Transfers in the held snapshot that match `filter`.
    pub fn select(&self, filter: &TransferFilter) -> Vec<Arc<ImageTransfer>> {
        self.current
            .iter()
            .filter(|t| filter.matches(t))
            .map(Arc::clone)
            .collect()
    }
}

impl EntityStream<Observation> {
    /// Observations in the held snapshot that match `filter`.
    pub fn select(&self, filter: &ObservationFilter) -> Vec<Arc<Observation>> {
        self.current
            .iter()
            .filter(|o| filter.matches(o))
            .map(Arc::clone)
            .collect()
    }
}
