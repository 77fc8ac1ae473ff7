// ── Engine event bus ──

use std::sync::Arc;

use tokio::sync::broadcast;

use crate::model::EngineEvent;

/// Fan-out of engine events. Sending never blocks and never fails the
/// caller; with no subscribers the event is dropped.
#[derive(Clone)]
pub(crate) struct EventBus {
    tx: broadcast::Sender<Arc<EngineEvent>>,
}

impl EventBus {
    pub(crate) fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub(crate) fn subscribe(&self) -> broadcast::Receiver<Arc<EngineEvent>> {
        self.tx.subscribe()
    }

    pub(crate) fn emit(&self, event: EngineEvent) {
        let _ = self.tx.send(Arc::new(event));
    }
}
