//! Event bus on top of a tokio broadcast channel

use tokio::sync::broadcast;

use crate::types::EventEnvelope;

/// Envelopes a slow subscriber may fall behind before it starts lagging
const CAPACITY: usize = 256;

/// Fan-out of build events to the progress printer and any other listener.
///
/// Publishing never blocks a build; with no subscriber the envelope is dropped.
#[derive(Debug, Clone)]
pub struct EventBus {
    sender: broadcast::Sender<EventEnvelope>,
}

impl EventBus {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(CAPACITY);
        Self { sender }
    }

    pub fn publish(&self, envelope: EventEnvelope) {
        let _ = self.sender.send(envelope);
    }

    /// Receive envelopes published from now on
    pub fn subscribe(&self) -> broadcast::Receiver<EventEnvelope> {
        self.sender.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}
