//! Event bus for run events, backed by a tokio broadcast channel

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::types::EventEnvelope;

const DEFAULT_CAPACITY: usize = 256;

/// Fan-out bus shared by the coordinator and anyone following its runs
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<EventEnvelope>,
    published: Arc<AtomicUsize>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender,
            published: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Publish an event to all subscribers.
    ///
    /// Returns how many subscribers received it; with no subscribers the
    /// event is dropped and 0 is returned.
    pub fn publish(&self, envelope: EventEnvelope) -> usize {
        self.published.fetch_add(1, Ordering::Relaxed);
        self.sender.send(envelope).unwrap_or(0)
    }

    /// Receive every event published from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<EventEnvelope> {
        self.sender.subscribe()
    }

    /// Receive only the events of one run.
    pub fn subscribe_run(&self, run_id: Uuid) -> RunSubscription {
        RunSubscription {
            run_id: Some(run_id),
            receiver: self.sender.subscribe(),
            missed: 0,
        }
    }

    /// Receive the events of every run, counting lag like [`subscribe_run`](Self::subscribe_run).
    pub fn subscribe_all(&self) -> RunSubscription {
        RunSubscription {
            run_id: None,
            receiver: self.sender.subscribe(),
            missed: 0,
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }

    pub fn event_count(&self) -> usize {
        self.published.load(Ordering::Relaxed)
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("subscriber_count", &self.subscriber_count())
            .field("event_count", &self.event_count())
            .finish()
    }
}

/// Receiver filtered to a single run, or to none with [`EventBus::subscribe_all`].
pub struct RunSubscription {
    run_id: Option<Uuid>,
    receiver: broadcast::Receiver<EventEnvelope>,
    missed: u64,
}

impl RunSubscription {
    /// Next event of this run, or `None` once the bus is gone.
    ///
    /// Events lost to a slow receiver are counted in [`missed`](Self::missed)
    /// rather than ending the subscription.
    pub async fn next(&mut self) -> Option<EventEnvelope> {
        loop {
            match self.receiver.recv().await {
                Ok(envelope) if self.wants(&envelope) => return Some(envelope),
                Ok(_) => continue,
                Err(broadcast::error::RecvError::Lagged(n)) => self.missed += n,
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    /// Drain whatever is already buffered without waiting.
    pub fn drain(&mut self) -> Vec<EventEnvelope> {
        let mut drained = Vec::new();
        loop {
            match self.receiver.try_recv() {
                Ok(envelope) if self.wants(&envelope) => drained.push(envelope),
                Ok(_) => {}
                Err(broadcast::error::TryRecvError::Lagged(n)) => self.missed += n,
                Err(_) => return drained,
            }
        }
    }

    pub fn missed(&self) -> u64 {
        self.missed
    }

    fn wants(&self, envelope: &EventEnvelope) -> bool {
        self.run_id.map_or(true, |id| envelope.event.run_id() == id)
    }
}
