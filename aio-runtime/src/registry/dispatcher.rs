//! Per-service watch fan-out: a broadcast of change events that new
//! subscribers can join at any time, with a bootstrap snapshot taken
//! before the subscription races against concurrent writers.

use aio_core::{Instance, WatchEvent};
use tokio::sync::broadcast;

/// A single fan-out event: which service it belongs to (by name, since
/// `Watch` requests are keyed by service name) plus the event itself.
#[derive(Debug, Clone)]
pub struct Envelope {
    pub service_name: String,
    pub event: WatchEvent<Instance>,
}

/// Broadcasts instance lifecycle events to any number of `Watch`
/// subscribers. Lagging subscribers drop old events rather than
/// blocking writers; such subscribers are expected to reconnect and
/// tolerate a re-bootstrap.
#[derive(Clone)]
pub struct Dispatcher {
    tx: broadcast::Sender<Envelope>,
}

impl Dispatcher {
    pub fn new(capacity: usize) -> Self {
        let (tx, _rx) = broadcast::channel(capacity);
        Dispatcher { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Envelope> {
        self.tx.subscribe()
    }

    /// Publishes an event; a lack of subscribers is not an error.
    pub fn publish(&self, service_name: impl Into<String>, event: WatchEvent<Instance>) {
        let _ = self.tx.send(Envelope {
            service_name: service_name.into(),
            event,
        });
    }
}

impl Default for Dispatcher {
    fn default() -> Self {
        Dispatcher::new(1024)
    }
}
