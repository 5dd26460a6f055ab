//! Relay lifecycle observers.
//!
//! Observers see every connection and message event the router handles.
//! They exist for logging and metrics and cannot influence routing.

use sync_protocol::ProtocolError;
use sync_transport::ConnectionId;
use tracing::{info, warn};

/// Callbacks for relay lifecycle events.
///
/// Every method defaults to doing nothing.
pub trait RelayObserver: Send {
    /// A connection was accepted.
    fn on_connected(&mut self, _id: &ConnectionId, _remote_addr: Option<&str>) {}

    /// A connection went away.
    fn on_disconnected(&mut self, _id: &ConnectionId) {}

    /// A frame arrived from a connection.
    fn on_received(&mut self, _id: &ConnectionId, _frame: &str) {}

    /// A frame was written to a connection.
    fn on_sent(&mut self, _id: &ConnectionId, _frame: &str) {}

    /// A frame from a connection was rejected as malformed.
    fn on_rejected(&mut self, _id: &ConnectionId, _error: &ProtocolError) {}
}

/// Observer that discards every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopObserver;

impl RelayObserver for NoopObserver {}

/// Observer that writes lifecycle events to the `tracing` log.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingObserver;

impl RelayObserver for TracingObserver {
    fn on_connected(&mut self, id: &ConnectionId, remote_addr: Option<&str>) {
        info!("[{}] New connection from {}", id, remote_addr.unwrap_or("unknown"));
    }

    fn on_disconnected(&mut self, id: &ConnectionId) {
        info!("[{}] Disconnected.", id);
    }

    fn on_received(&mut self, id: &ConnectionId, frame: &str) {
        info!("-> [{}] {}", id, frame);
    }

    fn on_sent(&mut self, id: &ConnectionId, frame: &str) {
        info!("<- [{}] {}", id, frame);
    }

    fn on_rejected(&mut self, id: &ConnectionId, error: &ProtocolError) {
        warn!("[{}] Rejected frame: {}", id, error);
    }
}

/// Fan-out to several observers, in registration order.
#[derive(Default)]
pub struct Observers {
    observers: Vec<Box<dyn RelayObserver>>,
}

impl Observers {
    /// Create an empty fan-out.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an observer.
    #[must_use]
    pub fn with(mut self, observer: impl RelayObserver + 'static) -> Self {
        self.push(observer);
        self
    }

    /// Add an observer.
    pub fn push(&mut self, observer: impl RelayObserver + 'static) {
        self.observers.push(Box::new(observer));
    }

    /// Number of observers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.observers.len()
    }

    /// Check if there are no observers.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.observers.is_empty()
    }
}

impl RelayObserver for Observers {
    fn on_connected(&mut self, id: &ConnectionId, remote_addr: Option<&str>) {
        for observer in &mut self.observers {
            observer.on_connected(id, remote_addr);
        }
    }

    fn on_disconnected(&mut self, id: &ConnectionId) {
        for observer in &mut self.observers {
            observer.on_disconnected(id);
        }
    }

    fn on_received(&mut self, id: &ConnectionId, frame: &str) {
        for observer in &mut self.observers {
            observer.on_received(id, frame);
        }
    }

    fn on_sent(&mut self, id: &ConnectionId, frame: &str) {
        for observer in &mut self.observers {
            observer.on_sent(id, frame);
        }
    }

    fn on_rejected(&mut self, id: &ConnectionId, error: &ProtocolError) {
        for observer in &mut self.observers {
            observer.on_rejected(id, error);
        }
    }
}

impl std::fmt::Debug for Observers {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Observers")
            .field("len", &self.observers.len())
            .finish()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    /// Observer that records events as strings.
    #[derive(Clone, Default)]
    pub(crate) struct Recorder(pub Arc<Mutex<Vec<String>>>);

    impl Recorder {
        pub(crate) fn events(&self) -> Vec<String> {
            self.0.lock().unwrap().clone()
        }
    }

    impl RelayObserver for Recorder {
        fn on_connected(&mut self, id: &ConnectionId, _remote_addr: Option<&str>) {
            self.0.lock().unwrap().push(format!("connected {id}"));
        }

        fn on_disconnected(&mut self, id: &ConnectionId) {
            self.0.lock().unwrap().push(format!("disconnected {id}"));
        }

        fn on_received(&mut self, id: &ConnectionId, frame: &str) {
            self.0.lock().unwrap().push(format!("received {id} {frame}"));
        }

        fn on_sent(&mut self, id: &ConnectionId, frame: &str) {
            self.0.lock().unwrap().push(format!("sent {id} {frame}"));
        }

        fn on_rejected(&mut self, id: &ConnectionId, _error: &ProtocolError) {
            self.0.lock().unwrap().push(format!("rejected {id}"));
        }
    }

    #[test]
    fn test_fan_out_reaches_every_observer() {
        let first = Recorder::default();
        let second = Recorder::default();
        let mut observers = Observers::new()
            .with(first.clone())
            .with(second.clone())
            .with(NoopObserver);
        assert_eq!(observers.len(), 3);

        let id = ConnectionId::new("c-1");
        observers.on_connected(&id, Some("127.0.0.1:1"));
        observers.on_sent(&id, "{}");

        let expected = vec!["connected c-1".to_string(), "sent c-1 {}".to_string()];
        assert_eq!(first.events(), expected);
        assert_eq!(second.events(), expected);
    }
}
