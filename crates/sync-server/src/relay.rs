//! The relay event loop.
//!
//! One task owns the [`MessageRouter`]. Connection handlers talk to it over
//! a channel, so every room operation runs to completion before the next
//! one starts and no locking is needed.

use sync_core::{MessageRouter, RelayStats, RouteOutcome};
use sync_transport::ConnectionId;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::metrics;

enum Command {
    Connect {
        outbox: mpsc::UnboundedSender<String>,
        remote_addr: Option<String>,
        reply: oneshot::Sender<ConnectionId>,
    },
    Frame {
        id: ConnectionId,
        text: String,
    },
    Disconnect {
        id: ConnectionId,
    },
    Stats {
        reply: oneshot::Sender<RelayStats>,
    },
}

/// Handle to the relay event loop.
#[derive(Debug, Clone)]
pub struct RelayHandle {
    commands: mpsc::UnboundedSender<Command>,
}

impl RelayHandle {
    /// Start the event loop around `router`.
    ///
    /// The loop stops once every handle has been dropped.
    pub fn spawn(router: MessageRouter) -> (Self, JoinHandle<()>) {
        let (commands, rx) = mpsc::unbounded_channel();
        let task = tokio::spawn(run(router, rx));
        (Self { commands }, task)
    }

    /// Register a connection whose frames are written through `outbox`.
    ///
    /// Returns `None` if the loop has stopped.
    pub async fn connect(
        &self,
        outbox: mpsc::UnboundedSender<String>,
        remote_addr: Option<String>,
    ) -> Option<ConnectionId> {
        let (reply, id) = oneshot::channel();
        self.commands
            .send(Command::Connect {
                outbox,
                remote_addr,
                reply,
            })
            .ok()?;
        id.await.ok()
    }

    /// Queue an inbound frame from `id`.
    pub fn frame(&self, id: &ConnectionId, text: String) {
        let _ = self.commands.send(Command::Frame {
            id: id.clone(),
            text,
        });
    }

    /// Queue the departure of `id`.
    pub fn disconnect(&self, id: &ConnectionId) {
        let _ = self.commands.send(Command::Disconnect { id: id.clone() });
    }

    /// Get current relay statistics.
    pub async fn stats(&self) -> Option<RelayStats> {
        let (reply, stats) = oneshot::channel();
        self.commands.send(Command::Stats { reply }).ok()?;
        stats.await.ok()
    }
}

async fn run(mut router: MessageRouter, mut commands: mpsc::UnboundedReceiver<Command>) {
    debug!("Relay loop started");

    while let Some(command) = commands.recv().await {
        match command {
            Command::Connect {
                outbox,
                remote_addr,
                reply,
            } => {
                let id = router.connect(Box::new(outbox), remote_addr);
                if reply.send(id.clone()).is_err() {
                    // The handler went away before it learned its id.
                    router.disconnect(&id);
                }
            }
            Command::Frame { id, text } => {
                if let RouteOutcome::Dispatched(kind) = router.handle_frame(&id, &text) {
                    debug!(connection = %id, %kind, "Handled request");
                }
            }
            Command::Disconnect { id } => {
                router.disconnect(&id);
            }
            Command::Stats { reply } => {
                let _ = reply.send(router.stats());
                continue;
            }
        }

        metrics::set_active_rooms(router.stats().room_count);
    }

    info!("Relay loop stopped");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_loop_routes_frames() {
        let (relay, _task) = RelayHandle::spawn(MessageRouter::new());

        let (tx, mut rx) = mpsc::unbounded_channel();
        let id = relay.connect(tx, None).await.unwrap();
        assert_eq!(rx.recv().await.unwrap(), r#"{"type":"ready"}"#);

        relay.frame(&id, r#"{"type":"create_room"}"#.to_string());
        assert!(rx.recv().await.unwrap().contains("room_created"));

        let stats = relay.stats().await.unwrap();
        assert_eq!(stats.connection_count, 1);
        assert_eq!(stats.room_count, 1);

        relay.disconnect(&id);
        let stats = relay.stats().await.unwrap();
        assert_eq!(stats.connection_count, 0);
        assert_eq!(stats.room_count, 0);

        // The creator's room is torn down on the way out, then the registry
        // drops the outbox, which ends the writer side.
        assert!(rx.recv().await.unwrap().contains("destroy_room"));
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_loop_stops_with_last_handle() {
        let (relay, task) = RelayHandle::spawn(MessageRouter::new());
        drop(relay);
        task.await.unwrap();
    }
}
