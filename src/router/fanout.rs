//! Broadcast router implementation
//!
//! Fans appended entries out to every live viewer through per-viewer bounded
//! queues. The append path only ever does a serialize-once plus a
//! non-blocking `try_send` per viewer; socket writes happen in each viewer's
//! own writer task. A viewer that cannot keep up is scheduled for
//! disconnection through the kick channel and never slows a producer down.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::sync::RwLock;

use crate::protocol::ServerMessage;
use crate::registry::TranscriptEntry;

use super::event::OutboundItem;

/// Fan-out hub for all subscribed viewers
///
/// Thread-safe via `RwLock`; publishing takes the read lock, so appends to
/// different rooms fan out concurrently.
pub struct BroadcastRouter {
    /// Per-viewer outbound queues, keyed by connection id
    viewers: RwLock<HashMap<u64, mpsc::Sender<OutboundItem>>>,

    /// Connection ids that must be torn down (queue overflow or gone)
    kick_tx: mpsc::UnboundedSender<u64>,
}

impl BroadcastRouter {
    /// Create a router and the receiving end of its kick channel
    ///
    /// The caller owns the receiver and is responsible for turning each id
    /// it yields into a real disconnection.
    pub fn new() -> (Self, mpsc::UnboundedReceiver<u64>) {
        let (kick_tx, kick_rx) = mpsc::unbounded_channel();
        (
            Self {
                viewers: RwLock::new(HashMap::new()),
                kick_tx,
            },
            kick_rx,
        )
    }

    /// Add a viewer's queue to the fan-out set
    ///
    /// Entries published from this moment on are enqueued for the viewer;
    /// the writer task holds them until the join snapshot has gone out.
    pub async fn subscribe(&self, viewer_id: u64, tx: mpsc::Sender<OutboundItem>) {
        let mut viewers = self.viewers.write().await;
        viewers.insert(viewer_id, tx);
        tracing::info!(viewer_id, viewers = viewers.len(), "Viewer subscribed");
    }

    /// Remove a viewer from the fan-out set
    ///
    /// Idempotent; returns whether the viewer was present.
    pub async fn unsubscribe(&self, viewer_id: u64) -> bool {
        let mut viewers = self.viewers.write().await;
        let removed = viewers.remove(&viewer_id).is_some();
        if removed {
            tracing::debug!(viewer_id, viewers = viewers.len(), "Viewer unsubscribed");
        }
        removed
    }

    /// Fan one appended entry out to every subscribed viewer
    ///
    /// Called inside the owning room's critical section, so per-room enqueue
    /// order always equals append order. A full queue marks that viewer for
    /// disconnection; a closed queue is cleaned up the same way. The append
    /// itself can never fail or block here.
    pub async fn publish(&self, entry: &TranscriptEntry) {
        let payload = ServerMessage::Entry(entry.clone()).encode();
        let room: Arc<str> = Arc::from(entry.room.as_str());

        let viewers = self.viewers.read().await;
        for (&id, tx) in viewers.iter() {
            let item = OutboundItem::Entry {
                room: Arc::clone(&room),
                sequence: entry.sequence,
                payload: payload.clone(),
            };
            match tx.try_send(item) {
                Ok(()) => {}
                Err(TrySendError::Full(_)) => {
                    tracing::warn!(
                        viewer_id = id,
                        room = %entry.room,
                        sequence = entry.sequence,
                        "Viewer queue full, scheduling disconnect"
                    );
                    let _ = self.kick_tx.send(id);
                }
                Err(TrySendError::Closed(_)) => {
                    let _ = self.kick_tx.send(id);
                }
            }
        }
    }

    /// Fan an ephemeral message (interim preview, room status) out to every
    /// subscribed viewer
    ///
    /// A full queue drops the message for that viewer rather than kicking it;
    /// if the viewer is genuinely stalled the next durable entry will kick it.
    pub async fn publish_ephemeral(&self, msg: &ServerMessage) {
        let payload = msg.encode();

        let viewers = self.viewers.read().await;
        for (&id, tx) in viewers.iter() {
            match tx.try_send(OutboundItem::Direct(payload.clone())) {
                Ok(()) => {}
                Err(TrySendError::Full(_)) => {
                    tracing::debug!(viewer_id = id, "Viewer queue full, dropped ephemeral message");
                }
                Err(TrySendError::Closed(_)) => {
                    let _ = self.kick_tx.send(id);
                }
            }
        }
    }

    /// Number of currently subscribed viewers
    pub async fn viewer_count(&self) -> usize {
        self.viewers.read().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::RoomPresence;
    use crate::registry::SourceType;

    fn entry(room: &str, text: &str, sequence: u64) -> TranscriptEntry {
        TranscriptEntry::new(room, text, 1000.0, SourceType::Agent, sequence)
    }

    #[tokio::test]
    async fn test_publish_reaches_all_viewers() {
        let (router, _kick_rx) = BroadcastRouter::new();
        let (tx_a, mut rx_a) = mpsc::channel(8);
        let (tx_b, mut rx_b) = mpsc::channel(8);
        router.subscribe(1, tx_a).await;
        router.subscribe(2, tx_b).await;
        assert_eq!(router.viewer_count().await, 2);

        router.publish(&entry("Hall A", "Welcome", 0)).await;

        for rx in [&mut rx_a, &mut rx_b] {
            match rx.recv().await.unwrap() {
                OutboundItem::Entry {
                    room,
                    sequence,
                    payload,
                } => {
                    assert_eq!(&*room, "Hall A");
                    assert_eq!(sequence, 0);
                    assert!(payload.as_str().contains("\"Welcome\""));
                }
                other => panic!("unexpected item: {:?}", other),
            }
        }
    }

    #[tokio::test]
    async fn test_slow_viewer_is_kicked_others_unaffected() {
        let (router, mut kick_rx) = BroadcastRouter::new();
        let (stalled_tx, _stalled_rx) = mpsc::channel(1);
        let (healthy_tx, mut healthy_rx) = mpsc::channel(16);
        router.subscribe(7, stalled_tx).await;
        router.subscribe(8, healthy_tx).await;

        // First publish fills the stalled queue, second overflows it
        router.publish(&entry("A", "one", 0)).await;
        router.publish(&entry("A", "two", 1)).await;

        assert_eq!(kick_rx.recv().await, Some(7));

        assert!(matches!(
            healthy_rx.recv().await,
            Some(OutboundItem::Entry { sequence: 0, .. })
        ));
        assert!(matches!(
            healthy_rx.recv().await,
            Some(OutboundItem::Entry { sequence: 1, .. })
        ));
    }

    #[tokio::test]
    async fn test_ephemeral_overflow_drops_message_not_viewer() {
        let (router, mut kick_rx) = BroadcastRouter::new();
        let (tx, mut rx) = mpsc::channel(1);
        router.subscribe(3, tx).await;

        let status = ServerMessage::RoomStatus {
            room: "Hall A".to_string(),
            status: RoomPresence::Connected,
        };
        router.publish_ephemeral(&status).await;
        router.publish_ephemeral(&status).await;

        // No kick, and only the first message made it through
        assert!(kick_rx.try_recv().is_err());
        assert!(matches!(rx.try_recv(), Ok(OutboundItem::Direct(_))));
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_closed_queue_schedules_cleanup() {
        let (router, mut kick_rx) = BroadcastRouter::new();
        let (tx, rx) = mpsc::channel(4);
        router.subscribe(5, tx).await;
        drop(rx);

        router.publish(&entry("A", "one", 0)).await;
        assert_eq!(kick_rx.recv().await, Some(5));
    }

    #[tokio::test]
    async fn test_unsubscribe_stops_delivery() {
        let (router, _kick_rx) = BroadcastRouter::new();
        let (tx, mut rx) = mpsc::channel(4);
        router.subscribe(9, tx).await;

        assert!(router.unsubscribe(9).await);
        assert!(!router.unsubscribe(9).await);
        assert_eq!(router.viewer_count().await, 0);

        router.publish(&entry("A", "one", 0)).await;
        assert!(rx.try_recv().is_err());
    }
}
