//! Room registry implementation
//!
//! The central registry that owns every room's transcript log and routes
//! appended entries to the broadcast router. Rooms are created on first
//! touch and never deleted; producers and viewers reference them by name
//! only, so a reconnecting producer lands back on the same log.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::RwLock;

use crate::protocol::{RoomPresence, ServerMessage};
use crate::router::BroadcastRouter;
use crate::stats::RoomStats;

use super::entry::{SourceType, TranscriptEntry};
use super::room::RoomSession;

/// Central registry for all rooms
///
/// Thread-safe via a two-level `RwLock` scheme: a read-mostly outer map from
/// room name to session handle, and one inner lock per room. Mutual exclusion
/// is per room, so N rooms sustain N-way parallel appends.
pub struct RoomRegistry {
    /// Map of room name to session handle
    rooms: RwLock<HashMap<String, Arc<RwLock<RoomSession>>>>,

    /// Fan-out destination for appended entries and ephemeral updates
    router: Arc<BroadcastRouter>,

    /// Entries appended across all rooms since startup
    total_entries: AtomicU64,
}

impl RoomRegistry {
    /// Create a registry that publishes through `router`
    pub fn new(router: Arc<BroadcastRouter>) -> Self {
        Self {
            rooms: RwLock::new(HashMap::new()),
            router,
            total_entries: AtomicU64::new(0),
        }
    }

    /// Look up a room, creating it if this is the first touch
    ///
    /// Idempotent and race-safe: under concurrent first touch exactly one
    /// session is created and every caller gets the same handle. Uses a
    /// read-lock fast path and a double-checked insert under the write lock.
    pub async fn get_or_create(&self, name: &str) -> Arc<RwLock<RoomSession>> {
        {
            let rooms = self.rooms.read().await;
            if let Some(room) = rooms.get(name) {
                return Arc::clone(room);
            }
        }

        let mut rooms = self.rooms.write().await;
        // Another task may have created it between the locks
        if let Some(room) = rooms.get(name) {
            return Arc::clone(room);
        }

        let room = Arc::new(RwLock::new(RoomSession::new(name)));
        rooms.insert(name.to_string(), Arc::clone(&room));

        tracing::info!(room = name, rooms = rooms.len(), "Room created");
        room
    }

    /// Append a finalized transcript line to a room, creating the room if
    /// needed
    ///
    /// Sequence assignment and the router handoff both happen inside the
    /// room's critical section, so per-room broadcast order always equals
    /// append order even with several producers feeding one room. The
    /// handoff is a non-blocking queue send per viewer; no socket I/O runs
    /// under the lock.
    pub async fn append(
        &self,
        room_name: &str,
        text: &str,
        timestamp: f64,
        source: SourceType,
    ) -> TranscriptEntry {
        let room = self.get_or_create(room_name).await;

        let mut session = room.write().await;
        let entry = session.append(text.trim(), timestamp, source);
        self.router.publish(&entry).await;
        drop(session);

        self.total_entries.fetch_add(1, Ordering::Relaxed);

        tracing::debug!(
            room = room_name,
            sequence = entry.sequence,
            source = %entry.source,
            "Entry appended"
        );
        entry
    }

    /// Update a room's ephemeral in-progress utterance and broadcast it
    ///
    /// Same locking discipline as [`append`](Self::append); the preview is
    /// never stored in the log.
    pub async fn set_interim(&self, room_name: &str, text: &str, timestamp: f64) {
        let room = self.get_or_create(room_name).await;

        let mut session = room.write().await;
        session.set_utterance(text, timestamp);
        self.router
            .publish_ephemeral(&ServerMessage::Interim {
                room: room_name.to_string(),
                text: text.to_string(),
                timestamp,
            })
            .await;
    }

    /// Count a producer connection as attached to a room
    ///
    /// The 0 → 1 transition broadcasts a `room_status: connected` event.
    pub async fn attach_producer(&self, room_name: &str) {
        let room = self.get_or_create(room_name).await;

        let mut session = room.write().await;
        if session.attach_producer() {
            tracing::info!(room = room_name, "First producer attached");
            self.router
                .publish_ephemeral(&ServerMessage::RoomStatus {
                    room: room_name.to_string(),
                    status: RoomPresence::Connected,
                })
                .await;
        }
    }

    /// Count a producer connection as detached from a room
    ///
    /// The 1 → 0 transition broadcasts a `room_status: disconnected` event.
    /// The room and its entries always stay behind for reconnects and
    /// exports.
    pub async fn detach_producer(&self, room_name: &str) {
        let room = {
            let rooms = self.rooms.read().await;
            match rooms.get(room_name) {
                Some(room) => Arc::clone(room),
                None => return,
            }
        };

        let mut session = room.write().await;
        if session.detach_producer() {
            tracing::info!(room = room_name, "Last producer detached");
            self.router
                .publish_ephemeral(&ServerMessage::RoomStatus {
                    room: room_name.to_string(),
                    status: RoomPresence::Disconnected,
                })
                .await;
        }
    }

    /// Immutable copy of one room's entries as of call time
    pub async fn snapshot(&self, room_name: &str) -> Option<Vec<TranscriptEntry>> {
        let room = {
            let rooms = self.rooms.read().await;
            Arc::clone(rooms.get(room_name)?)
        };
        let session = room.read().await;
        Some(session.snapshot())
    }

    /// Immutable copy of every room's entries, keyed by room name
    ///
    /// Room handles are cloned under the outer lock, then each room is read
    /// in turn. Consistency is per room; an append racing this call lands
    /// either wholly inside or wholly outside the returned copy.
    pub async fn snapshot_all(&self) -> BTreeMap<String, Vec<TranscriptEntry>> {
        let handles: Vec<(String, Arc<RwLock<RoomSession>>)> = {
            let rooms = self.rooms.read().await;
            rooms
                .iter()
                .map(|(name, room)| (name.clone(), Arc::clone(room)))
                .collect()
        };

        let mut snapshot = BTreeMap::new();
        for (name, room) in handles {
            let session = room.read().await;
            snapshot.insert(name, session.snapshot());
        }
        snapshot
    }

    /// Per-room statistics, sorted by room name
    pub async fn room_stats(&self) -> Vec<RoomStats> {
        let handles: Vec<(String, Arc<RwLock<RoomSession>>)> = {
            let rooms = self.rooms.read().await;
            rooms
                .iter()
                .map(|(name, room)| (name.clone(), Arc::clone(room)))
                .collect()
        };

        let mut stats = Vec::with_capacity(handles.len());
        for (name, room) in handles {
            let session = room.read().await;
            stats.push(RoomStats {
                room: name,
                entries: session.len(),
                live_producers: session.live_producers(),
                idle: session.idle_for(),
            });
        }
        stats.sort_by(|a, b| a.room.cmp(&b.room));
        stats
    }

    /// Number of rooms created since startup
    pub async fn room_count(&self) -> usize {
        self.rooms.read().await.len()
    }

    /// Entries appended across all rooms since startup
    pub fn total_entries(&self) -> u64 {
        self.total_entries.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use tokio::sync::mpsc;

    use crate::router::OutboundItem;

    use super::*;

    fn registry() -> RoomRegistry {
        let (router, _kick_rx) = BroadcastRouter::new();
        RoomRegistry::new(Arc::new(router))
    }

    #[tokio::test]
    async fn test_get_or_create_is_idempotent() {
        let registry = registry();

        let first = registry.get_or_create("Hall A").await;
        let second = registry.get_or_create("Hall A").await;

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(registry.room_count().await, 1);
    }

    #[tokio::test]
    async fn test_room_names_are_case_sensitive() {
        let registry = registry();

        registry.get_or_create("Hall A").await;
        registry.get_or_create("hall a").await;

        assert_eq!(registry.room_count().await, 2);
    }

    #[tokio::test]
    async fn test_append_auto_creates_and_assigns_sequences() {
        let registry = registry();

        let a = registry.append("Hall A", "Welcome", 1000.0, SourceType::Agent).await;
        let b = registry
            .append("Hall A", "to the tour", 1005.0, SourceType::Agent)
            .await;

        assert_eq!(a.sequence, 0);
        assert_eq!(b.sequence, 1);
        assert_eq!(registry.total_entries(), 2);

        let snap = registry.snapshot("Hall A").await.unwrap();
        assert_eq!(
            snap.iter().map(|e| e.text.as_str()).collect::<Vec<_>>(),
            vec!["Welcome", "to the tour"]
        );
    }

    #[tokio::test]
    async fn test_rooms_sequence_independently() {
        let registry = registry();

        registry.append("A", "a0", 1.0, SourceType::Agent).await;
        registry.append("B", "b0", 2.0, SourceType::Agent).await;
        registry.append("A", "a1", 3.0, SourceType::Agent).await;
        registry.append("B", "b1", 4.0, SourceType::Mobile).await;

        let a = registry.snapshot("A").await.unwrap();
        let b = registry.snapshot("B").await.unwrap();
        assert_eq!(a.iter().map(|e| e.sequence).collect::<Vec<_>>(), vec![0, 1]);
        assert_eq!(b.iter().map(|e| e.sequence).collect::<Vec<_>>(), vec![0, 1]);
    }

    #[tokio::test]
    async fn test_append_stores_trimmed_text() {
        let registry = registry();

        let entry = registry
            .append("Hall A", "  Welcome  ", 1000.0, SourceType::Agent)
            .await;
        assert_eq!(entry.text, "Welcome");
    }

    #[tokio::test]
    async fn test_append_publishes_inside_room_section() {
        let (router, _kick_rx) = BroadcastRouter::new();
        let router = Arc::new(router);
        let registry = RoomRegistry::new(Arc::clone(&router));

        let (tx, mut rx) = mpsc::channel(8);
        router.subscribe(1, tx).await;

        registry.append("Hall A", "Welcome", 1000.0, SourceType::Agent).await;

        match rx.recv().await.unwrap() {
            OutboundItem::Entry { room, sequence, .. } => {
                assert_eq!(&*room, "Hall A");
                assert_eq!(sequence, 0);
            }
            other => panic!("unexpected item: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_interim_is_broadcast_but_never_stored() {
        let (router, _kick_rx) = BroadcastRouter::new();
        let router = Arc::new(router);
        let registry = RoomRegistry::new(Arc::clone(&router));

        let (tx, mut rx) = mpsc::channel(8);
        router.subscribe(1, tx).await;

        registry.set_interim("Hall A", "Welco", 999.5).await;

        assert!(matches!(
            rx.recv().await.unwrap(),
            OutboundItem::Direct(_)
        ));
        assert!(registry.snapshot("Hall A").await.unwrap().is_empty());
        assert_eq!(registry.total_entries(), 0);
    }

    #[tokio::test]
    async fn test_attach_detach_broadcasts_status_once() {
        let (router, _kick_rx) = BroadcastRouter::new();
        let router = Arc::new(router);
        let registry = RoomRegistry::new(Arc::clone(&router));

        let (tx, mut rx) = mpsc::channel(8);
        router.subscribe(1, tx).await;

        // Two producers attach; only the first transition broadcasts
        registry.attach_producer("Hall A").await;
        registry.attach_producer("Hall A").await;
        assert!(matches!(rx.try_recv(), Ok(OutboundItem::Direct(_))));
        assert!(rx.try_recv().is_err());

        // Two detach; only the last transition broadcasts
        registry.detach_producer("Hall A").await;
        registry.detach_producer("Hall A").await;
        assert!(matches!(rx.try_recv(), Ok(OutboundItem::Direct(_))));
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_detach_unknown_room_is_a_no_op() {
        let registry = registry();
        registry.detach_producer("never seen").await;
        assert_eq!(registry.room_count().await, 0);
    }

    #[tokio::test]
    async fn test_room_stats_reflect_log_and_presence() {
        let registry = registry();

        registry.append("Hall A", "Welcome", 1000.0, SourceType::Agent).await;
        registry.attach_producer("Hall A").await;

        let stats = registry.room_stats().await;
        assert_eq!(stats.len(), 1);
        assert_eq!(stats[0].room, "Hall A");
        assert_eq!(stats[0].entries, 1);
        assert_eq!(stats[0].live_producers, 1);
    }

    #[tokio::test]
    async fn test_snapshot_all_is_sorted_by_room_name() {
        let registry = registry();

        registry.append("Workshop", "w", 1.0, SourceType::Agent).await;
        registry.append("Hall A", "h", 2.0, SourceType::Agent).await;

        let all = registry.snapshot_all().await;
        let names: Vec<_> = all.keys().cloned().collect();
        assert_eq!(names, vec!["Hall A".to_string(), "Workshop".to_string()]);
    }

    #[tokio::test]
    async fn test_concurrent_appends_stay_ordered_and_gapless() {
        let registry = Arc::new(registry());

        let mut handles = Vec::new();
        for room in ["A", "B"] {
            let registry = Arc::clone(&registry);
            handles.push(tokio::spawn(async move {
                for i in 0..50 {
                    registry
                        .append(room, &format!("line {}", i), i as f64, SourceType::Agent)
                        .await;
                }
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        for room in ["A", "B"] {
            let snap = registry.snapshot(room).await.unwrap();
            let sequences: Vec<u64> = snap.iter().map(|e| e.sequence).collect();
            assert_eq!(sequences, (0..50).collect::<Vec<u64>>());
        }
        assert_eq!(registry.total_entries(), 100);
    }

    #[tokio::test]
    async fn test_same_room_concurrent_appends_stay_gapless() {
        let registry = Arc::new(registry());

        let mut handles = Vec::new();
        for producer in 0..4 {
            let registry = Arc::clone(&registry);
            handles.push(tokio::spawn(async move {
                for i in 0..25 {
                    let text = format!("p{} line {}", producer, i);
                    registry.append("Hall A", &text, i as f64, SourceType::Agent).await;
                }
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        let snap = registry.snapshot("Hall A").await.unwrap();
        let sequences: Vec<u64> = snap.iter().map(|e| e.sequence).collect();
        assert_eq!(sequences, (0..100).collect::<Vec<u64>>());
    }
}
