//! Point-in-time export
//!
//! Builds immutable documents over the registry: the export document handed
//! out on request (room name to ordered `{timestamp, text}` lines, wrapped
//! with session metadata) and the snapshot a viewer receives when it joins.
//! Consistency is per room; neither document blocks appends for longer than
//! one room's clone.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use crate::protocol::ServerMessage;
use crate::registry::RoomRegistry;
use crate::router::Watermarks;

/// One exported transcript line
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportLine {
    /// Wall-clock rendering of the producer timestamp, `HH:MM:SS` UTC
    pub timestamp: String,
    /// Finalized text
    pub text: String,
}

/// Point-in-time export document over all rooms
///
/// Built on demand, never mutated afterwards. Appends racing the export land
/// either wholly inside or wholly outside each room's list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportSnapshot {
    /// When the hub started accepting connections, ISO-8601 UTC
    pub session_start: String,
    /// When this document was built, ISO-8601 UTC
    pub export_time: String,
    /// Ordered lines per room, sorted by room name
    pub rooms: BTreeMap<String, Vec<ExportLine>>,
}

/// Export and snapshot builder over one registry
pub struct ExportService {
    registry: Arc<RoomRegistry>,
    session_start: DateTime<Utc>,
}

impl ExportService {
    /// Create a service whose `session_start` is the moment of construction
    pub fn new(registry: Arc<RoomRegistry>) -> Self {
        Self {
            registry,
            session_start: Utc::now(),
        }
    }

    /// Session start in ISO-8601 UTC
    pub fn session_start_iso(&self) -> String {
        self.session_start
            .to_rfc3339_opts(SecondsFormat::Millis, true)
    }

    /// Build the export document over every room
    pub async fn export_all(&self) -> ExportSnapshot {
        let rooms = self.registry.snapshot_all().await;
        let room_count = rooms.len();

        let rooms: BTreeMap<String, Vec<ExportLine>> = rooms
            .into_iter()
            .map(|(name, entries)| {
                let lines = entries
                    .into_iter()
                    .map(|entry| ExportLine {
                        timestamp: format_clock(entry.timestamp),
                        text: entry.text,
                    })
                    .collect();
                (name, lines)
            })
            .collect();

        tracing::info!(rooms = room_count, "Export document built");

        ExportSnapshot {
            session_start: self.session_start_iso(),
            export_time: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
            rooms,
        }
    }

    /// Build the viewer-join snapshot plus its per-room watermarks
    ///
    /// The snapshot carries full entries, sequences included, so a client can
    /// splice live updates onto it. The watermark map records each room's
    /// highest snapshot-covered sequence for the writer-side join filter.
    pub async fn viewer_snapshot(&self) -> (ServerMessage, Watermarks) {
        let rooms = self.registry.snapshot_all().await;

        let mut watermarks = Watermarks::new();
        for (name, entries) in &rooms {
            if let Some(last) = entries.last() {
                watermarks.insert(name.clone(), last.sequence);
            }
        }

        let msg = ServerMessage::Snapshot {
            session_start: self.session_start_iso(),
            rooms,
        };
        (msg, watermarks)
    }
}

/// Render an epoch-seconds timestamp as `HH:MM:SS` UTC
///
/// Timestamps too large for the calendar clamp to midnight rather than
/// failing the whole export.
fn format_clock(timestamp: f64) -> String {
    let secs = timestamp.trunc() as i64;
    let nanos = (timestamp.fract() * 1_000_000_000.0) as u32;
    match DateTime::from_timestamp(secs, nanos) {
        Some(dt) => dt.format("%H:%M:%S").to_string(),
        None => "00:00:00".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use crate::registry::SourceType;
    use crate::router::BroadcastRouter;

    use super::*;

    fn service() -> ExportService {
        let (router, _kick_rx) = BroadcastRouter::new();
        let registry = Arc::new(RoomRegistry::new(Arc::new(router)));
        ExportService::new(registry)
    }

    fn service_with_registry() -> (ExportService, Arc<RoomRegistry>) {
        let (router, _kick_rx) = BroadcastRouter::new();
        let registry = Arc::new(RoomRegistry::new(Arc::new(router)));
        (ExportService::new(Arc::clone(&registry)), registry)
    }

    #[test]
    fn test_clock_rendering() {
        assert_eq!(format_clock(1000.0), "00:16:40");
        assert_eq!(format_clock(86399.0), "23:59:59");
        assert_eq!(format_clock(86400.5), "00:00:00");
        // Beyond calendar range clamps instead of failing
        assert_eq!(format_clock(1e300), "00:00:00");
    }

    #[tokio::test]
    async fn test_export_covers_all_rooms_in_order() {
        let (service, registry) = service_with_registry();

        registry.append("Workshop", "saws", 60.0, SourceType::Agent).await;
        registry.append("Hall A", "Welcome", 1000.0, SourceType::Agent).await;
        registry
            .append("Hall A", "to the tour", 1005.0, SourceType::Mobile)
            .await;

        let export = service.export_all().await;

        let names: Vec<_> = export.rooms.keys().cloned().collect();
        assert_eq!(names, vec!["Hall A".to_string(), "Workshop".to_string()]);
        assert_eq!(
            export.rooms["Hall A"],
            vec![
                ExportLine {
                    timestamp: "00:16:40".to_string(),
                    text: "Welcome".to_string(),
                },
                ExportLine {
                    timestamp: "00:16:45".to_string(),
                    text: "to the tour".to_string(),
                },
            ]
        );
        assert_eq!(export.rooms["Workshop"].len(), 1);
    }

    #[tokio::test]
    async fn test_export_round_trip() {
        let (service, registry) = service_with_registry();
        registry.append("Hall A", "Welcome", 1000.0, SourceType::Agent).await;
        registry.append("Workshop", "saws", 60.0, SourceType::Agent).await;

        let export = service.export_all().await;
        let encoded = serde_json::to_string(&export).unwrap();
        let decoded: ExportSnapshot = serde_json::from_str(&encoded).unwrap();

        assert_eq!(decoded, export);
    }

    #[tokio::test]
    async fn test_export_timestamps_are_rfc3339() {
        let service = service();
        let export = service.export_all().await;

        assert!(DateTime::parse_from_rfc3339(&export.session_start).is_ok());
        assert!(DateTime::parse_from_rfc3339(&export.export_time).is_ok());
    }

    #[tokio::test]
    async fn test_export_excludes_interim() {
        let (service, registry) = service_with_registry();

        registry.append("Hall A", "Welcome", 1000.0, SourceType::Agent).await;
        registry.set_interim("Hall A", "to the", 1004.0).await;

        let export = service.export_all().await;
        assert_eq!(export.rooms["Hall A"].len(), 1);
    }

    #[tokio::test]
    async fn test_viewer_snapshot_watermarks() {
        let (service, registry) = service_with_registry();

        for (i, text) in ["Welcome", "to the tour", "of the castle"].iter().enumerate() {
            registry
                .append("Hall A", text, 1000.0 + i as f64, SourceType::Agent)
                .await;
        }
        registry.append("Workshop", "saws", 60.0, SourceType::Agent).await;
        // A room with no entries yet gets no watermark
        registry.get_or_create("Empty").await;

        let (msg, watermarks) = service.viewer_snapshot().await;

        assert_eq!(watermarks.get("Hall A"), Some(&2));
        assert_eq!(watermarks.get("Workshop"), Some(&0));
        assert!(!watermarks.contains_key("Empty"));

        match msg {
            ServerMessage::Snapshot { rooms, .. } => {
                assert_eq!(rooms.len(), 3);
                assert_eq!(rooms["Hall A"].len(), 3);
                assert!(rooms["Empty"].is_empty());
            }
            other => panic!("unexpected message: {:?}", other),
        }
    }
}
