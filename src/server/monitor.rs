//! Liveness monitoring
//!
//! Two background jobs keep the connection set honest: a periodic sweep that
//! pings every connection and reaps the silent ones, and a reaper that turns
//! the router's kick requests into real disconnections. Both only ever signal
//! a connection's own task; teardown stays in one place.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::router::{BroadcastRouter, OutboundItem};
use crate::server::config::HubConfig;
use crate::server::tracker::ConnectionTracker;
use crate::session::CloseReason;

/// Spawn the periodic liveness sweep
///
/// Every `sweep_interval` it pings all tracked connections and kicks those
/// whose heartbeat lapsed past `heartbeat_timeout`, plus connections that
/// never classified themselves within `unclassified_timeout`.
pub(crate) fn spawn_monitor(tracker: Arc<ConnectionTracker>, config: HubConfig) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(config.sweep_interval);
        loop {
            ticker.tick().await;
            sweep(&tracker, &config).await;
        }
    })
}

async fn sweep(tracker: &ConnectionTracker, config: &HubConfig) {
    for (id, state, outbound) in tracker.handles().await {
        let (lapsed, never_classified) = {
            let st = state.read().await;
            (
                st.heartbeat_lapsed(config.heartbeat_timeout),
                !st.is_classified() && st.uptime() > config.unclassified_timeout,
            )
        };

        if lapsed || never_classified {
            if never_classified {
                tracing::info!(connection_id = id, "Reaping connection that never classified itself");
            } else {
                tracing::info!(connection_id = id, "Reaping connection with lapsed heartbeat");
            }
            tracker.kick(id, CloseReason::TimedOut).await;
        } else {
            // Any reply, pong included, refreshes the heartbeat
            let _ = outbound.try_send(OutboundItem::Ping);
        }
    }
}

/// Spawn the slow-consumer reaper
///
/// Ids arriving on the kick channel are unsubscribed immediately, so no
/// further broadcasts pile onto a dead queue, then asked to close. Producers
/// never notice any of this.
pub(crate) fn spawn_slow_consumer_reaper(
    mut kick_rx: mpsc::UnboundedReceiver<u64>,
    router: Arc<BroadcastRouter>,
    tracker: Arc<ConnectionTracker>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(id) = kick_rx.recv().await {
            if router.unsubscribe(id).await {
                tracing::warn!(connection_id = id, "Disconnecting slow viewer");
            }
            tracker.kick(id, CloseReason::SlowConsumer).await;
        }
    })
}

#[cfg(test)]
mod tests {
    use std::net::{IpAddr, Ipv4Addr, SocketAddr};
    use std::time::Duration;

    use crate::protocol::Role;

    use super::*;

    fn peer() -> SocketAddr {
        SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 50000)
    }

    #[tokio::test]
    async fn test_sweep_pings_healthy_connections() {
        let tracker = ConnectionTracker::new();
        let (tx, mut rx) = mpsc::channel(4);
        let (_id, state, _shutdown_rx) = tracker.register(peer(), tx).await;
        state.write().await.classify(Role::Viewer).unwrap();

        let config = HubConfig::default();
        sweep(&tracker, &config).await;

        assert!(matches!(rx.try_recv(), Ok(OutboundItem::Ping)));
        assert_eq!(tracker.connection_count().await, 1);
    }

    #[tokio::test]
    async fn test_sweep_kicks_lapsed_heartbeat() {
        let tracker = ConnectionTracker::new();
        let (tx, _rx) = mpsc::channel(4);
        let (_id, state, shutdown_rx) = tracker.register(peer(), tx).await;
        state.write().await.classify(Role::Producer).unwrap();

        let config = HubConfig::default().heartbeat_timeout(Duration::ZERO);
        tokio::time::sleep(Duration::from_millis(5)).await;
        sweep(&tracker, &config).await;

        assert_eq!(shutdown_rx.await.unwrap(), CloseReason::TimedOut);
    }

    #[tokio::test]
    async fn test_sweep_kicks_never_classified() {
        let tracker = ConnectionTracker::new();
        let (tx, _rx) = mpsc::channel(4);
        let (_id, _state, shutdown_rx) = tracker.register(peer(), tx).await;

        // Heartbeat is fine; the connection just never said who it is
        let config = HubConfig::default().unclassified_timeout(Duration::ZERO);
        tokio::time::sleep(Duration::from_millis(5)).await;
        sweep(&tracker, &config).await;

        assert_eq!(shutdown_rx.await.unwrap(), CloseReason::TimedOut);
    }

    #[tokio::test]
    async fn test_reaper_unsubscribes_and_kicks() {
        let (router, kick_rx) = BroadcastRouter::new();
        let router = Arc::new(router);
        let tracker = Arc::new(ConnectionTracker::new());

        let (tx, _rx) = mpsc::channel(1);
        let (id, _state, shutdown_rx) = tracker.register(peer(), tx.clone()).await;
        router.subscribe(id, tx).await;

        let reaper = spawn_slow_consumer_reaper(kick_rx, Arc::clone(&router), Arc::clone(&tracker));

        // Overflow the queue: first publish fills it, second forces a kick
        let entry = crate::registry::TranscriptEntry::new(
            "Hall A",
            "Welcome",
            1000.0,
            crate::registry::SourceType::Agent,
            0,
        );
        router.publish(&entry).await;
        router.publish(&entry).await;

        assert_eq!(shutdown_rx.await.unwrap(), CloseReason::SlowConsumer);
        assert_eq!(router.viewer_count().await, 0);
        reaper.abort();
    }
}
