//! Hub server listener
//!
//! Owns the shared services, runs the TCP accept loop, and spawns one
//! handler task per connection plus the background monitor, reaper, and
//! stats tasks.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;

use crate::backup::BackupWriter;
use crate::error::Result;
use crate::export::ExportService;
use crate::registry::RoomRegistry;
use crate::router::BroadcastRouter;
use crate::server::config::HubConfig;
use crate::server::connection::{handle_connection, HubContext};
use crate::server::monitor::{spawn_monitor, spawn_slow_consumer_reaper};
use crate::server::tracker::ConnectionTracker;
use crate::session::CloseReason;
use crate::stats::HubStats;

/// Transcript hub server
pub struct HubServer {
    config: HubConfig,
    listener: TcpListener,
    registry: Arc<RoomRegistry>,
    router: Arc<BroadcastRouter>,
    export: Arc<ExportService>,
    tracker: Arc<ConnectionTracker>,
    backup: BackupWriter,
    connection_semaphore: Option<Arc<Semaphore>>,
    started_at: Instant,
}

impl HubServer {
    /// Bind the hub to its configured address and wire up its services
    pub async fn bind(config: HubConfig) -> Result<Self> {
        let listener = TcpListener::bind(config.bind_addr).await?;
        tracing::info!(addr = %listener.local_addr()?, "Transcript hub listening");

        let (router, kick_rx) = BroadcastRouter::new();
        let router = Arc::new(router);
        let registry = Arc::new(RoomRegistry::new(Arc::clone(&router)));
        let export = Arc::new(ExportService::new(Arc::clone(&registry)));
        let tracker = Arc::new(ConnectionTracker::new());

        // The reaper belongs to the router's kick channel, not to any one
        // run of the accept loop; it exits on its own when the router drops
        // the last sender
        spawn_slow_consumer_reaper(kick_rx, Arc::clone(&router), Arc::clone(&tracker));

        let backup = match &config.backup_path {
            Some(path) => BackupWriter::spawn(path.clone()),
            None => BackupWriter::disabled(),
        };

        let connection_semaphore = if config.max_connections > 0 {
            Some(Arc::new(Semaphore::new(config.max_connections)))
        } else {
            None
        };

        Ok(Self {
            config,
            listener,
            registry,
            router,
            export,
            tracker,
            backup,
            connection_semaphore,
            started_at: Instant::now(),
        })
    }

    /// Actual bound address; useful after binding to port 0
    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// The room registry behind this hub
    pub fn registry(&self) -> &Arc<RoomRegistry> {
        &self.registry
    }

    /// The export service behind this hub
    pub fn export(&self) -> &Arc<ExportService> {
        &self.export
    }

    /// Current hub-wide counters
    pub async fn stats(&self) -> HubStats {
        gather_stats(&self.tracker, &self.router, &self.registry, self.started_at).await
    }

    /// Run the hub
    ///
    /// Only returns if the accept loop itself fails.
    pub async fn run(&self) -> Result<()> {
        let _tasks = self.spawn_background_tasks();
        self.accept_loop().await
    }

    /// Run the hub until `shutdown` resolves, then close every connection
    pub async fn run_until<F>(&self, shutdown: F) -> Result<()>
    where
        F: std::future::Future<Output = ()>,
    {
        let tasks = self.spawn_background_tasks();

        let result = tokio::select! {
            _ = shutdown => {
                tracing::info!("Shutdown signal received");
                Ok(())
            }
            result = self.accept_loop() => result,
        };

        for task in &tasks {
            task.abort();
        }
        self.tracker.kick_all(CloseReason::ServerShutdown).await;

        result
    }

    fn spawn_background_tasks(&self) -> Vec<JoinHandle<()>> {
        vec![
            spawn_monitor(Arc::clone(&self.tracker), self.config.clone()),
            self.spawn_stats_logger(),
        ]
    }

    fn spawn_stats_logger(&self) -> JoinHandle<()> {
        let tracker = Arc::clone(&self.tracker);
        let router = Arc::clone(&self.router);
        let registry = Arc::clone(&self.registry);
        let interval = self.config.stats_interval;
        let started_at = self.started_at;

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            // The immediate first tick has nothing to report
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let stats = gather_stats(&tracker, &router, &registry, started_at).await;
                tracing::info!(
                    connections = stats.active_connections,
                    viewers = stats.viewers,
                    rooms = stats.rooms,
                    entries = stats.total_entries,
                    entries_per_minute = format!("{:.1}", stats.entries_per_minute()),
                    uptime_secs = stats.uptime.as_secs(),
                    "Hub stats"
                );
                for room in registry.room_stats().await {
                    tracing::debug!(
                        room = %room.room,
                        entries = room.entries,
                        live_producers = room.live_producers,
                        idle_secs = room.idle.as_secs(),
                        "Room stats"
                    );
                }
            }
        })
    }

    async fn accept_loop(&self) -> Result<()> {
        loop {
            match self.listener.accept().await {
                Ok((socket, peer_addr)) => {
                    self.handle_socket(socket, peer_addr).await;
                }
                Err(e) => {
                    tracing::error!(error = %e, "Failed to accept connection");
                }
            }
        }
    }

    async fn handle_socket(&self, socket: TcpStream, peer_addr: SocketAddr) {
        // Check connection limit
        let permit = if let Some(ref sem) = self.connection_semaphore {
            match sem.clone().try_acquire_owned() {
                Ok(permit) => Some(permit),
                Err(_) => {
                    tracing::warn!(peer = %peer_addr, "Connection rejected: limit reached");
                    return;
                }
            }
        } else {
            None
        };

        if self.config.tcp_nodelay {
            if let Err(e) = socket.set_nodelay(true) {
                tracing::debug!(error = %e, "Failed to set TCP_NODELAY");
            }
        }

        let ctx = HubContext {
            config: self.config.clone(),
            registry: Arc::clone(&self.registry),
            router: Arc::clone(&self.router),
            export: Arc::clone(&self.export),
            tracker: Arc::clone(&self.tracker),
            backup: self.backup.clone(),
        };

        tokio::spawn(async move {
            // The permit lives as long as the connection does
            let _permit = permit;
            if let Err(e) = handle_connection(ctx, socket, peer_addr).await {
                tracing::debug!(peer = %peer_addr, error = %e, "Connection error");
            }
        });
    }
}

async fn gather_stats(
    tracker: &ConnectionTracker,
    router: &BroadcastRouter,
    registry: &RoomRegistry,
    started_at: Instant,
) -> HubStats {
    HubStats {
        active_connections: tracker.connection_count().await,
        viewers: router.viewer_count().await,
        rooms: registry.room_count().await,
        total_entries: registry.total_entries(),
        uptime: started_at.elapsed(),
    }
}
