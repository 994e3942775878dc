//! Per-connection handling
//!
//! Each accepted socket gets one reader loop and one writer task. The reader
//! classifies the connection from its first message, routes producer traffic
//! into the registry, and watches the tracker's shutdown signal; the writer
//! drains the connection's outbound queue and is the only code that touches
//! the socket's write half. Teardown runs exactly once, here, whichever side
//! initiated the close.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot, RwLock};
use tokio_tungstenite::tungstenite::{Message, Utf8Bytes};
use tokio_tungstenite::{accept_async, WebSocketStream};

use crate::backup::BackupWriter;
use crate::error::Result;
use crate::export::ExportService;
use crate::protocol::{ClientMessage, Role, ServerMessage};
use crate::registry::{RoomRegistry, SourceType};
use crate::router::{BroadcastRouter, OutboundItem, Watermarks};
use crate::server::config::HubConfig;
use crate::server::tracker::ConnectionTracker;
use crate::session::{CloseReason, ConnectionRole, ConnectionState};

/// How long a finishing writer may spend flushing before it is aborted
const WRITER_DRAIN_GRACE: Duration = Duration::from_secs(3);

/// Shared services handed to every connection task
#[derive(Clone)]
pub(crate) struct HubContext {
    pub config: HubConfig,
    pub registry: Arc<RoomRegistry>,
    pub router: Arc<BroadcastRouter>,
    pub export: Arc<ExportService>,
    pub tracker: Arc<ConnectionTracker>,
    pub backup: BackupWriter,
}

/// Drive one connection from WebSocket handshake to teardown
pub(crate) async fn handle_connection(
    ctx: HubContext,
    socket: TcpStream,
    peer_addr: SocketAddr,
) -> Result<()> {
    // A socket that never upgrades would otherwise sit here untracked,
    // invisible to the liveness sweep
    let handshake = tokio::time::timeout(ctx.config.unclassified_timeout, accept_async(socket));
    let ws = match handshake.await {
        Ok(ws) => ws?,
        Err(_) => {
            tracing::debug!(peer = %peer_addr, "WebSocket handshake timed out");
            return Ok(());
        }
    };
    let (sink, stream) = ws.split();

    let (outbound_tx, outbound_rx) = mpsc::channel(ctx.config.viewer_queue_bound);
    let (id, state, shutdown_rx) = ctx.tracker.register(peer_addr, outbound_tx.clone()).await;

    let mut writer = tokio::spawn(write_loop(sink, outbound_rx));

    let reason = read_loop(&ctx, id, &state, &outbound_tx, stream, shutdown_rx).await;

    teardown(&ctx, id, &state, reason).await;

    // Teardown released the router's and tracker's sender clones; dropping
    // ours closes the queue so the writer can flush and say goodbye. A peer
    // that stopped reading gets cut off instead of holding the task hostage.
    drop(outbound_tx);
    if tokio::time::timeout(WRITER_DRAIN_GRACE, &mut writer).await.is_err() {
        writer.abort();
    }
    Ok(())
}

async fn read_loop(
    ctx: &HubContext,
    id: u64,
    state: &Arc<RwLock<ConnectionState>>,
    outbound_tx: &mpsc::Sender<OutboundItem>,
    mut stream: SplitStream<WebSocketStream<TcpStream>>,
    mut shutdown_rx: oneshot::Receiver<CloseReason>,
) -> CloseReason {
    loop {
        tokio::select! {
            reason = &mut shutdown_rx => {
                return reason.unwrap_or(CloseReason::Disconnected);
            }
            frame = stream.next() => {
                let msg = match frame {
                    None => return CloseReason::Disconnected,
                    Some(Err(e)) => {
                        tracing::debug!(connection_id = id, error = %e, "WebSocket read error");
                        return CloseReason::Disconnected;
                    }
                    Some(Ok(msg)) => msg,
                };

                // Any inbound frame counts as liveness
                state.write().await.touch();

                match msg {
                    Message::Text(text) => {
                        if let Some(reason) = handle_text(ctx, id, state, outbound_tx, text.as_str()).await {
                            return reason;
                        }
                    }
                    Message::Ping(data) => {
                        let _ = outbound_tx.try_send(OutboundItem::Pong(data));
                    }
                    Message::Close(_) => return CloseReason::Disconnected,
                    // Pongs already refreshed the heartbeat; binary frames
                    // have no meaning in this protocol
                    _ => {}
                }
            }
        }
    }
}

/// Dispatch one parsed-and-validated inbound message
///
/// Returns `Some(reason)` only when the connection must close; protocol
/// mistakes are logged or answered and the connection lives on.
async fn handle_text(
    ctx: &HubContext,
    id: u64,
    state: &Arc<RwLock<ConnectionState>>,
    outbound_tx: &mpsc::Sender<OutboundItem>,
    raw: &str,
) -> Option<CloseReason> {
    let msg = match ClientMessage::parse(raw) {
        Ok(msg) => msg,
        Err(e) => {
            tracing::warn!(connection_id = id, error = %e, "Discarding bad message");
            return None;
        }
    };

    match msg {
        ClientMessage::Register { role, room, source } => {
            register(ctx, id, state, outbound_tx, role, room, source).await
        }
        ClientMessage::Final {
            room,
            text,
            timestamp,
        } => {
            let source = transcript_source(id, state).await?;
            let entry = ctx.registry.append(&room, &text, timestamp, source).await;
            ctx.backup.offer(&entry);
            None
        }
        ClientMessage::Interim {
            room,
            text,
            timestamp,
        } => {
            transcript_source(id, state).await?;
            ctx.registry.set_interim(&room, &text, timestamp).await;
            None
        }
        ClientMessage::Export => {
            // Any connection may ask, classified or not; the request does
            // not classify it
            let doc = ctx.export.export_all().await;
            let payload = ServerMessage::Export(doc).encode();
            if outbound_tx.send(OutboundItem::Direct(payload)).await.is_err() {
                return Some(CloseReason::Disconnected);
            }
            None
        }
    }
}

async fn register(
    ctx: &HubContext,
    id: u64,
    state: &Arc<RwLock<ConnectionState>>,
    outbound_tx: &mpsc::Sender<OutboundItem>,
    role: Role,
    room: Option<String>,
    source: Option<SourceType>,
) -> Option<CloseReason> {
    let classified = {
        let mut st = state.write().await;
        let result = st.classify(role);
        if result.is_ok() {
            if let Some(source) = source {
                st.source = source;
            }
            if role == Role::Producer {
                st.registered_room = room.clone();
            }
        }
        result
    };

    if let Err(e) = classified {
        tracing::warn!(connection_id = id, requested = %role, "Rejected re-registration");
        let payload = ServerMessage::error(e.to_string()).encode();
        if outbound_tx.send(OutboundItem::Direct(payload)).await.is_err() {
            return Some(CloseReason::Disconnected);
        }
        return None;
    }

    match role {
        Role::Producer => {
            if let Some(room) = room {
                ctx.registry.attach_producer(&room).await;
                tracing::info!(connection_id = id, room = %room, "Producer registered");
            } else {
                tracing::info!(connection_id = id, "Producer registered without a room");
            }
        }
        Role::Viewer => {
            // Subscribe first, snapshot second. Entries racing the snapshot
            // land in the queue and the writer filters them against the
            // snapshot's watermarks, so the viewer sees each entry exactly
            // once however the race falls.
            ctx.router.subscribe(id, outbound_tx.clone()).await;
            let (snapshot, watermarks) = ctx.export.viewer_snapshot().await;
            let item = OutboundItem::Snapshot {
                payload: snapshot.encode(),
                watermarks,
            };
            if outbound_tx.send(item).await.is_err() {
                return Some(CloseReason::Disconnected);
            }
            tracing::info!(connection_id = id, "Viewer registered");
        }
    }
    None
}

/// Resolve the source for a transcript message, enforcing roles
///
/// An unclassified connection becomes a producer on its first transcript;
/// capture agents start streaming without registering first. Transcripts
/// from viewers are discarded.
async fn transcript_source(id: u64, state: &Arc<RwLock<ConnectionState>>) -> Option<SourceType> {
    let mut st = state.write().await;
    match st.role {
        ConnectionRole::Producer => Some(st.source),
        ConnectionRole::Viewer => {
            tracing::debug!(connection_id = id, "Discarding transcript from viewer");
            None
        }
        ConnectionRole::Unclassified => {
            st.role = ConnectionRole::Producer;
            tracing::info!(
                connection_id = id,
                peer = %st.peer_addr,
                "Connection implicitly classified as producer"
            );
            Some(st.source)
        }
    }
}

/// Drain the outbound queue onto the socket
///
/// Holds queued entries back until the join snapshot has gone out, then
/// forwards only entries above the snapshot's per-room watermark. Producer
/// connections never receive a snapshot; their queues only carry replies and
/// pings, which pass straight through.
async fn write_loop(
    mut sink: SplitSink<WebSocketStream<TcpStream>, Message>,
    mut rx: mpsc::Receiver<OutboundItem>,
) {
    let mut watermarks: Option<Watermarks> = None;
    let mut held: Vec<(Arc<str>, u64, Utf8Bytes)> = Vec::new();

    while let Some(item) = rx.recv().await {
        let result = match item {
            OutboundItem::Snapshot {
                payload,
                watermarks: marks,
            } => {
                let mut result = sink.send(Message::Text(payload)).await;
                if result.is_ok() {
                    // Flush entries that raced the snapshot, minus those the
                    // snapshot already covers
                    for (room, sequence, payload) in held.drain(..) {
                        if covered(&marks, &room, sequence) {
                            continue;
                        }
                        result = sink.send(Message::Text(payload)).await;
                        if result.is_err() {
                            break;
                        }
                    }
                }
                watermarks = Some(marks);
                result
            }
            OutboundItem::Entry {
                room,
                sequence,
                payload,
            } => match &watermarks {
                None => {
                    // Join window: the snapshot has not gone out yet
                    held.push((room, sequence, payload));
                    Ok(())
                }
                Some(marks) if covered(marks, &room, sequence) => Ok(()),
                Some(_) => sink.send(Message::Text(payload)).await,
            },
            OutboundItem::Direct(payload) => sink.send(Message::Text(payload)).await,
            OutboundItem::Ping => sink.send(Message::Ping(Bytes::new())).await,
            OutboundItem::Pong(data) => sink.send(Message::Pong(data)).await,
        };

        if let Err(e) = result {
            tracing::debug!(error = %e, "WebSocket write failed");
            return;
        }
    }

    // Queue closed by teardown
    let _ = sink.send(Message::Close(None)).await;
}

fn covered(watermarks: &Watermarks, room: &str, sequence: u64) -> bool {
    watermarks.get(room).map_or(false, |&mark| sequence <= mark)
}

/// Release everything a connection held; runs exactly once per connection
///
/// Rooms and their entries always survive this.
async fn teardown(
    ctx: &HubContext,
    id: u64,
    state: &Arc<RwLock<ConnectionState>>,
    reason: CloseReason,
) {
    let (role, registered_room, peer_addr, uptime) = {
        let st = state.read().await;
        (st.role, st.registered_room.clone(), st.peer_addr, st.uptime())
    };

    ctx.router.unsubscribe(id).await;
    if let Some(room) = registered_room {
        ctx.registry.detach_producer(&room).await;
    }
    ctx.tracker.remove(id).await;

    tracing::info!(
        connection_id = id,
        peer = %peer_addr,
        role = ?role,
        reason = %reason,
        uptime_secs = uptime.as_secs(),
        "Connection closed"
    );
}
