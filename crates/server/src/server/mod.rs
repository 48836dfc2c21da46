//! WebSocket viewer server.

use crate::config::Config;
use crate::directory::AgentRegistry;
use crate::presence::PresenceScanner;
use crate::relay::NullRelay;
use crate::room::WorldHandle;
use futures_util::{SinkExt, StreamExt};
use protocol::{ClientMessage, ServerMessage};
use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{RwLock, mpsc};
use tokio_tungstenite::accept_hdr_async;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::http::StatusCode;
use tracing::{debug, error, info, warn};

pub mod client;
pub mod game;

pub use client::{ClientConnection, ClientManager, ConnHandle, SendError, Transport};
pub use game::{GameLoop, LoopSettings, TickReport};

/// Only upgrade requests for this path are accepted.
const WS_PATH: &str = "/ws";

/// Connection tracking state (shared across connection handlers).
#[derive(Debug, Default)]
struct ConnectionState {
    /// Number of connections per IP address.
    ip_connections: HashMap<IpAddr, usize>,
    /// Total number of connections.
    total_connections: usize,
}

impl ConnectionState {
    /// Try to add a connection, returns true if allowed.
    fn try_add_connection(&mut self, ip: IpAddr, max_total: usize, max_per_ip: usize) -> bool {
        if self.total_connections >= max_total {
            return false;
        }

        let current = self.ip_connections.get(&ip).copied().unwrap_or(0);
        if current >= max_per_ip {
            return false;
        }

        *self.ip_connections.entry(ip).or_insert(0) += 1;
        self.total_connections += 1;
        true
    }

    fn remove_connection(&mut self, ip: IpAddr) {
        if let Some(count) = self.ip_connections.get_mut(&ip) {
            if *count > 0 {
                *count -= 1;
                self.total_connections = self.total_connections.saturating_sub(1);
            }
            if *count == 0 {
                self.ip_connections.remove(&ip);
            }
        }
    }
}

/// [`Transport`] over a connection task's outbound queue.
struct WsOutbox {
    tx: mpsc::UnboundedSender<Message>,
}

impl Transport for WsOutbox {
    fn is_open(&self) -> bool {
        !self.tx.is_closed()
    }

    fn send(&self, msg: &ServerMessage) -> Result<(), SendError> {
        let text = msg.encode()?;
        self.tx
            .send(Message::text(text))
            .map_err(|_| SendError::Closed)
    }
}

/// Run the world server until Ctrl-C.
pub async fn run(config: Config) -> anyhow::Result<()> {
    let addr: SocketAddr = format!("{}:{}", config.server.bind, config.server.port).parse()?;
    let listener = TcpListener::bind(&addr).await?;
    info!("Listening on ws://{}{}", addr, WS_PATH);

    let registry = Arc::new(AgentRegistry::new());
    let handle = WorldHandle::new(&config, registry, Arc::new(NullRelay));
    handle.start();
    let presence = PresenceScanner::new(handle.clone(), &config.presence).spawn();

    let conn_state = Arc::new(RwLock::new(ConnectionState::default()));
    let max_connections = config.server.max_connections;
    let ip_limit = config.server.ip_limit;
    let max_frame = config.server.max_frame_bytes;
    let mut next_conn: u64 = 0;

    loop {
        let (stream, addr) = tokio::select! {
            accepted = listener.accept() => accepted?,
            _ = tokio::signal::ctrl_c() => {
                info!("Shutting down");
                break;
            }
        };
        let ip = addr.ip();

        if !conn_state
            .write()
            .await
            .try_add_connection(ip, max_connections, ip_limit)
        {
            warn!("Connection rejected (limit reached): {}", addr);
            continue;
        }

        next_conn += 1;
        let conn = ConnHandle(next_conn);
        let handle = handle.clone();
        let conn_state = Arc::clone(&conn_state);

        tokio::spawn(async move {
            let result = handle_connection(stream, addr, conn, handle, max_frame).await;

            conn_state.write().await.remove_connection(ip);

            if let Err(e) = result {
                error!("Connection error from {}: {}", addr, e);
            }
        });
    }

    presence.abort();
    handle.stop();
    Ok(())
}

/// Handle a single viewer connection.
async fn handle_connection(
    stream: TcpStream,
    addr: SocketAddr,
    conn: ConnHandle,
    handle: WorldHandle,
    max_frame: usize,
) -> anyhow::Result<()> {
    let mut follow = None;
    let ws_stream = accept_hdr_async(
        stream,
        |req: &Request, resp: Response| -> Result<Response, ErrorResponse> {
            follow = check_upgrade(req)?;
            Ok(resp)
        },
    )
    .await?;

    let (mut write, mut read) = ws_stream.split();
    let (tx, mut rx) = mpsc::unbounded_channel();
    let outbox: Arc<dyn Transport> = Arc::new(WsOutbox { tx });

    let client_id = {
        let mut clients = handle.clients().lock();
        let id = clients.add_client(conn, outbox.clone());
        if let Some(agent_id) = follow {
            clients.set_follow_agent(conn, agent_id);
        }
        id
    };
    info!("Viewer {} connected from {}", client_id, addr);

    reply(
        outbox.as_ref(),
        &ServerMessage::RoomInfo {
            info: handle.room_info(),
        },
    );

    let result = loop {
        tokio::select! {
            msg = read.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        handle_client_message(&handle, conn, outbox.as_ref(), text.as_str(), max_frame);
                    }
                    Some(Ok(Message::Binary(data))) => {
                        if let Some(text) = binary_frame_text(&data, max_frame) {
                            handle_client_message(&handle, conn, outbox.as_ref(), text, max_frame);
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => break Ok(()),
                    Some(Err(e)) => break Err(e.into()),
                    // pings are answered by tungstenite
                    Some(Ok(_)) => {}
                }
            }
            out = rx.recv() => {
                let Some(out) = out else { break Ok(()) };
                if let Err(e) = write.send(out).await {
                    warn!("Failed to send to {}: {}", addr, e);
                    break Ok(());
                }
            }
        }
    };

    handle.clients().lock().remove_client(conn);
    info!("Viewer {} disconnected", client_id);
    result
}

/// Apply one inbound viewer frame. Bad frames are dropped.
fn handle_client_message(
    handle: &WorldHandle,
    conn: ConnHandle,
    outbox: &dyn Transport,
    text: &str,
    max_frame: usize,
) {
    let msg = match ClientMessage::parse(text, max_frame) {
        Ok(msg) => msg,
        Err(e) => {
            debug!("Dropping frame from {}: {}", conn, e);
            return;
        }
    };

    match msg {
        ClientMessage::Subscribe => handle.clients().lock().ack_tick(conn, 0),
        ClientMessage::RequestProfiles => {
            let profiles: Vec<_> = {
                let world = handle.world().read();
                let directory = world.directory();
                world
                    .active_agent_ids()
                    .into_iter()
                    .filter_map(|id| directory.get(id))
                    .collect()
            };
            reply(outbox, &ServerMessage::Profiles { profiles });
        }
        ClientMessage::RequestProfile { agent_id } => {
            let profile = handle.world().read().directory().get(&agent_id);
            if let Some(profile) = profile {
                reply(outbox, &ServerMessage::Profile { profile });
            }
        }
        ClientMessage::Viewport { x, z } => {
            if x.is_finite() && z.is_finite() {
                handle.clients().lock().update_viewport(conn, x, z);
            }
        }
        ClientMessage::Follow { agent_id } => {
            handle.clients().lock().set_follow_agent(conn, agent_id);
        }
        ClientMessage::RequestRoomInfo => {
            reply(
                outbox,
                &ServerMessage::RoomInfo {
                    info: handle.room_info(),
                },
            );
        }
    }
}

fn reply(outbox: &dyn Transport, msg: &ServerMessage) {
    if let Err(e) = outbox.send(msg) {
        debug!("Reply dropped: {}", e);
    }
}

/// Accept upgrades on [`WS_PATH`] only; returns the agent to follow.
fn check_upgrade(req: &Request) -> Result<Option<String>, ErrorResponse> {
    if req.uri().path() != WS_PATH {
        let mut resp = ErrorResponse::new(Some("not found".to_string()));
        *resp.status_mut() = StatusCode::NOT_FOUND;
        return Err(resp);
    }
    Ok(agent_from_query(req.uri().query()))
}

/// UTF-8 text of a binary frame, if it is within the size limit.
fn binary_frame_text(data: &[u8], max_frame: usize) -> Option<&str> {
    if data.len() > max_frame {
        return None;
    }
    std::str::from_utf8(data).ok()
}

/// `agent` parameter of an upgrade request query string.
fn agent_from_query(query: Option<&str>) -> Option<String> {
    query?
        .split('&')
        .filter_map(|pair| pair.split_once('='))
        .find(|(key, _)| *key == "agent")
        .map(|(_, value)| value.to_string())
        .filter(|value| !value.is_empty())
}
