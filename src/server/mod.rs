//! Webserver: TLS listener, per-socket drivers, and the shared state they use.
//!
//! - **`connection`**: Sans-IO HTTP → WebSocket state machine
//! - **`files`**: Document root mapping and range serving
//! - **`registry`**: Socket → peer map used by [`Webserver::send`]
//! - **`tls`**: rustls configuration with SNI certificate selection
//! - **`listener`**: Accept loop and the driver task for each socket

pub mod connection;
pub mod files;
pub mod listener;
pub mod registry;
pub mod tls;

use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use thiserror::Error;
use tokio::sync::mpsc;

use crate::buffer::BufferError;
use crate::config::Config;
use crate::event::{Event, EventHandler};
use crate::http::message::HttpMessage;
use crate::pool::Pool;
use crate::server::connection::Connection;
use crate::server::registry::{Peer, Registry, RegistryBusy};
use crate::websocket::frame::{Frame, Opcode, encode_message};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SocketId(pub u64);

impl fmt::Display for SocketId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// State shared by every connection of one webserver.
pub struct ServerContext {
    pub config: Config,
    pub messages: Pool<HttpMessage>,
    pub frames: Pool<Frame>,
    pub handler: Arc<dyn EventHandler>,
}

impl ServerContext {
    pub fn new(config: Config, handler: Arc<dyn EventHandler>) -> Self {
        let per_key = config.limits.pool_capacity;
        Self {
            config,
            messages: Pool::new(per_key),
            frames: Pool::new(per_key),
            handler,
        }
    }
}

#[derive(Debug, Error)]
pub enum SendError {
    #[error("unknown socket {0}")]
    UnknownSocket(SocketId),
    #[error("socket {0} has not completed the websocket handshake")]
    NotUpgraded(SocketId),
    #[error("socket {0} is closed")]
    Closed(SocketId),
    #[error(transparent)]
    Busy(#[from] RegistryBusy),
    #[error("failed to encode event: {0}")]
    Encode(#[from] serde_json::Error),
}

pub struct Webserver {
    ctx: Arc<ServerContext>,
    registry: Registry,
    next_socket: AtomicU64,
}

impl Webserver {
    pub fn new(config: Config, handler: Arc<dyn EventHandler>) -> Self {
        let lock_timeout = config.limits.lock_timeout();
        Self {
            ctx: Arc::new(ServerContext::new(config, handler)),
            registry: Registry::new(lock_timeout),
            next_socket: AtomicU64::new(1),
        }
    }

    pub fn config(&self) -> &Config {
        &self.ctx.config
    }

    pub fn context(&self) -> &Arc<ServerContext> {
        &self.ctx
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Registers a new socket. Frames passed to [`Webserver::send`] for it arrive on
    /// the returned receiver.
    pub async fn accept(
        &self,
        remote: SocketAddr,
    ) -> Result<(Connection, mpsc::UnboundedReceiver<Vec<u8>>), BufferError> {
        let socket = SocketId(self.next_socket.fetch_add(1, Ordering::Relaxed));
        let upgraded = Arc::new(AtomicBool::new(false));
        let connection = Connection::new(socket, remote, self.ctx.clone(), upgraded.clone())?;
        let (tx, rx) = mpsc::unbounded_channel();
        if let Err(e) = self.registry.insert(socket, Peer::new(remote, tx, upgraded)).await {
            tracing::warn!(socket = %socket, error = %e, "socket not registered, sends will fail");
        }
        Ok((connection, rx))
    }

    /// Forgets a socket. The connection itself is dropped by its driver.
    pub async fn close(&self, socket: SocketId) {
        if let Err(e) = self.registry.remove(socket).await {
            tracing::warn!(socket = %socket, error = %e, "socket not unregistered");
        }
    }

    /// Sends `event` as a text message to an upgraded socket.
    pub async fn send(&self, socket: SocketId, event: &Event) -> Result<(), SendError> {
        let peer = self
            .registry
            .get(socket)
            .await?
            .ok_or(SendError::UnknownSocket(socket))?;
        if !peer.is_upgraded() {
            return Err(SendError::NotUpgraded(socket));
        }
        let payload = event.to_vec()?;
        let frames = encode_message(Opcode::Text, &payload, self.ctx.config.limits.ws_chunk_size);
        peer.outbound.send(frames).map_err(|_| SendError::Closed(socket))
    }
}
