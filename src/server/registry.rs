//! Socket registry shared between the listener and application senders.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use thiserror::Error;
use tokio::sync::{Mutex, MutexGuard, mpsc};
use tokio::time::timeout;

use crate::server::SocketId;

/// The registry lock was not acquired within the configured timeout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("registry lock not acquired within {0:?}")]
pub struct RegistryBusy(pub Duration);

/// Handle to a live socket's driver task.
#[derive(Debug, Clone)]
pub struct Peer {
    pub remote: SocketAddr,
    /// Pre-encoded frames for the driver to write.
    pub outbound: mpsc::UnboundedSender<Vec<u8>>,
    upgraded: Arc<AtomicBool>,
}

impl Peer {
    pub fn new(remote: SocketAddr, outbound: mpsc::UnboundedSender<Vec<u8>>, upgraded: Arc<AtomicBool>) -> Self {
        Self { remote, outbound, upgraded }
    }

    /// True once the socket completed the WebSocket handshake.
    pub fn is_upgraded(&self) -> bool {
        self.upgraded.load(Ordering::Acquire)
    }
}

#[derive(Debug)]
pub struct Registry {
    peers: Mutex<HashMap<SocketId, Peer>>,
    lock_timeout: Duration,
}

impl Registry {
    pub fn new(lock_timeout: Duration) -> Self {
        Self {
            peers: Mutex::new(HashMap::new()),
            lock_timeout,
        }
    }

    async fn lock(&self) -> Result<MutexGuard<'_, HashMap<SocketId, Peer>>, RegistryBusy> {
        timeout(self.lock_timeout, self.peers.lock()).await.map_err(|_| {
            tracing::warn!(timeout = ?self.lock_timeout, "registry lock timed out");
            RegistryBusy(self.lock_timeout)
        })
    }

    pub async fn insert(&self, socket: SocketId, peer: Peer) -> Result<(), RegistryBusy> {
        self.lock().await?.insert(socket, peer);
        Ok(())
    }

    pub async fn remove(&self, socket: SocketId) -> Result<Option<Peer>, RegistryBusy> {
        Ok(self.lock().await?.remove(&socket))
    }

    pub async fn get(&self, socket: SocketId) -> Result<Option<Peer>, RegistryBusy> {
        Ok(self.lock().await?.get(&socket).cloned())
    }

    pub async fn len(&self) -> Result<usize, RegistryBusy> {
        Ok(self.lock().await?.len())
    }

    #[cfg(test)]
    pub(crate) async fn hold(&self) -> Result<MutexGuard<'_, HashMap<SocketId, Peer>>, RegistryBusy> {
        self.lock().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn held_lock_times_out() {
        let registry = Registry::new(Duration::from_millis(20));
        let _guard = registry.hold().await.unwrap();

        assert_eq!(registry.len().await, Err(RegistryBusy(Duration::from_millis(20))));
    }
}
