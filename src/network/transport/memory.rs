use std::io;
use std::sync::Arc;
use dashmap::DashMap;
use log::debug;
use tokio::io::duplex;

use crate::network::rpc::server::{serve_stream, MethodRegistry};
use crate::network::transport::{BoxedStream, Host};
use crate::network::types::{PeerId, ProtocolId};

/// Buffer size of each in-memory pipe
const PIPE_CAPACITY: usize = 64 * 1024;

/// In-process transport host
///
/// Every registered peer serves a method registry for one protocol. Each stream is a fresh
/// in-memory pipe whose remote end is served in its own task.
#[derive(Default, Clone)]
pub struct MemoryHost {
    /// Registries by peer and protocol
    peers: Arc<DashMap<(PeerId, ProtocolId), Arc<MethodRegistry>>>,
}

impl MemoryHost {
    /// Create a new host with no peers
    pub fn new() -> Self {
        Self {
            peers: Arc::new(DashMap::new()),
        }
    }

    /// Connect a peer serving the given registry
    pub fn add_peer(&self, peer: PeerId, protocol: ProtocolId, registry: MethodRegistry) {
        debug!("Added in-memory peer {} for protocol {}", peer, protocol);
        self.peers.insert((peer, protocol), Arc::new(registry));
    }

    /// Disconnect a peer from all protocols
    pub fn remove_peer(&self, peer: &PeerId) {
        self.peers.retain(|(p, _), _| p != peer);
    }

    /// Get the number of connected (peer, protocol) pairs
    pub fn peer_count(&self) -> usize {
        self.peers.len()
    }
}

#[async_trait::async_trait]
impl Host for MemoryHost {
    async fn new_stream(&self, peer: &PeerId, protocol: &ProtocolId) -> io::Result<BoxedStream> {
        let registry = self
            .peers
            .get(&(peer.clone(), protocol.clone()))
            .map(|entry| entry.value().clone())
            .ok_or_else(|| {
                io::Error::new(
                    io::ErrorKind::NotConnected,
                    format!("peer {} is not connected", peer),
                )
            })?;

        let (local, remote) = duplex(PIPE_CAPACITY);
        let peer = peer.clone();
        tokio::spawn(async move {
            if let Err(e) = serve_stream(remote, &registry).await {
                debug!("In-memory peer {} failed to serve stream: {}", peer, e);
            }
        });

        Ok(Box::new(local))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_unknown_peer_not_connected() {
        let host = MemoryHost::new();
        let protocol = ProtocolId::new("/test/1.0.0");

        let err = host.new_stream(&PeerId::from("nobody"), &protocol).await.err().unwrap();
        assert_eq!(err.kind(), io::ErrorKind::NotConnected);
    }

    #[tokio::test]
    async fn test_add_and_remove_peer() {
        let host = MemoryHost::new();
        let protocol = ProtocolId::new("/test/1.0.0");
        let peer = PeerId::from("peer1");

        host.add_peer(peer.clone(), protocol.clone(), MethodRegistry::new());
        assert_eq!(host.peer_count(), 1);
        assert!(host.new_stream(&peer, &protocol).await.is_ok());

        // A different protocol on the same peer is not served
        let other = ProtocolId::new("/other/1.0.0");
        assert!(host.new_stream(&peer, &other).await.is_err());

        host.remove_peer(&peer);
        assert_eq!(host.peer_count(), 0);
        assert!(host.new_stream(&peer, &protocol).await.is_err());
    }
}
