use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use dashmap::DashMap;
use log::{debug, error, info, warn};
use serde::{Serialize, Deserialize};
use tokio::net::{TcpListener, TcpStream};
use tokio::time::timeout;

use crate::network::codec::{CodecError, FramedStream};
use crate::network::rpc::server::{serve_stream, MethodRegistry};
use crate::network::transport::{BoxedStream, Host};
use crate::network::types::{PeerId, ProtocolId};

/// Time a server waits for the protocol handshake of a new connection
const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

/// Method registries served over TCP, by protocol
pub type ProtocolRegistries = DashMap<ProtocolId, Arc<MethodRegistry>>;

/// Server answer to the protocol a connection asked for
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
enum HandshakeReply {
    Accepted,
    UnsupportedProtocol,
}

/// Transport host dialing peers over TCP
///
/// Peers are looked up in an address book; every stream is a fresh connection.
pub struct TcpHost {
    /// Map of peer IDs to addresses
    addresses: DashMap<PeerId, SocketAddr>,

    /// Connection timeout
    connect_timeout: Duration,
}

impl TcpHost {
    /// Create a new TCP host
    pub fn new(connect_timeout: Duration) -> Self {
        Self {
            addresses: DashMap::new(),
            connect_timeout,
        }
    }

    /// Add or replace the address of a peer
    pub fn add_address(&self, peer: PeerId, addr: SocketAddr) {
        self.addresses.insert(peer, addr);
    }

    /// Remove the address of a peer
    pub fn remove_address(&self, peer: &PeerId) -> Option<SocketAddr> {
        self.addresses.remove(peer).map(|(_, addr)| addr)
    }

    /// Get the address of a peer
    pub fn address(&self, peer: &PeerId) -> Option<SocketAddr> {
        self.addresses.get(peer).map(|entry| *entry.value())
    }
}

#[async_trait::async_trait]
impl Host for TcpHost {
    async fn new_stream(&self, peer: &PeerId, protocol: &ProtocolId) -> io::Result<BoxedStream> {
        let addr = self.address(peer).ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::NotConnected,
                format!("no address known for peer {}", peer),
            )
        })?;

        debug!("Opening {} stream to peer {} at {}", protocol, peer, addr);
        let stream = connect_to_peer(addr, self.connect_timeout).await?;
        stream.set_nodelay(true)?;

        let mut framed = FramedStream::new(stream);
        match timeout(self.connect_timeout, handshake(&mut framed, protocol)).await {
            Ok(result) => result?,
            Err(_) => {
                return Err(io::Error::new(io::ErrorKind::TimedOut, "protocol handshake timed out"));
            }
        }

        Ok(Box::new(framed.into_inner()))
    }
}

/// Ask the peer to serve the given protocol on this connection
async fn handshake(framed: &mut FramedStream<TcpStream>, protocol: &ProtocolId) -> io::Result<()> {
    framed.write_message(protocol).await.map_err(into_io_error)?;

    match framed.expect_message::<HandshakeReply>().await.map_err(into_io_error)? {
        HandshakeReply::Accepted => Ok(()),
        HandshakeReply::UnsupportedProtocol => Err(io::Error::new(
            io::ErrorKind::Unsupported,
            format!("peer does not support protocol {}", protocol),
        )),
    }
}

fn into_io_error(err: CodecError) -> io::Error {
    match err {
        CodecError::Io(e) => e,
        other => io::Error::new(io::ErrorKind::InvalidData, other),
    }
}

/// Connect to a peer with timeout
pub async fn connect_to_peer(addr: SocketAddr, connect_timeout: Duration) -> io::Result<TcpStream> {
    match timeout(connect_timeout, TcpStream::connect(addr)).await {
        Ok(Ok(stream)) => {
            debug!("Connected to peer {}", addr);
            Ok(stream)
        }
        Ok(Err(e)) => {
            debug!("Failed to connect to peer {}: {}", addr, e);
            Err(e)
        }
        Err(_) => {
            debug!("Connection to peer {} timed out", addr);
            Err(io::Error::new(io::ErrorKind::TimedOut, "Connection timed out"))
        }
    }
}

/// Accept connections and serve one request per connection
///
/// Each connection starts with the protocol it wants; connections asking for a protocol
/// without a registry are refused. Runs until accepting fails with a non-transient error.
pub async fn serve_tcp(listener: TcpListener, protocols: Arc<ProtocolRegistries>) -> io::Result<()> {
    info!("Serving RPC requests on {}", listener.local_addr()?);

    loop {
        match listener.accept().await {
            Ok((stream, addr)) => {
                debug!("Accepted connection from {}", addr);

                let protocols = protocols.clone();
                tokio::spawn(async move {
                    if let Err(e) = serve_connection(stream, &protocols).await {
                        error!("Failed to serve connection from {}: {}", addr, e);
                    }
                });
            }
            Err(e) if e.kind() == io::ErrorKind::ConnectionAborted => {
                debug!("Connection aborted before accept: {}", e);
            }
            Err(e) => {
                error!("Error accepting connection: {}", e);
                return Err(e);
            }
        }
    }
}

async fn serve_connection(stream: TcpStream, protocols: &ProtocolRegistries) -> Result<(), CodecError> {
    let mut framed = FramedStream::new(stream);

    let protocol: ProtocolId = match timeout(HANDSHAKE_TIMEOUT, framed.read_message()).await {
        Ok(Ok(Some(protocol))) => protocol,
        Ok(Ok(None)) => return Ok(()),
        Ok(Err(e)) => return Err(e),
        Err(_) => return Err(CodecError::Timeout),
    };

    let registry = protocols.get(&protocol).map(|entry| entry.value().clone());
    let registry = match registry {
        Some(registry) => registry,
        None => {
            warn!("Refusing connection for unsupported protocol {}", protocol);
            framed.write_message(&HandshakeReply::UnsupportedProtocol).await?;
            if let Err(e) = framed.close().await {
                debug!("Failed to close refused connection: {}", e);
            }
            return Ok(());
        }
    };

    framed.write_message(&HandshakeReply::Accepted).await?;
    serve_stream(framed.into_inner(), &registry).await
}
