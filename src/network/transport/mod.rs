//! Stream transports
//!
//! The RPC client only needs one operation from the transport: open a fresh bidirectional
//! stream to a peer for a given protocol. Deadlines are applied by the client around each
//! read and write, and the stream is closed by shutting down its write side.

pub mod memory;
pub mod tcp;

use std::io;
use tokio::io::{AsyncRead, AsyncWrite};

use crate::network::types::{PeerId, ProtocolId};

pub use memory::MemoryHost;
pub use tcp::{serve_tcp, ProtocolRegistries, TcpHost};

/// A bidirectional byte stream to a peer
pub trait PeerStream: AsyncRead + AsyncWrite + Send + Unpin {}

impl<T: AsyncRead + AsyncWrite + Send + Unpin> PeerStream for T {}

/// Boxed peer stream returned by hosts
pub type BoxedStream = Box<dyn PeerStream>;

/// A transport host able to open streams to connected peers
#[async_trait::async_trait]
pub trait Host: Send + Sync {
    /// Open a new stream to the given peer for the given protocol
    ///
    /// Hosts should only use existing connections; it is up to callers to supply peers
    /// that are connected and support the protocol.
    async fn new_stream(&self, peer: &PeerId, protocol: &ProtocolId) -> io::Result<BoxedStream>;
}
