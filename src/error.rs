use std::io;

use crate::network::codec::CodecError;
use crate::network::rpc::PeerFeedback;
use crate::network::types::PeerId;

/// Errors produced by the RPC client and the committee wrapper
#[derive(Debug, thiserror::Error)]
pub enum RpcError {
    /// The stream to the peer could not be opened
    #[error("failed to open stream: {0}")]
    StreamOpen(#[source] io::Error),

    /// The request could not be written before the write deadline
    #[error("failed to send request: {0}")]
    Send(#[source] CodecError),

    /// The response could not be read before the response deadline
    #[error("failed to read response: {0}")]
    Receive(#[source] CodecError),

    /// The request body could not be encoded
    #[error("failed to encode request body: {0}")]
    Encode(#[source] bincode::Error),

    /// The response body could not be decoded into the expected type
    #[error("failed to decode response body: {0}")]
    Decode(#[source] bincode::Error),

    /// The peer answered with a structured application error
    #[error("remote error (module: {module}, code: {code}): {message}")]
    Remote {
        module: String,
        code: u32,
        message: String,
    },

    /// Every attempt on every peer failed
    ///
    /// Carries the feedback for the last peer contacted so that the caller can still
    /// penalize it.
    #[error("no peer could service the request")]
    NoPeerAvailable { last_peer: Option<PeerFeedback> },

    /// The caller's context was cancelled
    #[error("call cancelled")]
    Cancelled,

    /// No client is configured for the requested service
    #[error("{0} not available")]
    NotAvailable(String),

    /// The responding peer does not map to a known member
    #[error("unknown peer id: {0}")]
    UnknownPeer(PeerId),

    /// A member could not be resolved to a peer identity
    #[error("failed to resolve member: {0}")]
    Resolution(String),
}

impl RpcError {
    /// Feedback for the last peer contacted, if the error carries one
    pub fn last_peer(&self) -> Option<&PeerFeedback> {
        match self {
            RpcError::NoPeerAvailable { last_peer } => last_peer.as_ref(),
            _ => None,
        }
    }
}

/// Result type for RPC operations
pub type Result<T> = std::result::Result<T, RpcError>;
