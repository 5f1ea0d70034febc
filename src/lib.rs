// p2p-rpc - Peer-routing RPC layer with deferred peer feedback

pub mod committee;
pub mod config;
pub mod error;
pub mod network;

pub use error::{Result, RpcError};
pub use network::rpc::{
    CallMultiOptions, CallOptions, Client, ClientListener, PeerFeedback,
};
pub use network::types::{PeerId, ProtocolId, Request, Response, ResponseError};

// Initialize logging
pub fn init_logger() {
    env_logger::init();
}
