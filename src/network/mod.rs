// Network Module
//
// This module provides the peer-to-peer request/response layer:
// - Peer and protocol identities, request and response messages
// - Length-prefixed framing of messages over a stream
// - Transports that open streams to peers (in-memory and TCP)
// - The RPC client, its call options and the peer feedback channel

pub mod types;
pub mod codec;
pub mod transport;
pub mod rpc;
