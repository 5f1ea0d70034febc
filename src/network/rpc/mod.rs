//! Peer-routing RPC
//!
//! The [`Client`] routes method calls to one peer, to the first working peer of an ordered
//! list, or to many peers in parallel. Every exchange yields a [`PeerFeedback`] token that
//! lets the caller report on the peer once the outcome is known.

pub mod client;
pub mod feedback;
pub mod options;
pub mod retry;
pub mod server;

pub use client::Client;
pub use feedback::{ClientListener, ListenerSet, PeerFeedback};
pub use options::{AggregateFn, CallMultiOptions, CallOptions, ValidationFn};
pub use server::{serve_stream, MethodHandler, MethodRegistry};
