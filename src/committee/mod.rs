//! Committee tracking and enclave calls
//!
//! A [`NodeTracker`] follows the committee of one service on the chain and keeps the mapping
//! from members to peer identities. [`CommitteeClientWrapper`] ties a tracker to a
//! [`CommitteeClient`] and hands the feedback of each call over to the next one.

pub mod backend;
pub mod client;
pub mod tracker;
pub mod types;
pub mod wrapper;

pub use backend::{ChainBackend, MemoryChain, PeerTagger, StatusBroker};
pub use client::{
    protocol_id, CallEnclaveHandler, CallEnclaveRequest, CallEnclaveResponse, CommitteeClient,
    Enclave, METHOD_CALL_ENCLAVE,
};
pub use tracker::{Initialized, NodeTracker};
pub use types::{CallKind, ImportanceKind, MemberId, Namespace, PeerVerdict, ServiceStatus};
pub use wrapper::CommitteeClientWrapper;
