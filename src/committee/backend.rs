//! Collaborators of the committee tracker
//!
//! The tracker learns committee membership from the chain ([`ChainBackend`]) and tells the
//! transport which peers to keep connected ([`PeerTagger`]). [`StatusBroker`] and
//! [`MemoryChain`] are in-process implementations used when embedding the tracker.

use std::sync::Arc;
use dashmap::DashMap;
use log::debug;
use tokio::sync::broadcast;

use crate::committee::types::{ImportanceKind, MemberId, Namespace, ServiceStatus};
use crate::error::{Result, RpcError};
use crate::network::types::PeerId;

/// Capacity of status subscriptions before receivers start lagging
const STATUS_CHANNEL_CAPACITY: usize = 64;

/// Chain state needed to track a committee
#[async_trait::async_trait]
pub trait ChainBackend: Send + Sync {
    /// Subscribe to committee status updates for all services
    fn watch_statuses(&self) -> broadcast::Receiver<Arc<ServiceStatus>>;

    /// Resolve a member to its transport peer identity
    async fn resolve_member(&self, member: &MemberId) -> Result<PeerId>;
}

/// Receiver of peer importance notifications
pub trait PeerTagger: Send + Sync {
    /// Mark the given peers as important for the given purpose
    ///
    /// Replaces any previous set for the same kind and service.
    fn set_peer_importance(&self, kind: ImportanceKind, id: &Namespace, peers: &[PeerId]);
}

/// Broadcast hub for committee status updates
#[derive(Clone)]
pub struct StatusBroker {
    sender: broadcast::Sender<Arc<ServiceStatus>>,
}

impl StatusBroker {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(STATUS_CHANNEL_CAPACITY);
        Self { sender }
    }

    /// Publish a status to all subscribers; returns the number of subscribers reached
    pub fn publish(&self, status: ServiceStatus) -> usize {
        debug!("Publishing status for service {}", status.id);
        self.sender.send(Arc::new(status)).unwrap_or(0)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Arc<ServiceStatus>> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for StatusBroker {
    fn default() -> Self {
        Self::new()
    }
}

/// In-process chain backend with a static node directory
#[derive(Clone, Default)]
pub struct MemoryChain {
    broker: StatusBroker,
    directory: Arc<DashMap<MemberId, PeerId>>,
}

impl MemoryChain {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the peer identity of a member
    pub fn register_node(&self, member: MemberId, peer: PeerId) {
        self.directory.insert(member, peer);
    }

    /// Remove a member from the directory
    pub fn deregister_node(&self, member: &MemberId) {
        self.directory.remove(member);
    }

    /// Publish a status update
    pub fn publish(&self, status: ServiceStatus) -> usize {
        self.broker.publish(status)
    }

    pub fn broker(&self) -> &StatusBroker {
        &self.broker
    }
}

#[async_trait::async_trait]
impl ChainBackend for MemoryChain {
    fn watch_statuses(&self) -> broadcast::Receiver<Arc<ServiceStatus>> {
        self.broker.subscribe()
    }

    async fn resolve_member(&self, member: &MemberId) -> Result<PeerId> {
        self.directory
            .get(member)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| RpcError::Resolution(format!("node {} not registered", member)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_status_broker() {
        let broker = StatusBroker::new();

        // Nobody listening yet
        let status = ServiceStatus {
            id: Namespace::new([1; 32]),
            is_initialized: true,
            nodes: vec![MemberId::new([2; 32])],
        };
        assert_eq!(broker.publish(status.clone()), 0);

        let mut rx = broker.subscribe();
        assert_eq!(broker.subscriber_count(), 1);
        assert_eq!(broker.publish(status.clone()), 1);

        let received = rx.recv().await.unwrap();
        assert_eq!(*received, status);
    }

    #[tokio::test]
    async fn test_memory_chain_directory() {
        let chain = MemoryChain::new();
        let member = MemberId::new([3; 32]);

        assert!(matches!(
            chain.resolve_member(&member).await,
            Err(RpcError::Resolution(_))
        ));

        chain.register_node(member, PeerId::from("peer3"));
        assert_eq!(chain.resolve_member(&member).await.unwrap(), PeerId::from("peer3"));

        chain.deregister_node(&member);
        assert!(chain.resolve_member(&member).await.is_err());
    }
}
