//! Deferred peer feedback
//!
//! Every peer exchange produces a [`PeerFeedback`] token. The caller judges the outcome after
//! the fact and records it on the token, which forwards the event to every listener
//! registered with the issuing client.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

use crate::network::types::PeerId;

/// An object wishing to receive peer feedback notifications from a client
pub trait ClientListener: Send + Sync {
    /// Called on a successful protocol interaction with a peer
    fn record_success(&self, peer_id: &PeerId, latency: Duration);

    /// Called on an unsuccessful protocol interaction with a peer
    fn record_failure(&self, peer_id: &PeerId, latency: Duration);

    /// Called when a malicious protocol interaction with a peer is detected
    fn record_bad_peer(&self, peer_id: &PeerId);
}

/// Set of registered listeners keyed by identity
///
/// Notifications take the read lock, registration changes take the write lock.
#[derive(Default)]
pub struct ListenerSet {
    listeners: RwLock<HashMap<usize, Arc<dyn ClientListener>>>,
}

fn listener_key(listener: &Arc<dyn ClientListener>) -> usize {
    Arc::as_ptr(listener) as *const () as usize
}

impl ListenerSet {
    /// Create an empty listener set
    pub fn new() -> Self {
        Self {
            listeners: RwLock::new(HashMap::new()),
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<usize, Arc<dyn ClientListener>>> {
        self.listeners.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<usize, Arc<dyn ClientListener>>> {
        self.listeners.write().unwrap_or_else(|e| e.into_inner())
    }

    /// Register a listener; returns false if it was already registered
    pub fn register(&self, listener: Arc<dyn ClientListener>) -> bool {
        self.write().insert(listener_key(&listener), listener).is_none()
    }

    /// Unregister a listener; returns false if it was not registered
    pub fn unregister(&self, listener: &Arc<dyn ClientListener>) -> bool {
        self.write().remove(&listener_key(listener)).is_some()
    }

    /// Check if a listener is registered
    pub fn contains(&self, listener: &Arc<dyn ClientListener>) -> bool {
        self.read().contains_key(&listener_key(listener))
    }

    /// Get the number of registered listeners
    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    pub fn notify_success(&self, peer_id: &PeerId, latency: Duration) {
        for listener in self.read().values() {
            listener.record_success(peer_id, latency);
        }
    }

    pub fn notify_failure(&self, peer_id: &PeerId, latency: Duration) {
        for listener in self.read().values() {
            listener.record_failure(peer_id, latency);
        }
    }

    pub fn notify_bad_peer(&self, peer_id: &PeerId) {
        for listener in self.read().values() {
            listener.record_bad_peer(peer_id);
        }
    }
}

/// Deferred feedback on a single peer interaction
///
/// The peer identity and latency are fixed at creation. A no-op token (see
/// [`PeerFeedback::nop`]) discards every record call and reports the empty peer identity.
#[derive(Clone)]
pub struct PeerFeedback {
    peer_id: PeerId,
    latency: Duration,
    listeners: Option<Arc<ListenerSet>>,
}

impl PeerFeedback {
    pub(crate) fn new(peer_id: PeerId, latency: Duration, listeners: Arc<ListenerSet>) -> Self {
        Self {
            peer_id,
            latency,
            listeners: Some(listeners),
        }
    }

    /// Create a no-op peer feedback instance
    pub fn nop() -> Self {
        Self {
            peer_id: PeerId::empty(),
            latency: Duration::ZERO,
            listeners: None,
        }
    }

    /// Record a successful protocol interaction with the peer
    pub fn record_success(&self) {
        if let Some(listeners) = &self.listeners {
            listeners.notify_success(&self.peer_id, self.latency);
        }
    }

    /// Record an unsuccessful protocol interaction with the peer
    pub fn record_failure(&self) {
        if let Some(listeners) = &self.listeners {
            listeners.notify_failure(&self.peer_id, self.latency);
        }
    }

    /// Record a malicious protocol interaction with the peer
    ///
    /// The peer will be ignored during peer selection.
    pub fn record_bad_peer(&self) {
        if let Some(listeners) = &self.listeners {
            listeners.notify_bad_peer(&self.peer_id);
        }
    }

    /// The peer this feedback refers to
    pub fn peer_id(&self) -> &PeerId {
        &self.peer_id
    }

    /// Time taken by the exchange with the peer
    pub fn latency(&self) -> Duration {
        self.latency
    }

    /// Check if this is a no-op token
    pub fn is_nop(&self) -> bool {
        self.listeners.is_none()
    }
}

impl Default for PeerFeedback {
    fn default() -> Self {
        Self::nop()
    }
}

impl fmt::Debug for PeerFeedback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PeerFeedback")
            .field("peer_id", &self.peer_id)
            .field("latency", &self.latency)
            .field("nop", &self.is_nop())
            .finish()
    }
}
