use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use log::{debug, info, warn};
use tokio::runtime::Handle;
use tokio::sync::{broadcast, watch};
use tokio_util::sync::CancellationToken;

use crate::committee::backend::{ChainBackend, PeerTagger};
use crate::committee::types::{ImportanceKind, MemberId, Namespace, ServiceStatus};
use crate::network::types::PeerId;

/// Signal fired once a tracker has built its first member map
#[derive(Clone, Debug)]
pub struct Initialized {
    rx: watch::Receiver<bool>,
}

impl Initialized {
    /// A signal that has already fired
    pub fn ready() -> Self {
        let (_, rx) = watch::channel(true);
        Self { rx }
    }

    pub fn is_initialized(&self) -> bool {
        *self.rx.borrow()
    }

    /// Wait for the signal to fire
    ///
    /// Returns false if the tracker went away before it was initialized.
    pub async fn wait(&self) -> bool {
        let mut rx = self.rx.clone();
        loop {
            if *rx.borrow_and_update() {
                return true;
            }
            if rx.changed().await.is_err() {
                return *rx.borrow();
            }
        }
    }
}

/// Tracks committee members of one service and their peer identities
pub struct NodeTracker {
    service_id: Namespace,
    backend: Arc<dyn ChainBackend>,
    tagger: Option<Arc<dyn PeerTagger>>,

    /// Member map; only ever replaced as a whole
    nodes: Mutex<HashMap<MemberId, PeerId>>,

    init_tx: watch::Sender<bool>,

    /// Cancels the tracking task while it runs
    task: Mutex<Option<CancellationToken>>,
}

impl NodeTracker {
    pub fn new(
        service_id: Namespace,
        backend: Arc<dyn ChainBackend>,
        tagger: Option<Arc<dyn PeerTagger>>,
    ) -> Arc<Self> {
        let (init_tx, _) = watch::channel(false);

        Arc::new(Self {
            service_id,
            backend,
            tagger,
            nodes: Mutex::new(HashMap::new()),
            init_tx,
            task: Mutex::new(None),
        })
    }

    pub fn service_id(&self) -> &Namespace {
        &self.service_id
    }

    /// Start tracking on the given runtime if not already running
    ///
    /// Returns whether a task was started.
    pub fn start(self: &Arc<Self>, runtime: &Handle) -> bool {
        let mut task = lock(&self.task);
        if task.is_some() {
            return false;
        }

        let token = CancellationToken::new();
        *task = Some(token.clone());

        // Subscribe before spawning so no status published after start is missed
        let statuses = self.backend.watch_statuses();
        let tracker = self.clone();
        runtime.spawn(async move {
            debug!("Starting node tracker for service {}", tracker.service_id);
            tracker.track(token, statuses).await;
            debug!("Node tracker for service {} stopped", tracker.service_id);
        });

        true
    }

    /// Stop tracking if running
    pub fn stop(&self) {
        if let Some(token) = lock(&self.task).take() {
            token.cancel();
        }
    }

    pub fn is_running(&self) -> bool {
        lock(&self.task).is_some()
    }

    /// Signal fired once the first member map has been built
    pub fn initialized(&self) -> Initialized {
        Initialized {
            rx: self.init_tx.subscribe(),
        }
    }

    /// Peer identities of the given members, keyed by peer
    ///
    /// An empty filter selects every known member. Unknown members are left out.
    pub fn nodes(&self, filter: &[MemberId]) -> HashMap<PeerId, MemberId> {
        let nodes = lock(&self.nodes);

        if filter.is_empty() {
            return nodes.iter().map(|(member, peer)| (peer.clone(), *member)).collect();
        }

        filter
            .iter()
            .filter_map(|member| nodes.get(member).map(|peer| (peer.clone(), *member)))
            .collect()
    }

    async fn track(&self, token: CancellationToken, mut statuses: broadcast::Receiver<Arc<ServiceStatus>>) {
        loop {
            let status = tokio::select! {
                _ = token.cancelled() => return,
                status = statuses.recv() => match status {
                    Ok(status) => status,
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!("Node tracker for service {} skipped {} status updates", self.service_id, skipped);
                        continue;
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        warn!("Status stream closed, node tracker for service {} exiting", self.service_id);
                        return;
                    }
                },
            };

            if status.id != self.service_id {
                continue;
            }

            tokio::select! {
                _ = token.cancelled() => return,
                _ = self.apply_status(&status) => {}
            }
        }
    }

    async fn apply_status(&self, status: &ServiceStatus) {
        if !status.is_initialized || status.nodes.is_empty() {
            warn!(
                "Service {} not initialized or has no nodes (initialized: {}, nodes: {})",
                status.id,
                status.is_initialized,
                status.nodes.len()
            );
            return;
        }

        let mut nodes = HashMap::with_capacity(status.nodes.len());
        let mut peers = Vec::with_capacity(status.nodes.len());
        for member in &status.nodes {
            match self.backend.resolve_member(member).await {
                Ok(peer) => {
                    nodes.insert(*member, peer.clone());
                    peers.push(peer);
                }
                Err(e) => {
                    warn!("Failed to resolve node {}: {}", member, e);
                }
            }
        }

        if let Some(tagger) = &self.tagger {
            tagger.set_peer_importance(ImportanceKind::CommitteeMember, &self.service_id, &peers);
        }

        *lock(&self.nodes) = nodes;

        self.init_tx.send_if_modified(|initialized| {
            if *initialized {
                return false;
            }
            info!("Service {} is initialized with {} nodes", status.id, peers.len());
            *initialized = true;
            true
        });
    }
}

impl Drop for NodeTracker {
    fn drop(&mut self) {
        self.stop();
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
