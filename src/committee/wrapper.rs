use std::sync::{Arc, Mutex, MutexGuard};
use log::debug;
use rand::seq::SliceRandom;
use tokio::runtime::Handle;
use tokio_util::sync::CancellationToken;

use crate::committee::backend::{ChainBackend, PeerTagger};
use crate::committee::client::{CallEnclaveRequest, CommitteeClient};
use crate::committee::tracker::{Initialized, NodeTracker};
use crate::committee::types::{CallKind, MemberId, Namespace, PeerVerdict};
use crate::config::Config;
use crate::error::{Result, RpcError};
use crate::network::rpc::PeerFeedback;
use crate::network::transport::Host;
use crate::network::types::PeerId;

#[derive(Default)]
struct WrapperState {
    id: Option<Namespace>,
    client: Option<Arc<CommitteeClient>>,
    tracker: Option<Arc<NodeTracker>>,

    /// Feedback of the previous call, judged on the next one
    last_peer_feedback: Option<PeerFeedback>,
}

/// Committee client that is configured once the service id is known
///
/// Also forwards the caller's verdict on each call to the peer that served the previous one.
pub struct CommitteeClientWrapper {
    state: Mutex<WrapperState>,
    host: Option<Arc<dyn Host>>,
    backend: Arc<dyn ChainBackend>,
    tagger: Option<Arc<dyn PeerTagger>>,
    chain_context: String,
    config: Config,

    /// Runtime running the trackers
    runtime: Option<Handle>,
}

impl CommitteeClientWrapper {
    pub fn new(host: Option<Arc<dyn Host>>, backend: Arc<dyn ChainBackend>, chain_context: &str) -> Self {
        Self {
            state: Mutex::new(WrapperState::default()),
            host,
            backend,
            tagger: None,
            chain_context: chain_context.to_string(),
            config: Config::default(),
            runtime: Handle::try_current().ok(),
        }
    }

    /// Set the peer-importance collaborator notified by trackers
    pub fn with_peer_tagger(mut self, tagger: Arc<dyn PeerTagger>) -> Self {
        self.tagger = Some(tagger);
        self
    }

    pub fn with_config(mut self, config: Config) -> Self {
        self.config = config;
        self
    }

    /// Run trackers on the given runtime instead of the one current at construction
    pub fn with_runtime(mut self, runtime: Handle) -> Self {
        self.runtime = Some(runtime);
        self
    }

    pub fn service_id(&self) -> Option<Namespace> {
        self.state().id
    }

    /// Committee client of the configured service, if any
    pub fn client(&self) -> Option<Arc<CommitteeClient>> {
        self.state().client.clone()
    }

    /// Configure the service to call
    ///
    /// Setting the current id again does nothing. Any other change drops the previous client
    /// and tracker together with the stored feedback. Fails without changing anything if a
    /// tracker is needed but no runtime is available to run it.
    pub fn set_service_id(&self, id: Option<Namespace>) -> Result<()> {
        let mut state = self.state();

        if state.id == id {
            return Ok(());
        }

        let runtime = match id {
            Some(_) => Some(
                self.runtime
                    .clone()
                    .or_else(|| Handle::try_current().ok())
                    .ok_or_else(|| RpcError::NotAvailable("tokio runtime".to_string()))?,
            ),
            None => None,
        };

        debug!("Committee service updated to {:?}", id);
        state.id = id;

        if let Some(tracker) = state.tracker.take() {
            tracker.stop();
        }

        state.client = None;
        if let (Some(id), Some(runtime)) = (id, runtime) {
            let client = CommitteeClient::new(self.host.clone(), &self.chain_context, id, &self.config);
            let tracker = NodeTracker::new(id, self.backend.clone(), self.tagger.clone());
            tracker.start(&runtime);

            state.client = Some(Arc::new(client));
            state.tracker = Some(tracker);
        }

        state.last_peer_feedback = None;

        Ok(())
    }

    /// Signal fired once the committee members are known
    ///
    /// Fires immediately when no service is configured.
    pub fn initialized(&self) -> Initialized {
        let state = self.state();
        match (&state.client, &state.tracker) {
            (Some(_), Some(tracker)) => tracker.initialized(),
            _ => Initialized::ready(),
        }
    }

    /// Call the enclave of a committee member
    ///
    /// `nodes` restricts the members to call; empty means all members. `verdict` judges the
    /// previous call; without one the previous call is recorded as a success.
    /// Returns the response data and the member that produced it.
    pub async fn call_enclave(
        &self,
        ctx: &CancellationToken,
        data: Vec<u8>,
        nodes: &[MemberId],
        kind: CallKind,
        verdict: Option<PeerVerdict>,
    ) -> Result<(Vec<u8>, MemberId)> {
        let (client, tracker, last_pf) = {
            let state = self.state();
            match (&state.client, &state.tracker) {
                (Some(client), Some(tracker)) => {
                    (client.clone(), tracker.clone(), state.last_peer_feedback.clone())
                }
                _ => return Err(RpcError::NotAvailable("committee".to_string())),
            }
        };

        if let Some(last_pf) = last_pf {
            // No verdict counts as success
            let verdict = verdict.unwrap_or(PeerVerdict::Success);
            debug!("Peer feedback {:?} for {}", verdict, last_pf.peer_id());

            match verdict {
                PeerVerdict::Success => last_pf.record_success(),
                PeerVerdict::Failure => last_pf.record_failure(),
                PeerVerdict::BadPeer => last_pf.record_bad_peer(),
            }
        }

        let members = tracker.nodes(nodes);
        let mut peers: Vec<PeerId> = members.keys().cloned().collect();
        peers.shuffle(&mut rand::thread_rng());

        let request = CallEnclaveRequest { data, kind };
        let (response, next_pf) = client.call_enclave(ctx, &request, &peers).await?;

        let member = *members
            .get(next_pf.peer_id())
            .ok_or_else(|| RpcError::UnknownPeer(next_pf.peer_id().clone()))?;

        {
            let mut state = self.state();
            // The service may have been reconfigured during the call
            if state.client.as_ref().map_or(false, |current| Arc::ptr_eq(current, &client)) {
                state.last_peer_feedback = Some(next_pf);
            }
        }

        Ok((response.data, member))
    }

    fn state(&self) -> MutexGuard<'_, WrapperState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Drop for CommitteeClientWrapper {
    fn drop(&mut self) {
        if let Some(tracker) = self.state().tracker.take() {
            tracker.stop();
        }
    }
}
