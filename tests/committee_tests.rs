use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;

use p2p_rpc::committee::{
    protocol_id, CallEnclaveHandler, CallKind, CommitteeClientWrapper, Enclave, ImportanceKind,
    MemberId, MemoryChain, Namespace, NodeTracker, PeerTagger, PeerVerdict, ServiceStatus,
};
use p2p_rpc::config::Config;
use p2p_rpc::network::transport::MemoryHost;
use p2p_rpc::{ClientListener, PeerId, ResponseError, RpcError};

const CHAIN: &str = "test-chain";
const WAIT: Duration = Duration::from_secs(5);

/// Enclave that prefixes responses with its own name
struct Named(&'static str);

#[async_trait::async_trait]
impl Enclave for Named {
    async fn call(&self, mut data: Vec<u8>, _kind: CallKind) -> Result<Vec<u8>, ResponseError> {
        let mut rsp = self.0.as_bytes().to_vec();
        rsp.append(&mut data);
        Ok(rsp)
    }
}

/// Enclave that answers after a delay
struct Slow(Duration);

#[async_trait::async_trait]
impl Enclave for Slow {
    async fn call(&self, data: Vec<u8>, _kind: CallKind) -> Result<Vec<u8>, ResponseError> {
        tokio::time::sleep(self.0).await;
        Ok(data)
    }
}

#[derive(Default)]
struct Recorder {
    events: Mutex<Vec<(&'static str, PeerId)>>,
}

impl ClientListener for Recorder {
    fn record_success(&self, peer_id: &PeerId, _latency: Duration) {
        self.events.lock().unwrap().push(("success", peer_id.clone()));
    }

    fn record_failure(&self, peer_id: &PeerId, _latency: Duration) {
        self.events.lock().unwrap().push(("failure", peer_id.clone()));
    }

    fn record_bad_peer(&self, peer_id: &PeerId) {
        self.events.lock().unwrap().push(("bad_peer", peer_id.clone()));
    }
}

#[derive(Default)]
struct Tags {
    peers: Mutex<Vec<PeerId>>,
}

impl PeerTagger for Tags {
    fn set_peer_importance(&self, kind: ImportanceKind, _id: &Namespace, peers: &[PeerId]) {
        assert_eq!(kind, ImportanceKind::CommitteeMember);
        *self.peers.lock().unwrap() = peers.to_vec();
    }
}

fn member(b: u8) -> MemberId {
    MemberId::new([b; 32])
}

fn status(id: Namespace, nodes: Vec<MemberId>) -> ServiceStatus {
    ServiceStatus {
        id,
        is_initialized: true,
        nodes,
    }
}

fn fast_config() -> Config {
    let mut config = Config::default();
    config.committee.max_retries = 0;
    config.committee.max_response_time_ms = 1_000;
    config
}

/// Chain with one registered member served over an in-memory host
fn single_member_setup(ns: Namespace) -> (MemoryHost, MemoryChain, PeerId) {
    let config = fast_config();
    let host = MemoryHost::new();
    let chain = MemoryChain::new();
    let peer = PeerId::from("member-1");

    chain.register_node(member(1), peer.clone());
    host.add_peer(
        peer.clone(),
        protocol_id(CHAIN, &ns, &config.committee.protocol_version),
        CallEnclaveHandler::registry(Arc::new(Named("m1:"))),
    );

    (host, chain, peer)
}

/// Two services on one chain, each with its own member
fn two_service_setup(
    (ns1, enclave1): (Namespace, Arc<dyn Enclave>),
    ns2: Namespace,
) -> (MemoryHost, MemoryChain, PeerId, PeerId) {
    let config = fast_config();
    let host = MemoryHost::new();
    let chain = MemoryChain::new();
    let (peer1, peer2) = (PeerId::from("member-1"), PeerId::from("member-2"));

    chain.register_node(member(1), peer1.clone());
    chain.register_node(member(2), peer2.clone());
    host.add_peer(
        peer1.clone(),
        protocol_id(CHAIN, &ns1, &config.committee.protocol_version),
        CallEnclaveHandler::registry(enclave1),
    );
    host.add_peer(
        peer2.clone(),
        protocol_id(CHAIN, &ns2, &config.committee.protocol_version),
        CallEnclaveHandler::registry(Arc::new(Named("m2:"))),
    );

    (host, chain, peer1, peer2)
}

/// Point the wrapper at a service, listen on its client and wait for its members
async fn switch_service(
    wrapper: &CommitteeClientWrapper,
    chain: &MemoryChain,
    recorder: &Arc<Recorder>,
    ns: Namespace,
    node: MemberId,
) {
    wrapper.set_service_id(Some(ns)).unwrap();
    wrapper.client().unwrap().rpc().register_listener(recorder.clone());
    chain.publish(status(ns, vec![node]));
    assert!(timeout(WAIT, wrapper.initialized().wait()).await.unwrap());
}

#[tokio::test]
async fn test_tracker_skips_unresolvable_members() {
    let ns = Namespace::new([1; 32]);
    let chain = MemoryChain::new();
    chain.register_node(member(1), PeerId::from("p1"));
    let tags = Arc::new(Tags::default());

    let tracker = NodeTracker::new(ns, Arc::new(chain.clone()), Some(tags.clone()));
    tracker.start(&Handle::current());
    let signal = tracker.initialized();

    chain.publish(status(ns, vec![member(1), member(2)]));
    assert!(timeout(WAIT, signal.wait()).await.unwrap());

    let nodes = tracker.nodes(&[]);
    assert_eq!(nodes.len(), 1);
    assert_eq!(nodes.get(&PeerId::from("p1")), Some(&member(1)));
    assert_eq!(*tags.peers.lock().unwrap(), vec![PeerId::from("p1")]);

    // A later update replaces the map and leaves the signal fired
    chain.register_node(member(2), PeerId::from("p2"));
    chain.publish(status(ns, vec![member(2)]));
    timeout(WAIT, async {
        while tracker.nodes(&[]).get(&PeerId::from("p2")).is_none() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap();
    assert_eq!(tracker.nodes(&[]).len(), 1);
    assert!(signal.is_initialized());

    tracker.stop();
}

#[tokio::test]
async fn test_same_service_id_keeps_signal() {
    let ns = Namespace::new([2; 32]);
    let (host, chain, _) = single_member_setup(ns);
    let wrapper = CommitteeClientWrapper::new(Some(Arc::new(host)), Arc::new(chain.clone()), CHAIN)
        .with_config(fast_config());

    wrapper.set_service_id(Some(ns)).unwrap();
    let signal = wrapper.initialized();
    let client = wrapper.client().unwrap();

    wrapper.set_service_id(Some(ns)).unwrap();
    assert!(Arc::ptr_eq(&client, &wrapper.client().unwrap()));

    chain.publish(status(ns, vec![member(1)]));
    assert!(timeout(WAIT, signal.wait()).await.unwrap());
}

#[tokio::test]
async fn test_call_enclave_forwards_feedback() {
    let ns = Namespace::new([3; 32]);
    let (host, chain, peer) = single_member_setup(ns);
    let wrapper = CommitteeClientWrapper::new(Some(Arc::new(host)), Arc::new(chain.clone()), CHAIN)
        .with_config(fast_config());

    wrapper.set_service_id(Some(ns)).unwrap();
    let recorder = Arc::new(Recorder::default());
    wrapper.client().unwrap().rpc().register_listener(recorder.clone());

    chain.publish(status(ns, vec![member(1)]));
    assert!(timeout(WAIT, wrapper.initialized().wait()).await.unwrap());

    let ctx = CancellationToken::new();
    let (data, node) = wrapper
        .call_enclave(&ctx, b"a".to_vec(), &[], CallKind::InsecureQuery, None)
        .await
        .unwrap();
    assert_eq!(data, b"m1:a".to_vec());
    assert_eq!(node, member(1));
    assert!(recorder.events.lock().unwrap().is_empty());

    // Silence on the previous call is taken as success
    wrapper
        .call_enclave(&ctx, b"b".to_vec(), &[member(1)], CallKind::NoiseSession, None)
        .await
        .unwrap();
    assert_eq!(*recorder.events.lock().unwrap(), vec![("success", peer.clone())]);

    // An explicit verdict is forwarded as given
    wrapper
        .call_enclave(&ctx, b"c".to_vec(), &[], CallKind::InsecureQuery, Some(PeerVerdict::BadPeer))
        .await
        .unwrap();
    assert_eq!(recorder.events.lock().unwrap().last(), Some(&("bad_peer", peer)));
}

#[tokio::test]
async fn test_call_enclave_without_members() {
    let ns = Namespace::new([4; 32]);
    let (host, chain, _) = single_member_setup(ns);
    let wrapper = CommitteeClientWrapper::new(Some(Arc::new(host)), Arc::new(chain), CHAIN)
        .with_config(fast_config());

    wrapper.set_service_id(Some(ns)).unwrap();

    // Nothing tracked yet, so nobody can be called
    let err = wrapper
        .call_enclave(&CancellationToken::new(), vec![], &[], CallKind::InsecureQuery, None)
        .await
        .unwrap_err();
    assert!(matches!(err, RpcError::NoPeerAvailable { .. }));
}

#[tokio::test]
async fn test_reconfiguration_drops_client() {
    let ns = Namespace::new([5; 32]);
    let (host, chain, _) = single_member_setup(ns);
    let wrapper = CommitteeClientWrapper::new(Some(Arc::new(host)), Arc::new(chain), CHAIN);

    wrapper.set_service_id(Some(ns)).unwrap();
    let first = wrapper.client().unwrap();

    wrapper.set_service_id(Some(Namespace::new([6; 32]))).unwrap();
    let second = wrapper.client().unwrap();
    assert!(!Arc::ptr_eq(&first, &second));
    assert_eq!(second.service_id(), &Namespace::new([6; 32]));

    wrapper.set_service_id(None).unwrap();
    assert!(wrapper.client().is_none());
    assert!(matches!(
        wrapper
            .call_enclave(&CancellationToken::new(), vec![], &[], CallKind::InsecureQuery, None)
            .await,
        Err(RpcError::NotAvailable(_))
    ));
}

#[tokio::test]
async fn test_service_change_forgets_previous_peer() {
    let (ns1, ns2) = (Namespace::new([7; 32]), Namespace::new([8; 32]));
    let (host, chain, _, peer2) = two_service_setup((ns1, Arc::new(Named("m1:"))), ns2);
    let wrapper = CommitteeClientWrapper::new(Some(Arc::new(host)), Arc::new(chain.clone()), CHAIN)
        .with_config(fast_config());
    let recorder = Arc::new(Recorder::default());
    let ctx = CancellationToken::new();

    switch_service(&wrapper, &chain, &recorder, ns1, member(1)).await;
    let (_, node) = wrapper
        .call_enclave(&ctx, b"a".to_vec(), &[], CallKind::InsecureQuery, None)
        .await
        .unwrap();
    assert_eq!(node, member(1));

    switch_service(&wrapper, &chain, &recorder, ns2, member(2)).await;

    // Even an explicit verdict has no previous call on this service to judge
    let (data, node) = wrapper
        .call_enclave(&ctx, b"b".to_vec(), &[], CallKind::InsecureQuery, Some(PeerVerdict::BadPeer))
        .await
        .unwrap();
    assert_eq!(data, b"m2:b".to_vec());
    assert_eq!(node, member(2));
    assert!(recorder.events.lock().unwrap().is_empty());

    wrapper
        .call_enclave(&ctx, b"c".to_vec(), &[], CallKind::InsecureQuery, None)
        .await
        .unwrap();
    assert_eq!(*recorder.events.lock().unwrap(), vec![("success", peer2)]);
}

#[tokio::test]
async fn test_service_change_during_call_discards_feedback() {
    let (ns1, ns2) = (Namespace::new([9; 32]), Namespace::new([10; 32]));
    let (host, chain, _, peer2) =
        two_service_setup((ns1, Arc::new(Slow(Duration::from_millis(200)))), ns2);
    let wrapper = CommitteeClientWrapper::new(Some(Arc::new(host)), Arc::new(chain.clone()), CHAIN)
        .with_config(fast_config());
    let recorder = Arc::new(Recorder::default());
    let ctx = CancellationToken::new();

    switch_service(&wrapper, &chain, &recorder, ns1, member(1)).await;

    let (result, _) = tokio::join!(
        wrapper.call_enclave(&ctx, b"slow".to_vec(), &[], CallKind::InsecureQuery, None),
        async {
            tokio::time::sleep(Duration::from_millis(50)).await;
            wrapper.set_service_id(Some(ns2)).unwrap();
        }
    );
    // The call started on the old service still completes there
    assert_eq!(result.unwrap(), (b"slow".to_vec(), member(1)));

    wrapper.client().unwrap().rpc().register_listener(recorder.clone());
    chain.publish(status(ns2, vec![member(2)]));
    assert!(timeout(WAIT, wrapper.initialized().wait()).await.unwrap());

    // The old member's token was not kept, so nothing is judged here
    wrapper
        .call_enclave(&ctx, b"a".to_vec(), &[], CallKind::InsecureQuery, None)
        .await
        .unwrap();
    assert!(recorder.events.lock().unwrap().is_empty());

    wrapper
        .call_enclave(&ctx, b"b".to_vec(), &[], CallKind::InsecureQuery, None)
        .await
        .unwrap();
    assert_eq!(*recorder.events.lock().unwrap(), vec![("success", peer2)]);
}
