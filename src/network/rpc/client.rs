use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use backoff::backoff::Backoff;
use futures::stream::{FuturesUnordered, StreamExt};
use log::debug;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::sync::{oneshot, Semaphore};
use tokio::time::{sleep, timeout};
use tokio_util::sync::CancellationToken;

use crate::config::RpcConfig;
use crate::error::{Result, RpcError};
use crate::network::codec::{CodecError, FramedStream};
use crate::network::rpc::feedback::{ClientListener, ListenerSet, PeerFeedback};
use crate::network::rpc::options::{CallMultiOptions, CallOptions};
use crate::network::rpc::retry::LimitedRetries;
use crate::network::transport::{BoxedStream, Host};
use crate::network::types::{PeerId, ProtocolId, Request, Response};

/// Outcome of a single peer exchange
struct PeerResult<R> {
    feedback: PeerFeedback,
    result: Result<R>,
}

/// RPC client for a given protocol
///
/// Cheap to clone; clones share the listener set. A client created without a host is a
/// no-op client: every call fails with [`RpcError::NoPeerAvailable`].
#[derive(Clone)]
pub struct Client {
    host: Option<Arc<dyn Host>>,
    protocol_id: ProtocolId,
    listeners: Arc<ListenerSet>,
    config: RpcConfig,
}

impl Client {
    /// Create a new RPC client for the given protocol
    pub fn new(host: Option<Arc<dyn Host>>, protocol_id: ProtocolId) -> Self {
        Self::with_config(host, protocol_id, RpcConfig::default())
    }

    /// Create a new RPC client with explicit configuration
    pub fn with_config(host: Option<Arc<dyn Host>>, protocol_id: ProtocolId, config: RpcConfig) -> Self {
        if host.is_none() {
            debug!("No P2P host for protocol {}, using no-op client", protocol_id);
        }

        Self {
            host,
            protocol_id,
            listeners: Arc::new(ListenerSet::new()),
            config,
        }
    }

    /// The protocol this client speaks
    pub fn protocol_id(&self) -> &ProtocolId {
        &self.protocol_id
    }

    /// Check if this is a no-op client
    pub fn is_nop(&self) -> bool {
        self.host.is_none()
    }

    /// Subscribe a listener to peer feedback events
    ///
    /// Registering an already registered listener does nothing.
    pub fn register_listener(&self, listener: Arc<dyn ClientListener>) {
        self.listeners.register(listener);
    }

    /// Unsubscribe a listener from peer feedback events
    ///
    /// Unregistering a listener that is not registered does nothing.
    pub fn unregister_listener(&self, listener: &Arc<dyn ClientListener>) {
        self.listeners.unregister(listener);
    }

    /// Route a method call to the given peer
    ///
    /// It's up to the caller to provide only connected peers that support the protocol. On
    /// success the returned [`PeerFeedback`] should be used to report whether the peer was
    /// any good, which guides later routing choices.
    pub async fn call<B, R>(
        &self,
        ctx: &CancellationToken,
        peer: &PeerId,
        method: &str,
        body: &B,
        max_peer_response_time: Duration,
        opts: CallOptions<R>,
    ) -> Result<(R, PeerFeedback)>
    where
        B: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        self.call_one(ctx, std::slice::from_ref(peer), method, body, max_peer_response_time, opts)
            .await
    }

    /// Route a method call to one of the peers in the list, in order
    ///
    /// Each attempt walks the list and stops at the first peer that answers and whose
    /// response passes validation. Failed attempts are retried according to `opts`. When
    /// every attempt fails the error carries the feedback of the last peer contacted.
    pub async fn call_one<B, R>(
        &self,
        ctx: &CancellationToken,
        peers: &[PeerId],
        method: &str,
        body: &B,
        max_peer_response_time: Duration,
        opts: CallOptions<R>,
    ) -> Result<(R, PeerFeedback)>
    where
        B: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        debug!("call {} (protocol: {})", method, self.protocol_id);

        let host = match &self.host {
            Some(host) => host.as_ref(),
            None => return Err(RpcError::NoPeerAvailable { last_peer: None }),
        };

        let request = Request::new(method, body).map_err(RpcError::Encode)?;
        let retry_interval = opts
            .retry_interval
            .unwrap_or_else(|| self.config.default_retry_interval());
        let mut backoff = LimitedRetries::new(retry_interval, opts.max_retries);
        let mut last_peer = None;

        loop {
            if let Some(result) = self
                .try_peers(host, ctx, peers, &request, max_peer_response_time, &opts, &mut last_peer)
                .await?
            {
                return Ok(result);
            }

            let delay = match backoff.next_backoff() {
                Some(delay) => delay,
                None => break,
            };
            debug!("retrying call {} in {:?} (retry {})", method, delay, backoff.retries());

            tokio::select! {
                biased;
                _ = ctx.cancelled() => return Err(RpcError::Cancelled),
                _ = sleep(delay) => {}
            }
        }

        Err(RpcError::NoPeerAvailable { last_peer })
    }

    /// One pass over the peer list
    ///
    /// Returns `Ok(None)` if no peer could service the request.
    #[allow(clippy::too_many_arguments)]
    async fn try_peers<R: DeserializeOwned>(
        &self,
        host: &dyn Host,
        ctx: &CancellationToken,
        peers: &[PeerId],
        request: &Request,
        max_peer_response_time: Duration,
        opts: &CallOptions<R>,
        last_peer: &mut Option<PeerFeedback>,
    ) -> Result<Option<(R, PeerFeedback)>> {
        for peer in peers {
            if ctx.is_cancelled() {
                return Err(RpcError::Cancelled);
            }
            debug!("trying peer {} for method {}", peer, request.method);

            let PeerResult { feedback, result } =
                self.time_call(host, ctx, peer, request, max_peer_response_time).await;
            *last_peer = Some(feedback.clone());

            let rsp = match result {
                Ok(rsp) => rsp,
                Err(RpcError::Cancelled) => return Err(RpcError::Cancelled),
                Err(_) => continue,
            };

            if let Some(validate) = &opts.validation_fn {
                if let Err(err) = validate(&rsp, &feedback) {
                    debug!(
                        "failed to validate response of peer {} for method {}: {}",
                        peer, request.method, err
                    );
                    continue;
                }
            }

            return Ok(Some((rsp, feedback)));
        }

        debug!("no peers could be reached to service request {}", request.method);
        Ok(None)
    }

    /// Route a method call to multiple peers in parallel
    ///
    /// At most `max_parallel_requests` exchanges run at once. Failed exchanges are dropped;
    /// successful ones are returned in arrival order with their feedback. If the aggregation
    /// function returns false, collection stops and outstanding exchanges are cancelled.
    #[allow(clippy::too_many_arguments)]
    pub async fn call_multi<B, R>(
        &self,
        ctx: &CancellationToken,
        peers: &[PeerId],
        method: &str,
        body: &B,
        max_peer_response_time: Duration,
        max_parallel_requests: usize,
        opts: CallMultiOptions<R>,
    ) -> Result<(Vec<R>, Vec<PeerFeedback>)>
    where
        B: Serialize + ?Sized,
        R: DeserializeOwned + Send + 'static,
    {
        debug!("call multiple {} (protocol: {})", method, self.protocol_id);

        let host = match &self.host {
            Some(host) => host.clone(),
            None => return Err(RpcError::NoPeerAvailable { last_peer: None }),
        };

        if peers.is_empty() {
            return Ok((Vec::new(), Vec::new()));
        }

        let request = Arc::new(Request::new(method, body).map_err(RpcError::Encode)?);

        // Worker pool bounding the number of concurrent exchanges
        let pool = Arc::new(Semaphore::new(max_parallel_requests.max(1)));

        // Subcontext so we abort further requests if we are done early
        let peer_ctx = ctx.child_token();
        let _cancel_on_return = peer_ctx.clone().drop_guard();

        let mut pending = FuturesUnordered::new();
        for peer in peers {
            let (tx, rx) = oneshot::channel::<PeerResult<R>>();
            pending.push(rx);

            let client = self.clone();
            let host = host.clone();
            let pool = pool.clone();
            let peer_ctx = peer_ctx.clone();
            let request = request.clone();
            let peer = peer.clone();

            tokio::spawn(async move {
                let _permit = tokio::select! {
                    biased;
                    _ = peer_ctx.cancelled() => return,
                    permit = pool.acquire_owned() => match permit {
                        Ok(permit) => permit,
                        Err(_) => return,
                    },
                };

                // Abort early in case we are done
                if peer_ctx.is_cancelled() {
                    return;
                }

                let result = client
                    .time_call(host.as_ref(), &peer_ctx, &peer, &request, max_peer_response_time)
                    .await;
                let _ = tx.send(result);
            });
        }

        let mut rsps = Vec::new();
        let mut pfs = Vec::new();
        while let Some(received) = pending.next().await {
            // Tasks that exited early drop their sender
            let PeerResult { feedback, result } = match received {
                Ok(peer_result) => peer_result,
                Err(_) => continue,
            };

            // Ignore failed results
            let rsp = match result {
                Ok(rsp) => rsp,
                Err(_) => continue,
            };

            let proceed = match &opts.aggregate_fn {
                Some(aggregate) => aggregate(&rsp, &feedback),
                None => true,
            };

            rsps.push(rsp);
            pfs.push(feedback);

            if !proceed {
                break;
            }
        }

        debug!("received responses from {} peers for method {}", rsps.len(), method);

        Ok((rsps, pfs))
    }

    /// Perform a single exchange, timing it and recording transport failures
    async fn time_call<R: DeserializeOwned>(
        &self,
        host: &dyn Host,
        ctx: &CancellationToken,
        peer: &PeerId,
        request: &Request,
        max_peer_response_time: Duration,
    ) -> PeerResult<R> {
        let start = Instant::now();
        let result = self.call_peer(host, ctx, peer, request, max_peer_response_time).await;
        let latency = start.elapsed();

        if let Err(err) = &result {
            // Our own cancellation says nothing about the peer
            if !matches!(err, RpcError::Cancelled) {
                self.listeners.notify_failure(peer, latency);
            }

            debug!("failed to call method {} on peer {}: {}", request.method, peer, err);
        }

        PeerResult {
            feedback: PeerFeedback::new(peer.clone(), latency, self.listeners.clone()),
            result,
        }
    }

    async fn call_peer<R: DeserializeOwned>(
        &self,
        host: &dyn Host,
        ctx: &CancellationToken,
        peer: &PeerId,
        request: &Request,
        max_peer_response_time: Duration,
    ) -> Result<R> {
        // Attempt to open stream to the given peer
        let stream = tokio::select! {
            biased;
            _ = ctx.cancelled() => return Err(RpcError::Cancelled),
            stream = host.new_stream(peer, &self.protocol_id) => stream.map_err(RpcError::StreamOpen)?,
        };

        let mut framed = FramedStream::new(stream);
        let response = self
            .exchange(ctx, &mut framed, request, max_peer_response_time)
            .await;

        if let Err(e) = framed.close().await {
            debug!("failed to close stream to peer {}: {}", peer, e);
        }

        match response? {
            Response::Ok(body) => bincode::deserialize(&body).map_err(RpcError::Decode),
            Response::Error(err) => Err(RpcError::Remote {
                module: err.module,
                code: err.code,
                message: err.message,
            }),
        }
    }

    async fn exchange(
        &self,
        ctx: &CancellationToken,
        framed: &mut FramedStream<BoxedStream>,
        request: &Request,
        max_peer_response_time: Duration,
    ) -> Result<Response> {
        // Send request
        with_deadline(
            ctx,
            self.config.request_write_deadline(),
            framed.write_message(request),
            RpcError::Send,
        )
        .await?;

        // Read response
        // TODO: Enforce a minimum transfer rate in addition to the response deadline.
        with_deadline(
            ctx,
            max_peer_response_time,
            framed.expect_message::<Response>(),
            RpcError::Receive,
        )
        .await
    }
}

/// Run a stream operation under a deadline, aborting on cancellation
async fn with_deadline<T, F>(
    ctx: &CancellationToken,
    deadline: Duration,
    operation: F,
    wrap: fn(CodecError) -> RpcError,
) -> Result<T>
where
    F: Future<Output = std::result::Result<T, CodecError>>,
{
    tokio::select! {
        biased;
        _ = ctx.cancelled() => Err(RpcError::Cancelled),
        result = timeout(deadline, operation) => match result {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(err)) => Err(wrap(err)),
            Err(_) => Err(wrap(CodecError::Timeout)),
        },
    }
}
