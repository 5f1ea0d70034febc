use std::sync::Arc;
use serde::{Serialize, Deserialize};
use tokio_util::sync::CancellationToken;

use crate::committee::types::{CallKind, Namespace};
use crate::config::Config;
use crate::error::Result;
use crate::network::rpc::server::{MethodHandler, MethodRegistry};
use crate::network::rpc::{CallOptions, Client, PeerFeedback};
use crate::network::transport::Host;
use crate::network::types::{PeerId, ProtocolId, ResponseError};

/// Committee protocol method forwarding a call to a member's enclave
pub const METHOD_CALL_ENCLAVE: &str = "CallEnclave";

/// Module name for errors raised by the committee protocol
pub const COMMITTEE_MODULE: &str = "committee";

/// Error code for malformed committee requests
pub const CODE_MALFORMED_REQUEST: u32 = 1;

/// Request body of [`METHOD_CALL_ENCLAVE`]
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct CallEnclaveRequest {
    pub data: Vec<u8>,
    pub kind: CallKind,
}

/// Response body of [`METHOD_CALL_ENCLAVE`]
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct CallEnclaveResponse {
    pub data: Vec<u8>,
}

/// Protocol identifier of the committee protocol for a service
pub fn protocol_id(chain_context: &str, service_id: &Namespace, version: &str) -> ProtocolId {
    ProtocolId::new(format!("/{}/committee/{}/{}", chain_context, service_id, version))
}

/// RPC client for the committee protocol of one service
pub struct CommitteeClient {
    rpc: Client,
    service_id: Namespace,
    config: Config,
}

impl CommitteeClient {
    pub fn new(host: Option<Arc<dyn Host>>, chain_context: &str, service_id: Namespace, config: &Config) -> Self {
        let protocol = protocol_id(chain_context, &service_id, &config.committee.protocol_version);

        Self {
            rpc: Client::with_config(host, protocol, config.rpc.clone()),
            service_id,
            config: config.clone(),
        }
    }

    pub fn service_id(&self) -> &Namespace {
        &self.service_id
    }

    /// Underlying RPC client, e.g. for registering feedback listeners
    pub fn rpc(&self) -> &Client {
        &self.rpc
    }

    /// Forward an enclave call to the first member able to serve it
    ///
    /// Members are tried in the given order, with retries as configured.
    pub async fn call_enclave(
        &self,
        ctx: &CancellationToken,
        request: &CallEnclaveRequest,
        peers: &[PeerId],
    ) -> Result<(CallEnclaveResponse, PeerFeedback)> {
        let committee = &self.config.committee;
        let opts = CallOptions::new()
            .with_max_retries(committee.max_retries)
            .with_retry_interval(committee.retry_interval());

        self.rpc
            .call_one(ctx, peers, METHOD_CALL_ENCLAVE, request, committee.max_response_time(), opts)
            .await
    }
}

/// Enclave serving committee calls on a member node
#[async_trait::async_trait]
pub trait Enclave: Send + Sync {
    async fn call(&self, data: Vec<u8>, kind: CallKind) -> std::result::Result<Vec<u8>, ResponseError>;
}

/// Adapter serving [`METHOD_CALL_ENCLAVE`] with an [`Enclave`]
pub struct CallEnclaveHandler {
    enclave: Arc<dyn Enclave>,
}

impl CallEnclaveHandler {
    pub fn new(enclave: Arc<dyn Enclave>) -> Self {
        Self { enclave }
    }

    /// Registry serving the committee protocol with the given enclave
    pub fn registry(enclave: Arc<dyn Enclave>) -> MethodRegistry {
        MethodRegistry::new().with_method(METHOD_CALL_ENCLAVE, Arc::new(Self::new(enclave)))
    }
}

#[async_trait::async_trait]
impl MethodHandler for CallEnclaveHandler {
    async fn handle(&self, body: Vec<u8>) -> std::result::Result<Vec<u8>, ResponseError> {
        let request: CallEnclaveRequest = bincode::deserialize(&body).map_err(|e| {
            ResponseError::new(COMMITTEE_MODULE, CODE_MALFORMED_REQUEST, e.to_string())
        })?;

        let data = self.enclave.call(request.data, request.kind).await?;

        bincode::serialize(&CallEnclaveResponse { data })
            .map_err(|e| ResponseError::new(COMMITTEE_MODULE, CODE_MALFORMED_REQUEST, e.to_string()))
    }
}
