//! Server side of the RPC protocol
//!
//! A [`MethodRegistry`] maps method names to handlers. [`serve_stream`] answers a single
//! request on a stream, which is how every transport in this crate serves peers.

use std::collections::HashMap;
use std::sync::Arc;
use log::{debug, warn};
use tokio::io::{AsyncRead, AsyncWrite};

use crate::network::codec::{CodecError, FramedStream};
use crate::network::types::{Request, Response, ResponseError};

/// Module name used for errors raised by the RPC layer itself
pub const RPC_MODULE: &str = "rpc";

/// Error code for requests naming a method nobody handles
pub const CODE_UNSUPPORTED_METHOD: u32 = 1;

/// Handler for a single RPC method
#[async_trait::async_trait]
pub trait MethodHandler: Send + Sync {
    /// Handle an encoded request body and produce an encoded response body
    async fn handle(&self, body: Vec<u8>) -> Result<Vec<u8>, ResponseError>;
}

/// Registry of method handlers
#[derive(Default, Clone)]
pub struct MethodRegistry {
    /// Handlers by method name
    handlers: HashMap<String, Arc<dyn MethodHandler>>,
}

impl MethodRegistry {
    /// Create a new, empty registry
    pub fn new() -> Self {
        Self {
            handlers: HashMap::new(),
        }
    }

    /// Register a handler, replacing any previous handler for the method
    pub fn register(&mut self, method: &str, handler: Arc<dyn MethodHandler>) {
        self.handlers.insert(method.to_string(), handler);
        debug!("Registered handler for method: {}", method);
    }

    /// Builder-style variant of [`MethodRegistry::register`]
    pub fn with_method(mut self, method: &str, handler: Arc<dyn MethodHandler>) -> Self {
        self.register(method, handler);
        self
    }

    /// Get a handler by method name
    pub fn get(&self, method: &str) -> Option<Arc<dyn MethodHandler>> {
        self.handlers.get(method).cloned()
    }

    /// Get the number of registered handlers
    pub fn count(&self) -> usize {
        self.handlers.len()
    }

    /// Dispatch a request to its handler
    pub async fn dispatch(&self, request: Request) -> Response {
        match self.get(&request.method) {
            Some(handler) => match handler.handle(request.body).await {
                Ok(body) => Response::Ok(body),
                Err(err) => Response::Error(err),
            },
            None => {
                warn!("Received request for unsupported method: {}", request.method);
                Response::Error(ResponseError::new(
                    RPC_MODULE,
                    CODE_UNSUPPORTED_METHOD,
                    format!("unsupported method: {}", request.method),
                ))
            }
        }
    }
}

/// Serve a single request on the given stream
///
/// A stream closed before any request arrives is not an error.
pub async fn serve_stream<S>(stream: S, registry: &MethodRegistry) -> Result<(), CodecError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut framed = FramedStream::new(stream);

    let request: Request = match framed.read_message().await? {
        Some(request) => request,
        None => return Ok(()),
    };
    debug!("Serving request for method {}", request.method);

    let response = registry.dispatch(request).await;
    framed.write_message(&response).await?;

    if let Err(e) = framed.close().await {
        debug!("Failed to close stream: {}", e);
    }

    Ok(())
}
