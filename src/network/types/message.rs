use serde::{Serialize, Deserialize};
use std::fmt;

/// An RPC request sent to a peer
///
/// The body is encoded once per logical call and the same request is reused for every
/// peer and every retry.
#[derive(Serialize, Deserialize, Clone, PartialEq)]
pub struct Request {
    /// Name of the method to invoke
    pub method: String,

    /// Encoded method arguments
    pub body: Vec<u8>,
}

impl Request {
    /// Create a new request from an encodable body
    pub fn new<B: Serialize + ?Sized>(method: &str, body: &B) -> bincode::Result<Self> {
        Ok(Self {
            method: method.to_string(),
            body: bincode::serialize(body)?,
        })
    }
}

impl fmt::Debug for Request {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Request {{ method: {}, body: {} bytes }}", self.method, self.body.len())
    }
}

/// Structured error returned by a peer
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct ResponseError {
    /// Module that raised the error
    pub module: String,

    /// Module-specific error code
    pub code: u32,

    /// Human readable message
    pub message: String,
}

impl ResponseError {
    pub fn new(module: &str, code: u32, message: impl Into<String>) -> Self {
        Self {
            module: module.to_string(),
            code,
            message: message.into(),
        }
    }
}

/// An RPC response received from a peer
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub enum Response {
    /// Encoded method result
    Ok(Vec<u8>),

    /// The method failed on the remote side
    Error(ResponseError),
}

impl Response {
    /// Create a successful response from an encodable value
    pub fn ok<T: Serialize + ?Sized>(value: &T) -> bincode::Result<Self> {
        Ok(Response::Ok(bincode::serialize(value)?))
    }

    /// Check if the response carries an error
    pub fn is_error(&self) -> bool {
        matches!(self, Response::Error(_))
    }
}
