// Network types

pub mod message;
pub mod peer;

pub use message::{Request, Response, ResponseError};
pub use peer::{PeerId, ProtocolId};
