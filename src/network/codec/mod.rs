// Message framing

pub mod frame;

pub use frame::{CodecError, FramedStream, MAX_MESSAGE_SIZE};
