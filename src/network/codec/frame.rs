use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::io;
use std::marker::Unpin;

/// Maximum message size in bytes
pub const MAX_MESSAGE_SIZE: u32 = 10 * 1024 * 1024; // 10 MB

/// Framing errors
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// I/O error on the underlying stream
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Message could not be encoded or decoded
    #[error("encoding error: {0}")]
    Encoding(#[from] bincode::Error),

    /// Message exceeds the frame size limit
    #[error("message too large: {0} bytes")]
    TooLarge(usize),

    /// The peer closed the stream before a full message arrived
    #[error("stream closed")]
    Closed,

    /// The operation did not finish before its deadline
    #[error("deadline exceeded")]
    Timeout,
}

/// Length-prefixed message framing over a bidirectional stream
///
/// Each frame is a big-endian `u32` length followed by a bincode encoded body.
pub struct FramedStream<S> {
    stream: S,
}

impl<S> FramedStream<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Create a new framed stream
    pub fn new(stream: S) -> Self {
        Self { stream }
    }

    /// Read a message from the stream
    ///
    /// Returns `Ok(None)` if the stream was closed cleanly before a frame started.
    pub async fn read_message<T: DeserializeOwned>(&mut self) -> Result<Option<T>, CodecError> {
        // Read the message length
        let len = match self.stream.read_u32().await {
            Ok(len) => len,
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        if len > MAX_MESSAGE_SIZE {
            return Err(CodecError::TooLarge(len as usize));
        }

        // Read the message data
        let mut buf = vec![0u8; len as usize];
        match self.stream.read_exact(&mut buf).await {
            Ok(_) => (),
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => return Err(CodecError::Closed),
            Err(e) => return Err(e.into()),
        }

        Ok(Some(bincode::deserialize(&buf)?))
    }

    /// Read a message, treating a closed stream as an error
    pub async fn expect_message<T: DeserializeOwned>(&mut self) -> Result<T, CodecError> {
        self.read_message().await?.ok_or(CodecError::Closed)
    }

    /// Write a message to the stream
    pub async fn write_message<T: Serialize>(&mut self, message: &T) -> Result<(), CodecError> {
        let data = bincode::serialize(message)?;

        if data.len() > MAX_MESSAGE_SIZE as usize {
            return Err(CodecError::TooLarge(data.len()));
        }

        self.stream.write_u32(data.len() as u32).await?;
        self.stream.write_all(&data).await?;
        self.stream.flush().await?;

        Ok(())
    }

    /// Shut down the write side of the stream
    pub async fn close(&mut self) -> io::Result<()> {
        self.stream.shutdown().await
    }

    /// Unwrap the underlying stream
    pub fn into_inner(self) -> S {
        self.stream
    }
}
