use std::io;

use rstream_primitives::stream_id::StreamId;
use thiserror::Error;

/// Misuse of a [`RelayBuffer`](crate::buffer::RelayBuffer).
#[derive(Clone, Copy, Debug, Error, PartialEq, Eq)]
pub enum RelayError {
    #[error("the relay is closed for writing")]
    Closed,
    #[error("the relay already received its terminal signal")]
    AlreadyTerminated,
    #[error("the reading side of the relay is gone")]
    ReaderGone,
}

/// Peer-caused failures. None of these are fatal to the process.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ProtocolViolation {
    #[error("the incoming data stream of length {declared} exceeds the maximum length {max}")]
    LengthExceedsMaximum { declared: u64, max: u64 },
    #[error("the incoming data stream declared a length {declared}, but {received} bytes were received")]
    Overrun { declared: u64, received: u64 },
    #[error("the incoming stream chunk of length {length} exceeds the limit of {limit}")]
    ChunkTooLarge { length: usize, limit: usize },
    #[error("the incoming data stream declared a length {declared} after previously declaring {previous}")]
    LengthChanged { previous: u64, declared: u64 },
    #[error("the incoming data stream ended after {received} of {declared} declared bytes")]
    Truncated { declared: u64, received: u64 },
    #[error("there is no data stream with identifier `{id}`, it may have already been disposed")]
    UnknownStream { id: String },
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[non_exhaustive]
pub enum StreamError {
    #[error(transparent)]
    Protocol(#[from] ProtocolViolation),
    #[error("the remote peer reported an error: {0}")]
    RemoteReported(String),
    #[error("`{0}` is not supported on a remote data stream")]
    Unsupported(&'static str),
    #[error("the remote data stream was cancelled")]
    Cancelled,
    #[error("failed to begin transmission: {0}")]
    Handshake(String),
    #[error(transparent)]
    Relay(#[from] RelayError),
    #[error("a data stream with identifier `{0}` is already registered")]
    Duplicate(StreamId),
    #[error("failed to allocate a unique stream identifier")]
    Exhausted,
}

impl StreamError {
    #[must_use]
    pub const fn is_protocol_violation(&self) -> bool {
        matches!(self, Self::Protocol(_))
    }

    #[must_use]
    pub const fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

impl From<StreamError> for io::Error {
    fn from(err: StreamError) -> Self {
        let kind = match err {
            StreamError::Unsupported(_) => io::ErrorKind::Unsupported,
            _ => io::ErrorKind::Other,
        };

        Self::new(kind, err)
    }
}
