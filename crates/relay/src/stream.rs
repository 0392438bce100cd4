//! Consumer-facing side of a remote data stream.

use core::fmt::{self, Debug, Formatter};
use core::future::Future;
use core::pin::Pin;
use core::task::{ready, Context, Poll};
use std::io::{self, SeekFrom};
use std::sync::Arc;

use bytes::Bytes;
use rstream_primitives::messages::SourceRef;
use rstream_primitives::stream_id::StreamId;
use tokio::io::{AsyncRead, AsyncSeek, AsyncWrite, ReadBuf};
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::errors::StreamError;
use crate::initiator::TransmissionInitiator;
use crate::registry::SessionRegistry;
use crate::session::Session;

type PendingRead = Pin<Box<dyn Future<Output = Result<Option<Bytes>, StreamError>> + Send>>;

/// Handle on a data source living on the peer.
#[derive(Clone)]
pub struct DataReference {
    registry: SessionRegistry,
    initiator: Arc<dyn TransmissionInitiator>,
    source: SourceRef,
}

impl DataReference {
    #[must_use]
    pub fn new(
        registry: SessionRegistry,
        initiator: Arc<dyn TransmissionInitiator>,
        source: SourceRef,
    ) -> Self {
        Self {
            registry,
            initiator,
            source,
        }
    }

    #[must_use]
    pub const fn source(&self) -> &SourceRef {
        &self.source
    }

    /// Opens a stream over the remote source. Nothing is requested from the
    /// peer until the first read.
    ///
    /// Without `max_allowed_size` the configured default ceiling applies.
    pub fn open_read_stream(
        &self,
        max_allowed_size: Option<u64>,
        cancel: CancellationToken,
    ) -> Result<RemoteStream, StreamError> {
        let max_allowed_length = max_allowed_size
            .unwrap_or(self.registry.config().default_max_allowed_length);

        let session = self.registry.create_session(
            self.source.clone(),
            max_allowed_length,
            Arc::clone(&self.initiator),
            cancel,
        )?;

        Ok(RemoteStream::new(session, self.registry.clone()))
    }
}

impl Debug for DataReference {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("DataReference")
            .field("source", &self.source)
            .finish_non_exhaustive()
    }
}

/// Read-only, non-seekable byte stream fed by the peer.
///
/// Dropping the stream disposes it: the session leaves the registry and any
/// delivery still waiting for buffer space is released with an error.
pub struct RemoteStream {
    session: Arc<Session>,
    registry: SessionRegistry,
    pending: Option<PendingRead>,
    leftover: Bytes,
}

impl RemoteStream {
    #[must_use]
    pub fn new(session: Arc<Session>, registry: SessionRegistry) -> Self {
        Self {
            session,
            registry,
            pending: None,
            leftover: Bytes::new(),
        }
    }

    #[must_use]
    pub fn id(&self) -> StreamId {
        self.session.id()
    }

    #[must_use]
    pub const fn session(&self) -> &Arc<Session> {
        &self.session
    }

    #[must_use]
    pub const fn can_read(&self) -> bool {
        true
    }

    #[must_use]
    pub const fn can_seek(&self) -> bool {
        false
    }

    #[must_use]
    pub const fn can_write(&self) -> bool {
        false
    }

    /// Reads up to `max` bytes, `Ok(None)` at end-of-stream.
    pub async fn read_chunk(&mut self, max: usize) -> Result<Option<Bytes>, StreamError> {
        if !self.leftover.is_empty() {
            let take = max.min(self.leftover.len());
            return Ok(Some(self.leftover.split_to(take)));
        }

        let outcome = self.session.read(max).await;

        self.settle(outcome)
    }

    pub fn len(&self) -> Result<u64, StreamError> {
        Err(StreamError::Unsupported("len"))
    }

    pub fn set_len(&mut self, _len: u64) -> Result<(), StreamError> {
        Err(StreamError::Unsupported("set_len"))
    }

    pub fn seek(&mut self, _pos: SeekFrom) -> Result<u64, StreamError> {
        Err(StreamError::Unsupported("seek"))
    }

    pub fn write(&mut self, _buf: &[u8]) -> Result<usize, StreamError> {
        Err(StreamError::Unsupported("write"))
    }

    pub fn flush(&mut self) -> Result<(), StreamError> {
        Err(StreamError::Unsupported("flush"))
    }

    /// Disposes the stream. Equivalent to dropping it.
    pub fn dispose(self) {
        drop(self);
    }

    // Once the reader has seen the terminal outcome nothing is left to route,
    // so the session can leave the registry ahead of disposal.
    fn settle(
        &self,
        outcome: Result<Option<Bytes>, StreamError>,
    ) -> Result<Option<Bytes>, StreamError> {
        if !matches!(outcome, Ok(Some(_))) {
            let _ = self.registry.unregister(&self.session.id());
        }

        outcome
    }
}

impl AsyncRead for RemoteStream {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = &mut *self;

        if buf.remaining() == 0 {
            return Poll::Ready(Ok(()));
        }

        if !this.leftover.is_empty() {
            let take = buf.remaining().min(this.leftover.len());
            buf.put_slice(&this.leftover.split_to(take));
            return Poll::Ready(Ok(()));
        }

        let max = buf.remaining();
        let session = Arc::clone(&this.session);
        let pending = this
            .pending
            .get_or_insert_with(move || Box::pin(async move { session.read(max).await }));

        let outcome = ready!(pending.as_mut().poll(cx));
        this.pending = None;

        // the read was sized when it started, the buffer may have shrunk since
        match this.settle(outcome) {
            Ok(Some(mut chunk)) => {
                let take = buf.remaining().min(chunk.len());
                buf.put_slice(&chunk.split_to(take));
                this.leftover = chunk;
                Poll::Ready(Ok(()))
            }
            Ok(None) => Poll::Ready(Ok(())),
            Err(err) => Poll::Ready(Err(err.into())),
        }
    }
}

impl AsyncWrite for RemoteStream {
    fn poll_write(
        self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        _buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        Poll::Ready(Err(StreamError::Unsupported("write").into()))
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Err(StreamError::Unsupported("flush").into()))
    }

    fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Err(StreamError::Unsupported("shutdown").into()))
    }
}

impl AsyncSeek for RemoteStream {
    fn start_seek(self: Pin<&mut Self>, _position: SeekFrom) -> io::Result<()> {
        Err(StreamError::Unsupported("seek").into())
    }

    fn poll_complete(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<u64>> {
        Poll::Ready(Err(StreamError::Unsupported("seek").into()))
    }
}

impl Drop for RemoteStream {
    fn drop(&mut self) {
        let _ = self.registry.unregister(&self.session.id());

        self.session.abandon();

        info!(
            stream_id=%self.session.id(),
            state=?self.session.state(),
            bytes_received = self.session.bytes_received(),
            "Disposed remote data stream"
        );
    }
}

impl Debug for RemoteStream {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("RemoteStream")
            .field("session", &self.session)
            .field("leftover", &self.leftover.len())
            .finish_non_exhaustive()
    }
}
