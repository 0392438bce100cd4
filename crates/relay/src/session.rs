//! One in-progress remote-to-local transfer.
//!
//! A [`Session`] validates every chunk the peer pushes, feeds the accepted
//! bytes into its [`RelayBuffer`], and serves reads from the other end.
//!
//! ```text
//! NotStarted ──first read──▶ Started ──total reached──▶ Completed
//!                               └────violation/error──▶ Faulted
//! ```
//!
//! Deliveries never return an error: whatever goes wrong is stored as the
//! relay fault and handed to the reader instead.

use core::fmt::{self, Debug, Formatter};
use core::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use futures_util::future::{BoxFuture, FutureExt, Shared};
use parking_lot::Mutex;
use rstream_primitives::config::RelayConfig;
use rstream_primitives::messages::{BeginTransmission, SourceRef};
use rstream_primitives::stream_id::StreamId;
use tokio::sync::Mutex as AsyncMutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::buffer::{RelayBuffer, Terminal};
use crate::errors::{ProtocolViolation, StreamError};
use crate::initiator::TransmissionInitiator;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionState {
    NotStarted,
    Started,
    Completed,
    Faulted,
}

impl SessionState {
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Faulted)
    }
}

type Handshake = Shared<BoxFuture<'static, Result<(), StreamError>>>;

#[derive(Clone, Copy, Debug, Default)]
struct Progress {
    declared: Option<u64>,
    received: u64,
}

pub struct Session {
    id: StreamId,
    source: SourceRef,
    max_allowed_length: u64,
    max_chunk_length: usize,
    initiator: Arc<dyn TransmissionInitiator>,
    cancel: CancellationToken,
    buffer: RelayBuffer,
    progress: Mutex<Progress>,
    // serialises deliveries, held across the relay write
    delivery: AsyncMutex<()>,
    started: AtomicBool,
    handshake: Mutex<Option<Handshake>>,
}

impl Session {
    #[must_use]
    pub fn new(
        id: StreamId,
        source: SourceRef,
        max_allowed_length: u64,
        config: &RelayConfig,
        initiator: Arc<dyn TransmissionInitiator>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            id,
            source,
            max_allowed_length,
            max_chunk_length: config.max_chunk_length,
            initiator,
            cancel,
            buffer: RelayBuffer::new(config.buffer_capacity),
            progress: Mutex::default(),
            delivery: AsyncMutex::new(()),
            started: AtomicBool::new(false),
            handshake: Mutex::new(None),
        }
    }

    #[must_use]
    pub const fn id(&self) -> StreamId {
        self.id
    }

    #[must_use]
    pub const fn source(&self) -> &SourceRef {
        &self.source
    }

    #[must_use]
    pub const fn max_allowed_length(&self) -> u64 {
        self.max_allowed_length
    }

    #[must_use]
    pub fn bytes_received(&self) -> u64 {
        self.progress.lock().received
    }

    #[must_use]
    pub fn declared_length(&self) -> Option<u64> {
        self.progress.lock().declared
    }

    /// Bytes accepted from the peer and not yet read.
    #[must_use]
    pub fn buffered(&self) -> usize {
        self.buffer.buffered()
    }

    #[must_use]
    pub fn state(&self) -> SessionState {
        match self.buffer.terminal() {
            Some(Terminal::Completed) => SessionState::Completed,
            Some(Terminal::Faulted) => SessionState::Faulted,
            None if self.started.load(Ordering::Acquire) => SessionState::Started,
            None => SessionState::NotStarted,
        }
    }

    /// Applies one chunk pushed by the peer.
    ///
    /// Suspends while the relay is full, which is how backpressure reaches the
    /// peer's send loop. A non-empty `error` faults the stream regardless of
    /// the other arguments.
    pub async fn deliver_chunk(&self, chunk: Bytes, total_length: u64, error: Option<&str>) {
        let _delivery = self.delivery.lock().await;

        if let Err(err) = self.try_deliver(chunk, total_length, error).await {
            self.fault(err);
        }
    }

    async fn try_deliver(
        &self,
        chunk: Bytes,
        total_length: u64,
        error: Option<&str>,
    ) -> Result<(), StreamError> {
        if let Some(error) = error.filter(|error| !error.is_empty()) {
            return Err(StreamError::RemoteReported(error.to_owned()));
        }

        if total_length > self.max_allowed_length {
            return Err(ProtocolViolation::LengthExceedsMaximum {
                declared: total_length,
                max: self.max_allowed_length,
            }
            .into());
        }

        let received = {
            let mut progress = self.progress.lock();

            match progress.declared {
                Some(previous) if previous != total_length => {
                    return Err(ProtocolViolation::LengthChanged {
                        previous,
                        declared: total_length,
                    }
                    .into());
                }
                Some(_) => {}
                None => progress.declared = Some(total_length),
            }

            progress.received = progress.received.saturating_add(chunk.len() as u64);
            progress.received
        };

        if received > total_length {
            return Err(ProtocolViolation::Overrun {
                declared: total_length,
                received,
            }
            .into());
        }

        if chunk.len() > self.max_chunk_length {
            return Err(ProtocolViolation::ChunkTooLarge {
                length: chunk.len(),
                limit: self.max_chunk_length,
            }
            .into());
        }

        debug!(
            stream_id=%self.id,
            chunk_size = chunk.len(),
            received,
            total_length,
            "Relaying stream chunk"
        );

        tokio::select! {
            biased;
            () = self.cancel.cancelled() => return Err(StreamError::Cancelled),
            written = self.buffer.write(chunk) => written?,
        }

        if received == total_length {
            self.buffer.complete()?;

            info!(stream_id=%self.id, total_length, "Remote data stream completed");
        }

        Ok(())
    }

    /// Faults the stream if the peer's sequence ended short of the declared length.
    pub(crate) async fn end_of_sequence(&self, total_length: u64) {
        let _delivery = self.delivery.lock().await;

        if self.buffer.terminal().is_some() {
            return;
        }

        let received = self.bytes_received();

        if received < total_length {
            self.fault(
                ProtocolViolation::Truncated {
                    declared: total_length,
                    received,
                }
                .into(),
            );
        }
    }

    pub(crate) fn fault(&self, err: StreamError) {
        match self.buffer.fail(err.clone()) {
            Ok(()) => warn!(stream_id=%self.id, %err, "Remote data stream faulted"),
            Err(relay_err) => warn!(
                stream_id=%self.id,
                %err,
                %relay_err,
                "Dropping fault for an already terminated stream"
            ),
        }
    }

    /// Reads up to `max` bytes, issuing the handshake on the first call.
    ///
    /// `Ok(None)` is end-of-stream.
    pub async fn read(&self, max: usize) -> Result<Option<Bytes>, StreamError> {
        if self.cancel.is_cancelled() {
            return Err(StreamError::Cancelled);
        }

        tokio::select! {
            biased;
            () = self.cancel.cancelled() => Err(StreamError::Cancelled),
            outcome = async {
                self.ensure_started().await?;
                self.buffer.read(max).await
            } => outcome,
        }
    }

    async fn ensure_started(&self) -> Result<(), StreamError> {
        let handshake = self
            .handshake
            .lock()
            .get_or_insert_with(|| self.dispatch_handshake())
            .clone();

        handshake.await
    }

    // The dispatch is owned by the session, not by the reader polling it, so
    // a dropped read leaves it in place for the next one.
    fn dispatch_handshake(&self) -> Handshake {
        self.started.store(true, Ordering::Release);

        debug!(stream_id=%self.id, source=%self.source, "Beginning stream transmission");

        let id = self.id;
        let initiator = Arc::clone(&self.initiator);
        let request = BeginTransmission::new(self.source.clone(), id);

        async move {
            initiator.begin_transmission(request).await.map_err(|err| {
                warn!(stream_id=%id, %err, "Failed to begin stream transmission");

                StreamError::Handshake(format!("{err:#}"))
            })
        }
        .boxed()
        .shared()
    }

    /// Drops buffered data and fails any delivery suspended on backpressure.
    pub(crate) fn abandon(&self) {
        self.buffer.abandon();
    }
}

impl Debug for Session {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("source", &self.source)
            .field("max_allowed_length", &self.max_allowed_length)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}
