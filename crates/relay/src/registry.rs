//! Routing table from stream identifier to live session.
//!
//! # Design
//!
//! Uses DashMap so independent streams never contend on a single lock. A
//! session is cloned out of the map before any await point, no shard guard
//! is ever held across a suspended delivery or read.
//!
//! # Thread Safety
//!
//! The registry is cheap to clone and every clone shares the same map. It is
//! built once by whoever owns the transport connection and handed to both
//! the delivery dispatcher and the stream factory.

use core::fmt::Display;
use std::sync::Arc;

use bytes::Bytes;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use futures_util::{pin_mut, Stream, StreamExt};
use rstream_primitives::config::RelayConfig;
use rstream_primitives::messages::{SourceRef, SupplyChunk};
use rstream_primitives::stream_id::StreamId;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::errors::{ProtocolViolation, StreamError};
use crate::initiator::TransmissionInitiator;
use crate::session::Session;

const MAX_ID_ATTEMPTS: usize = 8;

#[derive(Clone, Debug, Default)]
pub struct SessionRegistry {
    sessions: Arc<DashMap<StreamId, Arc<Session>>>,
    config: RelayConfig,
}

impl SessionRegistry {
    #[must_use]
    pub fn new(config: RelayConfig) -> Self {
        Self {
            sessions: Arc::default(),
            config,
        }
    }

    #[must_use]
    pub const fn config(&self) -> &RelayConfig {
        &self.config
    }

    /// Creates a session under a fresh identifier and registers it.
    pub fn create_session(
        &self,
        source: SourceRef,
        max_allowed_length: u64,
        initiator: Arc<dyn TransmissionInitiator>,
        cancel: CancellationToken,
    ) -> Result<Arc<Session>, StreamError> {
        for _ in 0..MAX_ID_ATTEMPTS {
            let session = Arc::new(Session::new(
                StreamId::random(),
                source.clone(),
                max_allowed_length,
                &self.config,
                Arc::clone(&initiator),
                cancel.clone(),
            ));

            match self.register(Arc::clone(&session)) {
                Ok(()) => {
                    info!(
                        stream_id=%session.id(),
                        %source,
                        max_allowed_length,
                        "Created remote data stream"
                    );

                    return Ok(session);
                }
                Err(StreamError::Duplicate(id)) => {
                    warn!(stream_id=%id, "Stream identifier collision, retrying");
                }
                Err(err) => return Err(err),
            }
        }

        Err(StreamError::Exhausted)
    }

    pub fn register(&self, session: Arc<Session>) -> Result<(), StreamError> {
        match self.sessions.entry(session.id()) {
            Entry::Occupied(entry) => Err(StreamError::Duplicate(*entry.key())),
            Entry::Vacant(entry) => {
                drop(entry.insert(session));
                Ok(())
            }
        }
    }

    #[must_use]
    pub fn lookup(&self, id: &StreamId) -> Option<Arc<Session>> {
        self.sessions.get(id).map(|entry| Arc::clone(entry.value()))
    }

    /// Removes the session, if still present.
    pub fn unregister(&self, id: &StreamId) -> Option<Arc<Session>> {
        let removed = self.sessions.remove(id).map(|(_, session)| session);

        if removed.is_some() {
            debug!(stream_id=%id, "Unregistered remote data stream");
        }

        removed
    }

    #[must_use]
    pub fn contains(&self, id: &StreamId) -> bool {
        self.sessions.contains_key(id)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Inbound `supplyData` entry point, one call per chunk.
    ///
    /// Only an unknown identifier is reported back to the caller. Everything
    /// else is the session's business and ends up in its read path.
    pub async fn supply_chunk(
        &self,
        stream_id: &str,
        chunk: Bytes,
        total_length: u64,
        error: Option<&str>,
    ) -> Result<(), StreamError> {
        let session = self.resolve(stream_id)?;

        session.deliver_chunk(chunk, total_length, error).await;

        Ok(())
    }

    pub async fn supply(&self, message: SupplyChunk) -> Result<(), StreamError> {
        self.supply_chunk(
            &message.stream_id,
            message.chunk.into(),
            message.total_length,
            message.error.as_deref(),
        )
        .await
    }

    /// Batched delivery: every item of `chunks` goes through the per-chunk
    /// path. A failed item is treated as a peer-reported error, and a sequence
    /// ending short of `total_length` faults the stream as truncated.
    pub async fn supply_sequence<S, E>(
        &self,
        stream_id: &str,
        chunks: S,
        total_length: u64,
    ) -> Result<(), StreamError>
    where
        S: Stream<Item = Result<Bytes, E>>,
        E: Display,
    {
        let session = self.resolve(stream_id)?;

        pin_mut!(chunks);

        while let Some(item) = chunks.next().await {
            match item {
                Ok(chunk) => session.deliver_chunk(chunk, total_length, None).await,
                Err(err) => {
                    let error = err.to_string();

                    session
                        .deliver_chunk(Bytes::new(), total_length, Some(&error))
                        .await;
                }
            }

            if session.state().is_terminal() {
                return Ok(());
            }
        }

        session.end_of_sequence(total_length).await;

        Ok(())
    }

    fn resolve(&self, stream_id: &str) -> Result<Arc<Session>, StreamError> {
        let session = stream_id
            .parse::<StreamId>()
            .ok()
            .and_then(|id| self.lookup(&id));

        session.ok_or_else(|| {
            warn!(%stream_id, "Peer referenced an unknown data stream");

            ProtocolViolation::UnknownStream {
                id: stream_id.to_owned(),
            }
            .into()
        })
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use rstream_primitives::messages::BeginTransmission;

    use super::*;
    use crate::session::SessionState;

    #[derive(Debug)]
    struct NoopInitiator;

    #[async_trait]
    impl TransmissionInitiator for NoopInitiator {
        async fn begin_transmission(&self, _request: BeginTransmission) -> eyre::Result<()> {
            Ok(())
        }
    }

    fn create(registry: &SessionRegistry, max_allowed_length: u64) -> Arc<Session> {
        registry
            .create_session(
                SourceRef::new("test-source"),
                max_allowed_length,
                Arc::new(NoopInitiator),
                CancellationToken::new(),
            )
            .unwrap()
    }

    #[tokio::test]
    async fn test_create_registers_session() {
        let registry = SessionRegistry::default();

        let session = create(&registry, 100);

        assert_eq!(registry.len(), 1);
        assert!(registry.contains(&session.id()));
        assert!(Arc::ptr_eq(&registry.lookup(&session.id()).unwrap(), &session));
    }

    #[tokio::test]
    async fn test_register_rejects_duplicate_id() {
        let registry = SessionRegistry::default();
        let session = create(&registry, 100);

        assert_eq!(
            registry.register(Arc::clone(&session)),
            Err(StreamError::Duplicate(session.id()))
        );
        assert_eq!(registry.len(), 1);
    }

    #[tokio::test]
    async fn test_unregister_is_idempotent() {
        let registry = SessionRegistry::default();
        let session = create(&registry, 100);

        assert!(registry.unregister(&session.id()).is_some());
        assert!(registry.unregister(&session.id()).is_none());
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn test_unknown_stream_is_reported_to_caller() {
        let registry = SessionRegistry::default();
        let live = create(&registry, 100);
        let stale = create(&registry, 100);
        let _ = registry.unregister(&stale.id());

        for id in [stale.id().to_string(), "not-a-stream-id".to_owned()] {
            let err = registry
                .supply_chunk(&id, Bytes::from_static(b"x"), 1, None)
                .await
                .unwrap_err();

            assert_eq!(
                err,
                StreamError::Protocol(ProtocolViolation::UnknownStream { id })
            );
        }

        assert_eq!(live.state(), SessionState::NotStarted);
        assert_eq!(live.bytes_received(), 0);
        assert_eq!(stale.bytes_received(), 0);
    }

    #[tokio::test]
    async fn test_supply_routes_to_matching_session() {
        let registry = SessionRegistry::default();
        let first = create(&registry, 100);
        let second = create(&registry, 100);

        registry
            .supply(SupplyChunk::data(second.id(), b"abc".to_vec(), 3))
            .await
            .unwrap();

        assert_eq!(first.bytes_received(), 0);
        assert_eq!(second.bytes_received(), 3);
        assert_eq!(second.state(), SessionState::Completed);
    }

    #[tokio::test]
    async fn test_supply_sequence_delivers_every_item() {
        let registry = SessionRegistry::default();
        let session = create(&registry, 100);

        let chunks = futures_util::stream::iter([
            Ok::<_, String>(Bytes::from_static(b"abc")),
            Ok(Bytes::from_static(b"defgh")),
        ]);

        registry
            .supply_sequence(&session.id().to_string(), chunks, 8)
            .await
            .unwrap();

        assert_eq!(session.read(16).await.unwrap().unwrap(), &b"abc"[..]);
        assert_eq!(session.read(16).await.unwrap().unwrap(), &b"defgh"[..]);
        assert_eq!(session.read(16).await, Ok(None));
    }

    #[tokio::test]
    async fn test_supply_sequence_detects_truncation() {
        let registry = SessionRegistry::default();
        let session = create(&registry, 100);

        let chunks = futures_util::stream::iter([Ok::<_, String>(Bytes::from_static(b"abc"))]);

        registry
            .supply_sequence(&session.id().to_string(), chunks, 8)
            .await
            .unwrap();

        assert_eq!(session.read(16).await.unwrap().unwrap(), &b"abc"[..]);
        assert_eq!(
            session.read(16).await,
            Err(StreamError::Protocol(ProtocolViolation::Truncated {
                declared: 8,
                received: 3
            }))
        );
    }

    #[tokio::test]
    async fn test_supply_sequence_item_error_is_remote_error() {
        let registry = SessionRegistry::default();
        let session = create(&registry, 100);

        let chunks = futures_util::stream::iter([
            Ok(Bytes::from_static(b"abc")),
            Err("disk read failed"),
        ]);

        registry
            .supply_sequence(&session.id().to_string(), chunks, 8)
            .await
            .unwrap();

        assert_eq!(session.read(16).await.unwrap().unwrap(), &b"abc"[..]);
        assert_eq!(
            session.read(16).await,
            Err(StreamError::RemoteReported("disk read failed".to_owned()))
        );
    }
}
