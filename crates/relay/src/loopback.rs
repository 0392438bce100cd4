//! In-process peer serving local byte sources.
//!
//! Stands in for the remote side of the interop channel: on
//! `beginStreamTransmission` it spawns a sender that pushes the requested
//! source through [`SessionRegistry::supply_chunk`] in fixed-size chunks, the
//! same way a remote peer's send loop would. Backpressure from the relay
//! suspends the sender.

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use dashmap::DashMap;
use rstream_primitives::messages::{BeginTransmission, SourceRef, SupplyChunk};
use tracing::{debug, warn};

use crate::initiator::TransmissionInitiator;
use crate::registry::SessionRegistry;

#[derive(Clone, Debug)]
pub struct LoopbackPeer {
    registry: SessionRegistry,
    sources: Arc<DashMap<SourceRef, Bytes>>,
    chunk_size: usize,
}

impl LoopbackPeer {
    #[must_use]
    pub fn new(registry: SessionRegistry, chunk_size: usize) -> Self {
        Self {
            registry,
            sources: Arc::default(),
            chunk_size: chunk_size.max(1),
        }
    }

    /// Makes `data` available under `source`, returning what it replaced.
    pub fn serve(&self, source: SourceRef, data: Bytes) -> Option<Bytes> {
        self.sources.insert(source, data)
    }

    pub fn withdraw(&self, source: &SourceRef) -> Option<Bytes> {
        self.sources.remove(source).map(|(_, data)| data)
    }
}

#[async_trait]
impl TransmissionInitiator for LoopbackPeer {
    async fn begin_transmission(&self, request: BeginTransmission) -> eyre::Result<()> {
        let data = self
            .sources
            .get(&request.source)
            .map(|entry| entry.value().clone());

        drop(tokio::spawn(transmit(
            self.registry.clone(),
            request,
            data,
            self.chunk_size,
        )));

        Ok(())
    }
}

async fn transmit(
    registry: SessionRegistry,
    request: BeginTransmission,
    data: Option<Bytes>,
    chunk_size: usize,
) {
    let stream_id = request.stream_id.to_string();

    let Some(data) = data else {
        let message = SupplyChunk::error(
            request.stream_id,
            format!("unknown data source `{}`", request.source),
        );

        if let Err(err) = registry.supply(message).await {
            warn!(%stream_id, %err, "Failed to report unknown data source");
        }

        return;
    };

    let total_length = data.len() as u64;
    let mut offset: usize = 0;

    loop {
        let end = offset.saturating_add(chunk_size).min(data.len());

        if let Err(err) = registry
            .supply_chunk(&stream_id, data.slice(offset..end), total_length, None)
            .await
        {
            warn!(%stream_id, %err, "Stopping transmission");
            return;
        }

        offset = end;

        if offset >= data.len() {
            break;
        }

        let closed = registry
            .lookup(&request.stream_id)
            .map_or(true, |session| session.state().is_terminal());

        if closed {
            debug!(%stream_id, offset, total_length, "Session closed, stopping transmission");
            return;
        }
    }

    debug!(%stream_id, source=%request.source, total_length, "Transmission finished");
}
