//! Outbound handshake asking the peer to start sending chunks.

use async_trait::async_trait;
use rstream_primitives::messages::BeginTransmission;

/// Dispatches [`BEGIN_TRANSMISSION_METHOD`] to the peer.
///
/// Implementations resolve once the call has been dispatched, not once the
/// transfer is done; chunks arrive later through the registry.
///
/// [`BEGIN_TRANSMISSION_METHOD`]: rstream_primitives::messages::BEGIN_TRANSMISSION_METHOD
#[async_trait]
pub trait TransmissionInitiator: Send + Sync {
    async fn begin_transmission(&self, request: BeginTransmission) -> eyre::Result<()>;
}
