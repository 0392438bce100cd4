//! Shared fixtures for relay integration tests.

pub mod mocks;

use std::sync::Arc;

use bytes::Bytes;
use rstream_primitives::config::RelayConfig;
use rstream_primitives::messages::SourceRef;
use rstream_relay::loopback::LoopbackPeer;
use rstream_relay::SessionRegistry;

/// Deterministic payload where every byte encodes its position.
pub fn patterned_payload(len: usize) -> Bytes {
    (0..len).map(|i| (i % 251) as u8).collect::<Vec<_>>().into()
}

/// Registry with a small relay so backpressure kicks in early.
pub fn small_registry(buffer_capacity: usize) -> SessionRegistry {
    SessionRegistry::new(RelayConfig::new(buffer_capacity, 1 << 20, 512_000))
}

/// Loopback peer already serving `data` under `name`.
pub fn loopback_serving(
    registry: &SessionRegistry,
    chunk_size: usize,
    name: &str,
    data: Bytes,
) -> (Arc<LoopbackPeer>, SourceRef) {
    let peer = Arc::new(LoopbackPeer::new(registry.clone(), chunk_size));
    let source = SourceRef::new(name);

    let _ = peer.serve(source.clone(), data);

    (peer, source)
}
