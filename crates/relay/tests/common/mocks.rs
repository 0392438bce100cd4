//! Mock transmission initiators

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use eyre::{bail, Result};
use rstream_primitives::messages::BeginTransmission;
use rstream_relay::TransmissionInitiator;

/// Records every handshake without sending anything; tests push chunks by hand.
#[derive(Clone, Debug, Default)]
pub struct RecordingInitiator {
    requests: Arc<Mutex<Vec<BeginTransmission>>>,
}

impl RecordingInitiator {
    pub fn new() -> Self {
        Self::default()
    }

    /// All handshakes seen so far
    pub fn requests(&self) -> Vec<BeginTransmission> {
        self.requests.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

#[async_trait]
impl TransmissionInitiator for RecordingInitiator {
    async fn begin_transmission(&self, request: BeginTransmission) -> Result<()> {
        self.requests.lock().unwrap().push(request);
        Ok(())
    }
}

/// Fails every handshake, as a peer that cannot be reached would.
#[derive(Clone, Copy, Debug, Default)]
pub struct UnreachableInitiator;

#[async_trait]
impl TransmissionInitiator for UnreachableInitiator {
    async fn begin_transmission(&self, _request: BeginTransmission) -> Result<()> {
        bail!("peer unreachable")
    }
}
