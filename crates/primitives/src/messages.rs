//! Payloads of the two interop calls.
//!
//! The transport delivers [`SupplyChunk`] to the local side once per chunk,
//! and the local side invokes [`BEGIN_TRANSMISSION_METHOD`] on the peer with a
//! [`BeginTransmission`] payload when a stream is first read.

use core::fmt;

use serde::{Deserialize, Serialize};

use crate::stream_id::StreamId;

/// Remote method that asks the peer to start sending chunks.
pub const BEGIN_TRANSMISSION_METHOD: &str = "beginStreamTransmission";

/// Local entry point the peer invokes for every chunk.
pub const SUPPLY_DATA_METHOD: &str = "supplyData";

/// Opaque handle naming the data source on the peer side.
#[derive(Clone, Debug, Eq, Hash, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SourceRef(String);

impl SourceRef {
    #[must_use]
    pub fn new(source: impl Into<String>) -> Self {
        Self(source.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SourceRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(&self.0)
    }
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BeginTransmission {
    pub source: SourceRef,
    pub stream_id: StreamId,
}

impl BeginTransmission {
    #[must_use]
    pub const fn new(source: SourceRef, stream_id: StreamId) -> Self {
        Self { source, stream_id }
    }
}

/// One chunk pushed by the peer.
///
/// `stream_id` stays a plain string: the peer may reference identifiers this
/// side never issued, and that must surface as an unknown stream rather than
/// a decoding failure.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SupplyChunk {
    pub stream_id: String,
    pub chunk: Vec<u8>,
    pub total_length: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl SupplyChunk {
    #[must_use]
    pub fn data(stream_id: StreamId, chunk: Vec<u8>, total_length: u64) -> Self {
        Self {
            stream_id: stream_id.to_string(),
            chunk,
            total_length,
            error: None,
        }
    }

    #[must_use]
    pub fn error(stream_id: StreamId, error: impl Into<String>) -> Self {
        Self {
            stream_id: stream_id.to_string(),
            chunk: Vec::new(),
            total_length: 0,
            error: Some(error.into()),
        }
    }
}
