use core::fmt;
use core::str::FromStr;

use rand::{thread_rng, Rng};
use serde::de::Error as SerdeError;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

pub const STREAM_ID_LEN: usize = 16;

/// Process-unique identifier of a remote data stream.
///
/// 128 random bits, rendered as 32 lowercase hex digits on the wire.
#[derive(Eq, Copy, Hash, Clone, PartialEq, Ord, PartialOrd)]
pub struct StreamId([u8; STREAM_ID_LEN]);

impl StreamId {
    #[must_use]
    pub fn random() -> Self {
        Self(thread_rng().gen())
    }

    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; STREAM_ID_LEN] {
        &self.0
    }
}

impl From<[u8; STREAM_ID_LEN]> for StreamId {
    fn from(id: [u8; STREAM_ID_LEN]) -> Self {
        Self(id)
    }
}

impl fmt::Display for StreamId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(&hex::encode(self.0))
    }
}

impl fmt::Debug for StreamId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("StreamId")
            .field(&format_args!("{self}"))
            .finish()
    }
}

impl From<StreamId> for String {
    fn from(id: StreamId) -> Self {
        id.to_string()
    }
}

#[derive(Debug, Error)]
#[error("invalid stream identifier: {0}")]
pub struct InvalidStreamId(hex::FromHexError);

impl FromStr for StreamId {
    type Err = InvalidStreamId;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut id = [0; STREAM_ID_LEN];

        hex::decode_to_slice(s, &mut id).map_err(InvalidStreamId)?;

        Ok(Self(id))
    }
}

impl Serialize for StreamId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for StreamId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let encoded = String::deserialize(deserializer)?;

        encoded.parse().map_err(D::Error::custom)
    }
}
