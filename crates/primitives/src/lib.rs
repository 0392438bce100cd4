//! Shared types for remote data streams.
//!
//! Everything that crosses the interop boundary lives here: the stream
//! identifier, the payloads of the two remote calls, and the relay tunables.

pub mod config;
pub mod messages;
pub mod stream_id;
