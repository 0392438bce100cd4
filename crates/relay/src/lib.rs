//! Remote chunked-stream reassembly.
//!
//! A peer on the far side of a message-based channel pushes a stream as a
//! sequence of chunks, whenever it likes. This crate turns those pushes back
//! into a single pull-based, backpressured byte stream.
//!
//! # Modules
//!
//! - [`buffer`]: bounded relay between the delivery path and the reader
//! - [`session`]: per-stream validation and the read path
//! - [`registry`]: routes inbound chunks to their session
//! - [`initiator`]: the lazy `beginStreamTransmission` handshake
//! - [`stream`]: [`DataReference`] and the consumer-facing [`RemoteStream`]
//! - [`loopback`]: an in-process peer for local transfers and tests
//!
//! # Example
//!
//! ```rust,ignore
//! let registry = SessionRegistry::new(RelayConfig::default());
//!
//! // transport side: every inbound `supplyData` call
//! registry.supply_chunk(&stream_id, chunk, total_length, error).await?;
//!
//! // consumer side
//! let reference = DataReference::new(registry.clone(), initiator, source);
//! let mut stream = reference.open_read_stream(Some(1 << 20), cancel)?;
//! tokio::io::copy(&mut stream, &mut file).await?;
//! ```

pub mod buffer;
pub mod errors;
pub mod initiator;
pub mod loopback;
pub mod registry;
pub mod session;
pub mod stream;

pub use errors::{ProtocolViolation, RelayError, StreamError};
pub use initiator::TransmissionInitiator;
pub use registry::SessionRegistry;
pub use session::{Session, SessionState};
pub use stream::{DataReference, RemoteStream};
