//! Host/view message protocol for the OFD custom editor.
//!
//! The transport between the host and an isolated view is untyped: every message is an
//! [`Envelope`] of the shape `{ type, requestId?, body? }`. This crate provides:
//! * [`Envelope`]: The untyped wire envelope with JSON encoding.
//! * [`HostMessage`]: Typed host→view pushes and requests (`init`, `update`, `getFileData`).
//! * [`ViewMessage`]: Typed view→host messages (`ready`, replies, `openOfdError`, `edit`).
//! * [`CounterIdGen`]: Monotonic request id generator owned by one host instance.

#![warn(missing_docs)]

pub mod message;
pub mod protocol;
pub mod types;

pub use message::{Envelope, HostMessage, InitBody, ViewMessage, kind};
pub use protocol::CounterIdGen;
pub use types::{RequestId, ViewId};

/// A convenient type alias for `Result` with `E` = [`enum@crate::Error`].
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Possible protocol errors.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
	/// The envelope or its body could not be decoded.
	#[error("deserialization failed: {0}")]
	Deserialize(#[from] serde_json::Error),
	/// The envelope carries a `type` this side does not understand.
	#[error("unrecognized message type: {0}")]
	UnknownKind(String),
}
