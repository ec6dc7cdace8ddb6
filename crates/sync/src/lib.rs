//! Document/view synchronization for the OFD custom editor.
//!
//! One logical document maps to zero or more live views. The host owns the authoritative
//! bytes; views render them and report back through an untyped message channel. This crate
//! is the host side of that arrangement:
//!
//! * [`source`]: Byte Source, reading document bytes from storage or a backup.
//! * [`document::OfdDocument`]: the Document Entity owning the byte buffer and its events.
//! * [`registry::ViewRegistry`]: multi-map from document identity to open views.
//! * [`pending::PendingRequests`]: request/response correlation across the channel.
//! * [`provider::SyncProvider`]: the orchestrator running the message protocol.
//!
//! Everything reacts to events on one cooperative event loop. Locks guard short critical
//! sections only and are never held across an `.await`.
#![warn(missing_docs)]

use std::io;

pub use ofdview_protocol as protocol;
pub use ofdview_protocol::{Envelope, HostMessage, InitBody, RequestId, ViewId};

pub mod bootstrap;
pub mod config;
pub mod document;
pub mod event;
pub mod pending;
pub mod provider;
pub mod registry;
pub mod source;
pub mod uri;
pub mod view;

pub use bootstrap::{AssetLayout, BootstrapPage};
pub use config::{SourcePolicy, SyncConfig};
pub use document::{ContentChange, DocumentDelegate, DocumentEdit, DocumentState, OfdDocument};
pub use event::{DisposableStore, Emitter, Subscription};
pub use pending::PendingRequests;
pub use provider::{CustomDocumentEditEvent, OpenContext, SyncProvider, VIEW_TYPE, ViewErrorReport};
pub use registry::{ViewRegistry, Views};
pub use source::{ByteSource, LocalFileSystem, MemorySource, read_document};
pub use uri::DocumentUri;
pub use view::{ViewHandle, ViewInbox, ViewPort, open_view};

/// A convenient type alias for `Result` with `E` = [`enum@crate::Error`].
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Possible errors.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
	/// The Byte Source failed to read a document or backup. Fatal to the open.
	#[error("failed to read {uri}: {source}")]
	StorageRead {
		/// Location that failed to read.
		uri: DocumentUri,
		/// The underlying storage error.
		#[source]
		source: io::Error,
	},
	/// Authoritative bytes were requested while no view is open for the document.
	#[error("could not find a view to fetch data for {0}")]
	NoViewAvailable(DocumentUri),
	/// Save, backup and revert are not supported.
	#[error("{0} is not implemented")]
	Unimplemented(&'static str),
	/// The view closed before a message could be delivered or a reply arrived.
	#[error("{0} is closed")]
	ViewClosed(ViewId),
	/// The view did not answer a request in time.
	#[error("request {0} timed out")]
	RequestTimeout(RequestId),
	/// The document has been disposed.
	#[error("document {0} is disposed")]
	Disposed(DocumentUri),
	/// The provider that created the document no longer exists.
	#[error("sync provider stopped")]
	ServiceStopped,
	/// A view sent a payload that could not be decoded.
	#[error("deserialization failed: {0}")]
	Deserialize(#[from] serde_json::Error),
}
