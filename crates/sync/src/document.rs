//! Document Entity: the host-side byte buffer of one logical document.
//!
//! Only a view holds live edits, so fetching authoritative bytes goes back out through a
//! [`DocumentDelegate`] supplied by whoever created the document.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::RwLock;
use tracing::debug;

use crate::event::{Emitter, Subscription};
use crate::source::{ByteSource, read_document};
use crate::uri::DocumentUri;
use crate::{Error, Result};

/// Capability to fetch the bytes a live view currently holds.
#[async_trait]
pub trait DocumentDelegate: Send + Sync {
	/// Asks a live view for its current bytes.
	async fn get_file_data(&self) -> Result<Bytes>;
}

/// Lifecycle of a document as seen by the host.
///
/// Editing is not a stored state; it is the transient condition of a change event firing
/// while [`DocumentState::Ready`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentState {
	/// Created, no view has received `init` yet.
	Opening,
	/// At least one view received `init`.
	Ready,
	/// Disposal started; nothing is sent to views anymore.
	Disposing,
	/// Disposal finished and all observers are released.
	Disposed,
}

/// Payload of [`OfdDocument::on_did_change_content`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentChange {
	/// The new document bytes.
	pub content: Bytes,
}

/// Undo or redo step attached to an edit.
pub type EditAction = Arc<dyn Fn() + Send + Sync>;

/// A user edit reported to the host's dirty tracking.
///
/// The host requires an undo/redo pair with every edit. Persistent undo is not supported,
/// so [`DocumentEdit::new`] attaches no-op steps.
#[derive(Clone)]
pub struct DocumentEdit {
	/// Label for the host's undo stack.
	pub label: String,
	undo: EditAction,
	redo: EditAction,
}

impl DocumentEdit {
	/// An edit whose undo and redo do nothing.
	pub fn new(label: impl Into<String>) -> Self {
		Self::with_actions(label, Arc::new(|| {}), Arc::new(|| {}))
	}

	/// An edit with explicit undo and redo steps.
	pub fn with_actions(label: impl Into<String>, undo: EditAction, redo: EditAction) -> Self {
		Self {
			label: label.into(),
			undo,
			redo,
		}
	}

	/// Runs the undo step.
	pub fn undo(&self) {
		(self.undo)();
	}

	/// Runs the redo step.
	pub fn redo(&self) {
		(self.redo)();
	}
}

impl fmt::Debug for DocumentEdit {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("DocumentEdit")
			.field("label", &self.label)
			.finish_non_exhaustive()
	}
}

/// One logical OFD document.
///
/// Exclusively owns its byte buffer. The buffer changes only through
/// [`OfdDocument::replace_content`], which notifies content observers.
pub struct OfdDocument {
	uri: DocumentUri,
	content: RwLock<Bytes>,
	state: RwLock<DocumentState>,
	delegate: Box<dyn DocumentDelegate>,
	on_did_dispose: Emitter<()>,
	on_did_change_content: Emitter<ContentChange>,
	on_did_change: Emitter<DocumentEdit>,
}

impl OfdDocument {
	/// Loads a document.
	///
	/// With a `backup` location the bytes come from the backup (crash recovery), otherwise
	/// from `uri`. Fails only if the Byte Source fails.
	pub async fn create(
		uri: DocumentUri,
		backup: Option<&DocumentUri>,
		source: &dyn ByteSource,
		delegate: Box<dyn DocumentDelegate>,
	) -> Result<Arc<Self>> {
		let data_uri = backup.unwrap_or(&uri);
		let content = read_document(source, data_uri).await?;
		debug!(uri = %uri, from_backup = backup.is_some(), len = content.len(), "document created");
		Ok(Arc::new(Self::new(uri, content, delegate)))
	}

	/// Wraps bytes that are already in memory.
	pub fn new(uri: DocumentUri, content: Bytes, delegate: Box<dyn DocumentDelegate>) -> Self {
		Self {
			uri,
			content: RwLock::new(content),
			state: RwLock::new(DocumentState::Opening),
			delegate,
			on_did_dispose: Emitter::new(),
			on_did_change_content: Emitter::new(),
			on_did_change: Emitter::new(),
		}
	}

	/// Document identity.
	pub fn uri(&self) -> &DocumentUri {
		&self.uri
	}

	/// The last-known bytes. Does not re-read storage.
	pub fn content(&self) -> Bytes {
		self.content.read().clone()
	}

	/// Current lifecycle state.
	pub fn state(&self) -> DocumentState {
		*self.state.read()
	}

	/// Returns true once disposal has started.
	pub fn is_disposed(&self) -> bool {
		matches!(self.state(), DocumentState::Disposing | DocumentState::Disposed)
	}

	/// Moves `Opening` to `Ready`. Returns true on the transition.
	pub(crate) fn mark_ready(&self) -> bool {
		let mut state = self.state.write();
		if *state == DocumentState::Opening {
			*state = DocumentState::Ready;
			true
		} else {
			false
		}
	}

	/// Fired once when the document is disposed.
	pub fn on_did_dispose(&self, listener: impl Fn() + Send + Sync + 'static) -> Subscription {
		self.on_did_dispose.subscribe(move |_: &()| listener())
	}

	/// Fired when the content buffer is replaced.
	pub fn on_did_change_content(
		&self,
		listener: impl Fn(&ContentChange) + Send + Sync + 'static,
	) -> Subscription {
		self.on_did_change_content.subscribe(listener)
	}

	/// Fired when a view reports a user edit; marks the document dirty for the host.
	pub fn on_did_change(&self, listener: impl Fn(&DocumentEdit) + Send + Sync + 'static) -> Subscription {
		self.on_did_change.subscribe(listener)
	}

	/// Replaces the buffer with authoritative bytes and notifies content observers.
	pub fn replace_content(&self, content: Bytes) -> Result<()> {
		if self.is_disposed() {
			return Err(Error::Disposed(self.uri.clone()));
		}
		*self.content.write() = content.clone();
		debug!(uri = %self.uri, len = content.len(), "document content replaced");
		self.on_did_change_content.fire(&ContentChange { content });
		Ok(())
	}

	/// Reports a user edit, re-emitted as a dirty event with no-op undo/redo.
	pub fn make_edit(&self, label: impl Into<String>) -> Result<()> {
		if self.is_disposed() {
			return Err(Error::Disposed(self.uri.clone()));
		}
		let edit = DocumentEdit::new(label);
		debug!(uri = %self.uri, label = %edit.label, "document edited");
		self.on_did_change.fire(&edit);
		Ok(())
	}

	/// Fetches the bytes held by a live view through the delegate.
	pub async fn get_file_data(&self) -> Result<Bytes> {
		if self.is_disposed() {
			return Err(Error::Disposed(self.uri.clone()));
		}
		self.delegate.get_file_data().await
	}

	/// Fires the disposal event once, then releases every observer.
	///
	/// Later calls do nothing.
	pub fn dispose(&self) {
		{
			let mut state = self.state.write();
			if matches!(*state, DocumentState::Disposing | DocumentState::Disposed) {
				return;
			}
			*state = DocumentState::Disposing;
		}
		debug!(uri = %self.uri, "disposing document");

		self.on_did_dispose.fire(&());
		self.on_did_dispose.close();
		self.on_did_change_content.close();
		self.on_did_change.close();

		*self.state.write() = DocumentState::Disposed;
	}
}

impl fmt::Debug for OfdDocument {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("OfdDocument")
			.field("uri", &self.uri)
			.field("len", &self.content.read().len())
			.field("state", &self.state())
			.finish_non_exhaustive()
	}
}
