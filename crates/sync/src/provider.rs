//! The Sync Provider: runs the host side of the view protocol.
//!
//! One provider serves every document of the OFD view type. It owns the view registry and
//! the pending request table, so request ids are unique per provider instance.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use async_trait::async_trait;
use bytes::Bytes;
use ofdview_protocol::{Envelope, HostMessage, InitBody, ViewId, kind};
use serde_json::Value;
use tokio::task::JoinHandle;
use tracing::{debug, trace, warn};

use crate::bootstrap::BootstrapPage;
use crate::config::SyncConfig;
use crate::document::{DocumentDelegate, DocumentEdit, OfdDocument};
use crate::event::{DisposableStore, Emitter, Subscription};
use crate::pending::PendingRequests;
use crate::registry::ViewRegistry;
use crate::source::ByteSource;
use crate::uri::DocumentUri;
use crate::view::{ViewHandle, ViewInbox, ViewPort, open_view};
use crate::{Error, Result};

/// View type the provider is registered under.
pub const VIEW_TYPE: &str = "com.xxss0903.ofdviewer";

const DEFAULT_EDIT_LABEL: &str = "Edit";

/// Extra information for [`SyncProvider::open_custom_document`].
#[derive(Debug, Clone, Default)]
pub struct OpenContext {
	/// Backup to restore from instead of the document's own location.
	pub backup: Option<DocumentUri>,
}

/// A document became dirty because a view reported an edit.
#[derive(Debug, Clone)]
pub struct CustomDocumentEditEvent {
	/// The edited document.
	pub uri: DocumentUri,
	/// The edit, with its undo/redo pair.
	pub edit: DocumentEdit,
}

/// A view failed to parse or render its document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ViewErrorReport {
	/// The document shown by the view.
	pub uri: DocumentUri,
	/// The reporting view.
	pub view: ViewId,
	/// Failure text from the view.
	pub message: String,
}

struct ProviderInner {
	source: Arc<dyn ByteSource>,
	config: SyncConfig,
	views: ViewRegistry,
	requests: PendingRequests,
	next_view_id: AtomicU64,
	on_view_closed: Subscription,
	on_did_change_custom_document: Emitter<CustomDocumentEditEvent>,
	on_did_report_error: Emitter<ViewErrorReport>,
}

/// Host-side orchestrator of the document/view protocol.
///
/// Cheap to clone; clones share all state.
#[derive(Clone)]
pub struct SyncProvider {
	inner: Arc<ProviderInner>,
}

/// Fetches authoritative bytes for one document from its views.
///
/// Resolves the provider lazily, so documents never keep it alive.
struct ViewDataDelegate {
	uri: DocumentUri,
	provider: Weak<ProviderInner>,
}

#[async_trait]
impl DocumentDelegate for ViewDataDelegate {
	async fn get_file_data(&self) -> Result<Bytes> {
		let inner = self.provider.upgrade().ok_or(Error::ServiceStopped)?;
		inner.fetch_file_data(&self.uri).await
	}
}

impl SyncProvider {
	/// Creates a provider reading documents from `source`.
	pub fn new(source: Arc<dyn ByteSource>, config: SyncConfig) -> Self {
		let inner = Arc::new_cyclic(|weak: &Weak<ProviderInner>| {
			let views = ViewRegistry::new();
			let weak = weak.clone();
			let on_view_closed = views.on_did_close_view(move |id| {
				if let Some(inner) = weak.upgrade() {
					inner.requests.fail_view(*id);
				}
			});
			ProviderInner {
				source,
				config,
				views,
				requests: PendingRequests::new(),
				next_view_id: AtomicU64::new(1),
				on_view_closed,
				on_did_change_custom_document: Emitter::new(),
				on_did_report_error: Emitter::new(),
			}
		});
		Self { inner }
	}

	/// The provider's configuration.
	pub fn config(&self) -> &SyncConfig {
		&self.inner.config
	}

	/// The registry of open views.
	pub fn views(&self) -> &ViewRegistry {
		&self.inner.views
	}

	/// Number of requests still waiting for a reply.
	pub fn outstanding_requests(&self) -> usize {
		self.inner.requests.outstanding()
	}

	/// Opens a transport for a new view with a provider-unique id.
	pub fn create_view(&self) -> (ViewHandle, ViewInbox, ViewPort) {
		let id = ViewId(self.inner.next_view_id.fetch_add(1, Ordering::Relaxed));
		open_view(id)
	}

	/// Fired when a view reports an edit.
	pub fn on_did_change_custom_document(
		&self,
		listener: impl Fn(&CustomDocumentEditEvent) + Send + Sync + 'static,
	) -> Subscription {
		self.inner.on_did_change_custom_document.subscribe(listener)
	}

	/// Fired when a view reports a parse or render failure.
	pub fn on_did_report_error(&self, listener: impl Fn(&ViewErrorReport) + Send + Sync + 'static) -> Subscription {
		self.inner.on_did_report_error.subscribe(listener)
	}

	/// Loads a document and wires its events to the views showing it.
	///
	/// Fails only if the Byte Source fails.
	pub async fn open_custom_document(&self, uri: DocumentUri, context: OpenContext) -> Result<Arc<OfdDocument>> {
		let delegate = ViewDataDelegate {
			uri: uri.clone(),
			provider: Arc::downgrade(&self.inner),
		};
		let document = OfdDocument::create(uri, context.backup.as_ref(), self.inner.source.as_ref(), Box::new(delegate)).await?;

		let listeners = Arc::new(DisposableStore::new());

		let weak = Arc::downgrade(&self.inner);
		let key = document.uri().clone();
		listeners.add(document.on_did_change_content(move |change| {
			if let Some(inner) = weak.upgrade() {
				inner.fan_out_update(&key, &change.content);
			}
		}));

		let weak = Arc::downgrade(&self.inner);
		let key = document.uri().clone();
		listeners.add(document.on_did_change(move |edit| {
			if let Some(inner) = weak.upgrade() {
				inner.on_did_change_custom_document.fire(&CustomDocumentEditEvent {
					uri: key.clone(),
					edit: edit.clone(),
				});
			}
		}));

		let store = listeners.clone();
		listeners.add(document.on_did_dispose(move || store.dispose()));

		debug!(uri = %document.uri(), "document opened");
		Ok(document)
	}

	/// Registers `view` for `document` and installs its bootstrap page.
	///
	/// Requests sent to the view fail with [`Error::ViewClosed`] once it closes, through the
	/// registry's close event. `init` is sent later, when the view reports `ready`.
	pub fn attach_view(&self, document: &OfdDocument, view: &ViewHandle) -> Result<()> {
		if document.is_disposed() {
			return Err(Error::Disposed(document.uri().clone()));
		}
		if !self.inner.views.add(document.uri(), view) {
			return Err(Error::ViewClosed(view.id()));
		}

		view.set_bootstrap(BootstrapPage::new(&self.inner.config.assets));
		debug!(uri = %document.uri(), view = %view.id(), "view attached");
		Ok(())
	}

	/// Attaches `view` and spawns the task feeding its inbound messages to
	/// [`SyncProvider::handle_message`].
	///
	/// The task ends when the view closes. A view whose port goes away is closed.
	pub fn resolve_custom_editor(
		&self,
		document: Arc<OfdDocument>,
		view: ViewHandle,
		mut inbox: ViewInbox,
	) -> Result<JoinHandle<()>> {
		self.attach_view(&document, &view)?;

		let provider = self.clone();
		Ok(tokio::spawn(async move {
			loop {
				tokio::select! {
					() = view.closed() => break,
					message = inbox.recv() => match message {
						Some(message) => provider.handle_message(&document, &view, message),
						None => {
							view.close();
							break;
						}
					},
				}
			}
			debug!(view = %view.id(), "view pump stopped");
		}))
	}

	/// Dispatches one message received from `view`.
	pub fn handle_message(&self, document: &OfdDocument, view: &ViewHandle, message: Envelope) {
		if message.is(kind::OPEN_OFD_ERROR) {
			let text = message.error_text().unwrap_or_default();
			warn!(uri = %document.uri(), view = %view.id(), error = %text, "view failed to open document");
			self.inner.on_did_report_error.fire(&ViewErrorReport {
				uri: document.uri().clone(),
				view: view.id(),
				message: text,
			});
			return;
		}

		if let Some(id) = message.request_id {
			let body = message.body.clone().unwrap_or_default();
			if self.inner.requests.resolve(view.id(), id, body) {
				return;
			}
		}

		match message.kind.as_str() {
			kind::READY => self.send_init(document, view),
			kind::EDIT => {
				let label = message
					.body
					.as_ref()
					.and_then(|b| b.get("label"))
					.and_then(Value::as_str)
					.unwrap_or(DEFAULT_EDIT_LABEL);
				self.inner.views.mark_active(view.id());
				if let Err(err) = document.make_edit(label) {
					debug!(view = %view.id(), error = %err, "edit dropped");
				}
			}
			other => {
				trace!(view = %view.id(), kind = other, request_id = ?message.request_id, "ignoring unsolicited message");
			}
		}
	}

	/// Sends `init` with the document's current bytes, once per view.
	fn send_init(&self, document: &OfdDocument, view: &ViewHandle) {
		if document.is_disposed() {
			debug!(uri = %document.uri(), view = %view.id(), "ready after dispose ignored");
			return;
		}
		if !view.mark_initialized() {
			debug!(view = %view.id(), "duplicate ready ignored");
			return;
		}

		let uri = document.uri();
		let body = if uri.is_untitled() {
			InitBody::untitled()
		} else {
			InitBody::persisted(document.content().to_vec(), self.inner.source.is_writable(uri.scheme()))
		};
		let editable = body.editable();

		match self.inner.post_message(view, HostMessage::Init(body)) {
			Ok(()) => {
				document.mark_ready();
				debug!(uri = %uri, view = %view.id(), editable, "init sent");
			}
			Err(err) => warn!(uri = %uri, view = %view.id(), error = %err, "init not delivered"),
		}
	}

	/// Sends a message without waiting for a reply.
	pub fn post_message(&self, view: &ViewHandle, message: HostMessage) -> Result<()> {
		self.inner.post_message(view, message)
	}

	/// Sends a request and waits for the reply body.
	///
	/// Fails with [`Error::ViewClosed`] if the view closes first and with
	/// [`Error::RequestTimeout`] once the configured timeout passes.
	pub async fn post_message_with_response(&self, view: &ViewHandle, message: HostMessage) -> Result<Value> {
		self.inner.post_message_with_response(view, message).await
	}

	/// Asks the authoritative view of `uri` for the bytes it holds.
	pub async fn fetch_file_data(&self, uri: &DocumentUri) -> Result<Bytes> {
		self.inner.fetch_file_data(uri).await
	}

	/// Pulls the bytes from a view into the document, then pushes them to every view.
	pub async fn sync_from_view(&self, document: &OfdDocument) -> Result<Bytes> {
		let data = document.get_file_data().await?;
		document.replace_content(data.clone())?;
		Ok(data)
	}

	/// Saving is not supported.
	pub async fn save_custom_document(&self, document: &OfdDocument) -> Result<()> {
		debug!(uri = %document.uri(), "save requested");
		Err(Error::Unimplemented("saveCustomDocument"))
	}

	/// Saving to another location is not supported.
	pub async fn save_custom_document_as(&self, document: &OfdDocument, destination: &DocumentUri) -> Result<()> {
		debug!(uri = %document.uri(), destination = %destination, "save as requested");
		Err(Error::Unimplemented("saveCustomDocumentAs"))
	}

	/// Reverting is not supported.
	pub async fn revert_custom_document(&self, document: &OfdDocument) -> Result<()> {
		debug!(uri = %document.uri(), "revert requested");
		Err(Error::Unimplemented("revertCustomDocument"))
	}

	/// Backups are not supported.
	pub async fn backup_custom_document(&self, document: &OfdDocument, destination: &DocumentUri) -> Result<DocumentUri> {
		debug!(uri = %document.uri(), destination = %destination, "backup requested");
		Err(Error::Unimplemented("backupCustomDocument"))
	}
}

impl ProviderInner {
	fn post_message(&self, view: &ViewHandle, message: HostMessage) -> Result<()> {
		view.post(message.into_envelope())
	}

	async fn post_message_with_response(&self, view: &ViewHandle, message: HostMessage) -> Result<Value> {
		let (id, rx) = self.requests.register(view.id());
		if let Err(err) = view.post(message.into_request(id)) {
			self.requests.cancel(id);
			return Err(err);
		}
		debug!(request_id = %id, view = %view.id(), "request sent");

		let reply = match self.config.request_timeout() {
			Some(limit) => match tokio::time::timeout(limit, rx).await {
				Ok(reply) => reply,
				Err(_elapsed) => {
					self.requests.cancel(id);
					warn!(request_id = %id, view = %view.id(), "request timed out");
					return Err(Error::RequestTimeout(id));
				}
			},
			None => rx.await,
		};
		reply.map_err(|_| Error::ViewClosed(view.id()))?
	}

	async fn fetch_file_data(&self, uri: &DocumentUri) -> Result<Bytes> {
		let view = self
			.views
			.authoritative(uri, self.config.source_policy)
			.ok_or_else(|| Error::NoViewAvailable(uri.clone()))?;
		let body = self.post_message_with_response(&view, HostMessage::GetFileData).await?;
		let data: Vec<u8> = serde_json::from_value(body)?;
		debug!(uri = %uri, view = %view.id(), len = data.len(), "file data received");
		Ok(Bytes::from(data))
	}

	fn fan_out_update(&self, uri: &DocumentUri, content: &Bytes) {
		let views = self.views.get(uri);
		let message = HostMessage::Update {
			content: content.to_vec(),
		}
		.into_envelope();
		for view in &views {
			if let Err(err) = view.post(message.clone()) {
				warn!(uri = %uri, view = %view.id(), error = %err, "update not delivered");
			}
		}
		debug!(uri = %uri, views = views.len(), len = content.len(), "update fanned out");
	}
}

impl Drop for ProviderInner {
	fn drop(&mut self) {
		self.on_view_closed.dispose();
	}
}

impl std::fmt::Debug for SyncProvider {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("SyncProvider")
			.field("config", &self.inner.config)
			.field("views", &self.inner.views)
			.field("requests", &self.inner.requests)
			.finish_non_exhaustive()
	}
}

#[cfg(test)]
mod tests;
