//! Host/view transport endpoints.
//!
//! [`open_view`] builds one order-preserving channel pair per view. The host keeps the
//! [`ViewHandle`] for sending and the [`ViewInbox`] for receiving; the view side gets the
//! [`ViewPort`].

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use ofdview_protocol::{Envelope, ViewId};
use parking_lot::RwLock;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::bootstrap::BootstrapPage;
use crate::event::{Emitter, Subscription};
use crate::{Error, Result};

struct ViewShared {
	id: ViewId,
	closed: AtomicBool,
	initialized: AtomicBool,
	cancel: CancellationToken,
	bootstrap: RwLock<Option<Arc<BootstrapPage>>>,
	on_did_dispose: Emitter<ViewId>,
}

/// Host-owned reference to one rendering surface.
///
/// Carries no document state; it is only an endpoint for message delivery. Clones refer to
/// the same view.
#[derive(Clone)]
pub struct ViewHandle {
	shared: Arc<ViewShared>,
	outbound: mpsc::UnboundedSender<Envelope>,
}

/// Host-side stream of messages sent by one view.
pub struct ViewInbox {
	id: ViewId,
	rx: mpsc::UnboundedReceiver<Envelope>,
}

/// View-side endpoint of the channel.
pub struct ViewPort {
	shared: Arc<ViewShared>,
	incoming: mpsc::UnboundedReceiver<Envelope>,
	outgoing: mpsc::UnboundedSender<Envelope>,
}

/// Creates the channel pair for a new view.
pub fn open_view(id: ViewId) -> (ViewHandle, ViewInbox, ViewPort) {
	let (to_view, incoming) = mpsc::unbounded_channel();
	let (outgoing, from_view) = mpsc::unbounded_channel();
	let shared = Arc::new(ViewShared {
		id,
		closed: AtomicBool::new(false),
		initialized: AtomicBool::new(false),
		cancel: CancellationToken::new(),
		bootstrap: RwLock::new(None),
		on_did_dispose: Emitter::new(),
	});

	let handle = ViewHandle {
		shared: shared.clone(),
		outbound: to_view,
	};
	let inbox = ViewInbox { id, rx: from_view };
	let port = ViewPort {
		shared,
		incoming,
		outgoing,
	};
	(handle, inbox, port)
}

impl ViewHandle {
	/// The view's identifier.
	pub fn id(&self) -> ViewId {
		self.shared.id
	}

	/// Sends a message to the view.
	///
	/// Fails with [`Error::ViewClosed`] and sends nothing once the view is closed. A view
	/// whose port is gone is closed by the failed send.
	pub fn post(&self, message: Envelope) -> Result<()> {
		if self.is_closed() {
			return Err(Error::ViewClosed(self.id()));
		}
		if self.outbound.send(message).is_err() {
			debug!(view = %self.id(), "view port dropped, closing view");
			self.close();
			return Err(Error::ViewClosed(self.id()));
		}
		Ok(())
	}

	/// Closes the view. Fires [`ViewHandle::on_did_dispose`] exactly once.
	pub fn close(&self) {
		if self.shared.closed.swap(true, Ordering::AcqRel) {
			return;
		}
		debug!(view = %self.id(), "view closed");
		self.shared.cancel.cancel();
		self.shared.on_did_dispose.fire(&self.shared.id);
		self.shared.on_did_dispose.close();
	}

	/// Returns true once the view is closed.
	pub fn is_closed(&self) -> bool {
		self.shared.closed.load(Ordering::Acquire)
	}

	/// Resolves when the view closes.
	pub async fn closed(&self) {
		self.shared.cancel.cancelled().await;
	}

	/// Fired once when the view closes. Subscribing to a closed view registers nothing.
	pub fn on_did_dispose(&self, listener: impl Fn(ViewId) + Send + Sync + 'static) -> Subscription {
		self.shared.on_did_dispose.subscribe(move |id: &ViewId| listener(*id))
	}

	#[cfg(test)]
	pub(crate) fn dispose_listener_count(&self) -> usize {
		self.shared.on_did_dispose.listener_count()
	}

	/// Installs the bootstrap page the view loads.
	pub fn set_bootstrap(&self, page: BootstrapPage) {
		*self.shared.bootstrap.write() = Some(Arc::new(page));
	}

	/// The installed bootstrap page.
	pub fn bootstrap(&self) -> Option<Arc<BootstrapPage>> {
		self.shared.bootstrap.read().clone()
	}

	/// Marks `init` as sent. Returns false if it already was.
	pub(crate) fn mark_initialized(&self) -> bool {
		!self.shared.initialized.swap(true, Ordering::AcqRel)
	}

	/// Returns true once the view received `init`.
	pub fn is_initialized(&self) -> bool {
		self.shared.initialized.load(Ordering::Acquire)
	}
}

impl fmt::Debug for ViewHandle {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("ViewHandle")
			.field("id", &self.id())
			.field("closed", &self.is_closed())
			.field("initialized", &self.is_initialized())
			.finish()
	}
}

impl ViewInbox {
	/// The view this inbox belongs to.
	pub fn id(&self) -> ViewId {
		self.id
	}

	/// Next message from the view, or `None` once its port is dropped.
	pub async fn recv(&mut self) -> Option<Envelope> {
		self.rx.recv().await
	}

	/// Next already queued message.
	pub fn try_recv(&mut self) -> Option<Envelope> {
		self.rx.try_recv().ok()
	}
}

impl fmt::Debug for ViewInbox {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("ViewInbox").field("id", &self.id).finish_non_exhaustive()
	}
}

impl ViewPort {
	/// The view's identifier.
	pub fn id(&self) -> ViewId {
		self.shared.id
	}

	/// Sends a message to the host.
	pub fn post(&self, message: Envelope) -> Result<()> {
		if self.is_closed() {
			return Err(Error::ViewClosed(self.id()));
		}
		self.outgoing.send(message).map_err(|_| Error::ViewClosed(self.id()))
	}

	/// Next message from the host.
	///
	/// Messages queued before a close are still delivered; after that `None`.
	pub async fn recv(&mut self) -> Option<Envelope> {
		tokio::select! {
			biased;
			message = self.incoming.recv() => message,
			() = self.shared.cancel.cancelled() => self.incoming.try_recv().ok(),
		}
	}

	/// Next already queued message.
	pub fn try_recv(&mut self) -> Option<Envelope> {
		self.incoming.try_recv().ok()
	}

	/// Returns true once the host closed the view.
	pub fn is_closed(&self) -> bool {
		self.shared.closed.load(Ordering::Acquire)
	}

	/// The bootstrap page installed by the host.
	pub fn bootstrap(&self) -> Option<Arc<BootstrapPage>> {
		self.shared.bootstrap.read().clone()
	}
}

impl fmt::Debug for ViewPort {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("ViewPort")
			.field("id", &self.id())
			.field("closed", &self.is_closed())
			.finish_non_exhaustive()
	}
}
