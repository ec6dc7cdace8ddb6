//! Multi-map from document identity to the views currently showing it.

use std::cmp::Reverse;
use std::sync::{Arc, Weak};

use ofdview_protocol::ViewId;
use parking_lot::Mutex;
use tracing::debug;

use crate::config::SourcePolicy;
use crate::event::{Emitter, Subscription};
use crate::uri::DocumentUri;
use crate::view::ViewHandle;

struct Entry {
	key: DocumentUri,
	view: ViewHandle,
	/// Sequence number of registration.
	registered: u64,
	/// Sequence number of the last activity. Zero until the view reports any.
	last_active: u64,
	on_dispose: Subscription,
}

impl Drop for Entry {
	fn drop(&mut self) {
		self.on_dispose.dispose();
	}
}

#[derive(Default)]
struct RegistryState {
	entries: Vec<Entry>,
	next_seq: u64,
}

impl RegistryState {
	fn seq(&mut self) -> u64 {
		self.next_seq += 1;
		self.next_seq
	}
}

/// Tracks which views are open for which document.
///
/// A view is registered under at most one key and removes itself when it closes, so
/// [`ViewRegistry::get`] never yields a closed view.
#[derive(Clone, Default)]
pub struct ViewRegistry {
	inner: Arc<Mutex<RegistryState>>,
	on_did_close_view: Arc<Emitter<ViewId>>,
}

/// Snapshot of the views registered for one document, in registration order.
#[derive(Debug, Clone, Default)]
pub struct Views(Vec<ViewHandle>);

impl ViewRegistry {
	/// Creates an empty registry.
	pub fn new() -> Self {
		Self::default()
	}

	/// Registers `view` under `uri`.
	///
	/// A view already registered under another key is moved. Returns false if the view is
	/// already closed.
	pub fn add(&self, uri: &DocumentUri, view: &ViewHandle) -> bool {
		if view.is_closed() {
			return false;
		}

		let id = view.id();
		let moved = {
			let mut state = self.inner.lock();
			match state.entries.iter().position(|e| e.view.id() == id) {
				Some(pos) if state.entries[pos].key == *uri => return true,
				Some(pos) => {
					let mut entry = state.entries.remove(pos);
					let seq = state.seq();
					entry.key = uri.clone();
					entry.registered = seq;
					entry.last_active = seq;
					state.entries.push(entry);
					true
				}
				None => false,
			}
		};
		if moved {
			debug!(uri = %uri, view = %id, "view moved");
			return true;
		}

		let weak: Weak<Mutex<RegistryState>> = Arc::downgrade(&self.inner);
		let closed = Arc::downgrade(&self.on_did_close_view);
		let sub = view.on_did_dispose(move |id| {
			let removed = weak.upgrade().is_some_and(|inner| remove_entry(&inner, id));
			if removed && let Some(closed) = closed.upgrade() {
				closed.fire(&id);
			}
		});
		// A close racing the subscription would leave a stale entry behind.
		if view.is_closed() {
			sub.dispose();
			return false;
		}

		let mut state = self.inner.lock();
		let seq = state.seq();
		state.entries.push(Entry {
			key: uri.clone(),
			view: view.clone(),
			registered: seq,
			last_active: 0,
			on_dispose: sub,
		});
		debug!(uri = %uri, view = %id, views = state.entries.len(), "view registered");
		true
	}

	/// Unregisters a view without closing it.
	pub fn remove(&self, id: ViewId) -> bool {
		remove_entry(&self.inner, id)
	}

	/// Fired after a registered view closes and has been unregistered.
	pub fn on_did_close_view(&self, listener: impl Fn(&ViewId) + Send + Sync + 'static) -> Subscription {
		self.on_did_close_view.subscribe(listener)
	}

	/// Open views for `uri`.
	pub fn get(&self, uri: &DocumentUri) -> Views {
		let state = self.inner.lock();
		Views(
			state
				.entries
				.iter()
				.filter(|e| e.key == *uri && !e.view.is_closed())
				.map(|e| e.view.clone())
				.collect(),
		)
	}

	/// Returns true if `uri` has at least one open view.
	pub fn contains(&self, uri: &DocumentUri) -> bool {
		let state = self.inner.lock();
		state.entries.iter().any(|e| e.key == *uri && !e.view.is_closed())
	}

	/// Records activity on a view.
	pub fn mark_active(&self, id: ViewId) {
		let mut state = self.inner.lock();
		let seq = state.seq();
		if let Some(entry) = state.entries.iter_mut().find(|e| e.view.id() == id) {
			entry.last_active = seq;
		}
	}

	/// The view that answers data requests for `uri` under `policy`.
	///
	/// Only views that have received `init` hold the document's bytes, so others are never
	/// chosen. Without any recorded activity, `MostRecentlyActive` picks the first registered
	/// view.
	pub fn authoritative(&self, uri: &DocumentUri, policy: SourcePolicy) -> Option<ViewHandle> {
		let state = self.inner.lock();
		let live = state
			.entries
			.iter()
			.filter(|e| e.key == *uri && !e.view.is_closed() && e.view.is_initialized());
		let chosen = match policy {
			SourcePolicy::FirstRegistered => live.min_by_key(|e| e.registered),
			SourcePolicy::MostRecentlyActive => live.max_by_key(|e| (e.last_active, Reverse(e.registered))),
		};
		chosen.map(|e| e.view.clone())
	}

	/// Total number of registered views across all documents.
	pub fn len(&self) -> usize {
		self.inner.lock().entries.len()
	}

	/// Returns true if no view is registered.
	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}
}

fn remove_entry(inner: &Mutex<RegistryState>, id: ViewId) -> bool {
	// The entry drops after the lock is released, since dropping it releases its hook.
	let removed = {
		let mut state = inner.lock();
		let pos = state.entries.iter().position(|e| e.view.id() == id);
		pos.map(|pos| state.entries.remove(pos))
	};
	match removed {
		Some(entry) => {
			debug!(uri = %entry.key, view = %id, "view unregistered");
			true
		}
		None => false,
	}
}

impl std::fmt::Debug for ViewRegistry {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("ViewRegistry").field("views", &self.len()).finish()
	}
}

impl Views {
	/// Iterates the views.
	pub fn iter(&self) -> std::slice::Iter<'_, ViewHandle> {
		self.0.iter()
	}

	/// Number of views.
	pub fn len(&self) -> usize {
		self.0.len()
	}

	/// Returns true if there are no views.
	pub fn is_empty(&self) -> bool {
		self.0.is_empty()
	}

	/// The earliest registered view.
	pub fn first(&self) -> Option<&ViewHandle> {
		self.0.first()
	}
}

impl IntoIterator for Views {
	type Item = ViewHandle;
	type IntoIter = std::vec::IntoIter<ViewHandle>;

	fn into_iter(self) -> Self::IntoIter {
		self.0.into_iter()
	}
}

impl<'a> IntoIterator for &'a Views {
	type Item = &'a ViewHandle;
	type IntoIter = std::slice::Iter<'a, ViewHandle>;

	fn into_iter(self) -> Self::IntoIter {
		self.0.iter()
	}
}
