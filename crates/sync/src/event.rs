//! Event emitters and releasable subscriptions.
//!
//! An [`Emitter`] delivers events synchronously to its listeners. Subscribing returns a
//! [`Subscription`] that releases exactly one listener when disposed. Owners that register
//! several listeners collect them in a [`DisposableStore`] and release them all at once.

use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;

type Listener<T> = Arc<dyn Fn(&T) + Send + Sync>;

struct EmitterState<T> {
	next_id: u64,
	listeners: Vec<(u64, Listener<T>)>,
	closed: bool,
}

/// Synchronous multi-listener event source.
pub struct Emitter<T> {
	state: Arc<Mutex<EmitterState<T>>>,
}

impl<T: 'static> Emitter<T> {
	/// Creates an emitter without listeners.
	pub fn new() -> Self {
		Self {
			state: Arc::new(Mutex::new(EmitterState {
				next_id: 0,
				listeners: Vec::new(),
				closed: false,
			})),
		}
	}

	/// Registers `listener` until the returned subscription is disposed or the emitter closes.
	///
	/// Subscribing to a closed emitter returns an already released subscription.
	pub fn subscribe<F>(&self, listener: F) -> Subscription
	where
		F: Fn(&T) + Send + Sync + 'static,
	{
		let id = {
			let mut state = self.state.lock();
			if state.closed {
				return Subscription::released();
			}
			let id = state.next_id;
			state.next_id += 1;
			state.listeners.push((id, Arc::new(listener)));
			id
		};

		let weak = Arc::downgrade(&self.state);
		Subscription::new(move || {
			if let Some(state) = weak.upgrade() {
				let removed = {
					let mut state = state.lock();
					let at = state.listeners.iter().position(|(lid, _)| *lid == id);
					at.map(|at| state.listeners.remove(at))
				};
				drop(removed);
			}
		})
	}

	/// Delivers `event` to every listener registered when the call starts.
	///
	/// Listeners run outside the internal lock, so they may subscribe, dispose or close.
	pub fn fire(&self, event: &T) {
		let listeners: Vec<Listener<T>> = {
			let state = self.state.lock();
			if state.closed {
				return;
			}
			state.listeners.iter().map(|(_, l)| Arc::clone(l)).collect()
		};
		for listener in listeners {
			listener(event);
		}
	}

	/// Releases all listeners. Later fires and subscriptions are no-ops.
	pub fn close(&self) {
		let drained = {
			let mut state = self.state.lock();
			state.closed = true;
			std::mem::take(&mut state.listeners)
		};
		drop(drained);
	}

	/// Returns true once [`Emitter::close`] has run.
	pub fn is_closed(&self) -> bool {
		self.state.lock().closed
	}

	/// Number of registered listeners.
	pub fn listener_count(&self) -> usize {
		self.state.lock().listeners.len()
	}
}

impl<T: 'static> Default for Emitter<T> {
	fn default() -> Self {
		Self::new()
	}
}

impl<T> fmt::Debug for Emitter<T> {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let state = self.state.lock();
		f.debug_struct("Emitter")
			.field("listeners", &state.listeners.len())
			.field("closed", &state.closed)
			.finish()
	}
}

/// Handle releasing one listener.
///
/// Dropping a subscription does not release it; the listener then lives until its emitter
/// closes.
pub struct Subscription {
	release: Mutex<Option<Box<dyn FnOnce() + Send>>>,
}

impl Subscription {
	fn new(release: impl FnOnce() + Send + 'static) -> Self {
		Self {
			release: Mutex::new(Some(Box::new(release))),
		}
	}

	/// A subscription with nothing to release.
	pub fn released() -> Self {
		Self {
			release: Mutex::new(None),
		}
	}

	/// Releases the listener. Calling this more than once is harmless.
	pub fn dispose(&self) {
		let release = self.release.lock().take();
		if let Some(release) = release {
			release();
		}
	}

	/// Returns true once the listener has been released.
	pub fn is_disposed(&self) -> bool {
		self.release.lock().is_none()
	}
}

impl fmt::Debug for Subscription {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("Subscription")
			.field("disposed", &self.is_disposed())
			.finish()
	}
}

/// Ordered collection of subscriptions released together.
#[derive(Debug)]
pub struct DisposableStore {
	/// `None` once disposed.
	items: Mutex<Option<Vec<Subscription>>>,
}

impl DisposableStore {
	/// Creates an empty store.
	pub fn new() -> Self {
		Self {
			items: Mutex::new(Some(Vec::new())),
		}
	}

	/// Takes ownership of `subscription`. A store that is already disposed releases it at once.
	pub fn add(&self, subscription: Subscription) {
		let rejected = {
			let mut items = self.items.lock();
			match items.as_mut() {
				Some(items) => {
					items.push(subscription);
					None
				}
				None => Some(subscription),
			}
		};
		if let Some(subscription) = rejected {
			subscription.dispose();
		}
	}

	/// Releases every subscription in insertion order, once.
	pub fn dispose(&self) {
		let items = self.items.lock().take();
		for subscription in items.into_iter().flatten() {
			subscription.dispose();
		}
	}

	/// Returns true once [`DisposableStore::dispose`] has run.
	pub fn is_disposed(&self) -> bool {
		self.items.lock().is_none()
	}

	/// Number of subscriptions held.
	pub fn len(&self) -> usize {
		self.items.lock().as_ref().map_or(0, Vec::len)
	}

	/// Returns true if the store holds no subscriptions.
	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}
}

impl Default for DisposableStore {
	fn default() -> Self {
		Self::new()
	}
}
