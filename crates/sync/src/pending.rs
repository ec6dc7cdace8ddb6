//! Request/response correlation across the view channel.

use std::collections::HashMap;

use ofdview_protocol::{CounterIdGen, RequestId, ViewId};
use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::oneshot;
use tracing::debug;

use crate::{Error, Result};

/// Receiver side of one outstanding request.
pub type ResponseRx = oneshot::Receiver<Result<Value>>;

struct Pending {
	view: ViewId,
	tx: oneshot::Sender<Result<Value>>,
}

#[derive(Default)]
struct State {
	ids: CounterIdGen,
	outstanding: HashMap<RequestId, Pending>,
}

/// Outstanding host-to-view requests keyed by [`RequestId`].
///
/// Ids are unique and strictly increasing for the lifetime of one table. Each entry is
/// resolved at most once.
#[derive(Default)]
pub struct PendingRequests {
	state: Mutex<State>,
}

impl PendingRequests {
	/// Creates an empty table. The first id is 1.
	pub fn new() -> Self {
		Self::default()
	}

	/// Allocates an id for a request sent to `view`.
	pub fn register(&self, view: ViewId) -> (RequestId, ResponseRx) {
		let (tx, rx) = oneshot::channel();
		let mut state = self.state.lock();
		let id = state.ids.next();
		state.outstanding.insert(id, Pending { view, tx });
		(id, rx)
	}

	/// Delivers a reply body received from `view`.
	///
	/// Returns false for unknown or already resolved ids, and for ids issued to another view.
	pub fn resolve(&self, view: ViewId, id: RequestId, body: Value) -> bool {
		let pending = {
			let mut state = self.state.lock();
			match state.outstanding.get(&id) {
				Some(p) if p.view == view => state.outstanding.remove(&id),
				_ => None,
			}
		};
		let Some(pending) = pending else {
			return false;
		};
		debug!(request_id = %id, view = %pending.view, "reply routed");
		// The waiter may have given up already.
		let _ = pending.tx.send(Ok(body));
		true
	}

	/// Fails every request sent to `view` with [`Error::ViewClosed`].
	pub fn fail_view(&self, view: ViewId) -> usize {
		let failed: Vec<_> = {
			let mut state = self.state.lock();
			let ids: Vec<_> = state
				.outstanding
				.iter()
				.filter(|(_, p)| p.view == view)
				.map(|(id, _)| *id)
				.collect();
			ids.into_iter().filter_map(|id| state.outstanding.remove(&id)).collect()
		};
		let count = failed.len();
		for pending in failed {
			let _ = pending.tx.send(Err(Error::ViewClosed(view)));
		}
		if count > 0 {
			debug!(view = %view, count, "failed pending requests of closed view");
		}
		count
	}

	/// Drops a request without resolving it.
	pub fn cancel(&self, id: RequestId) -> bool {
		self.state.lock().outstanding.remove(&id).is_some()
	}

	/// Number of unresolved requests.
	pub fn outstanding(&self) -> usize {
		self.state.lock().outstanding.len()
	}
}

impl std::fmt::Debug for PendingRequests {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		let state = self.state.lock();
		f.debug_struct("PendingRequests")
			.field("next", &state.ids.peek())
			.field("outstanding", &state.outstanding.len())
			.finish()
	}
}

#[cfg(test)]
mod tests {
	use serde_json::json;

	use super::*;

	#[test]
	fn ids_strictly_increase_from_one() {
		let table = PendingRequests::new();
		let ids: Vec<_> = (0..4).map(|_| table.register(ViewId(1)).0).collect();
		assert_eq!(ids, vec![RequestId(1), RequestId(2), RequestId(3), RequestId(4)]);
	}

	#[tokio::test]
	async fn reply_resolves_exactly_once() {
		let table = PendingRequests::new();
		let (id, rx) = table.register(ViewId(1));

		assert!(!table.resolve(ViewId(2), id, json!([0])));
		assert!(table.resolve(ViewId(1), id, json!([1, 2])));
		assert!(!table.resolve(ViewId(1), id, json!([3])));
		assert_eq!(rx.await.unwrap().unwrap(), json!([1, 2]));
		assert_eq!(table.outstanding(), 0);
	}

	#[test]
	fn unknown_id_is_ignored() {
		let table = PendingRequests::new();
		let (_id, _rx) = table.register(ViewId(1));
		assert!(!table.resolve(ViewId(1), RequestId(99), json!(null)));
		assert_eq!(table.outstanding(), 1);
	}

	#[tokio::test]
	async fn closing_a_view_fails_only_its_requests() {
		let table = PendingRequests::new();
		let (_a, rx_a) = table.register(ViewId(1));
		let (b, _rx_b) = table.register(ViewId(2));

		assert_eq!(table.fail_view(ViewId(1)), 1);
		assert!(matches!(rx_a.await.unwrap(), Err(Error::ViewClosed(ViewId(1)))));
		assert_eq!(table.outstanding(), 1);
		assert!(table.cancel(b));
		assert_eq!(table.outstanding(), 0);
	}
}
