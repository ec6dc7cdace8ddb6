//! Request id allocation.

use crate::types::RequestId;

/// Simple counter-based request id generator.
///
/// Ids start at 1 and increase by one per request. One generator belongs to one host
/// instance; it is never shared globally and only resets when its owner is recreated.
#[derive(Debug, Clone, Copy)]
pub struct CounterIdGen(u64);

impl CounterIdGen {
	/// Creates a new counter whose first id is 1.
	#[must_use]
	pub const fn new() -> Self {
		Self(1)
	}

	/// Generates the next unique id and increments the counter.
	#[allow(clippy::should_implement_trait, reason = "convention")]
	pub fn next(&mut self) -> RequestId {
		let id = self.0;
		self.0 += 1;
		RequestId(id)
	}

	/// Returns the id the next call to [`CounterIdGen::next`] will hand out.
	pub const fn peek(&self) -> RequestId {
		RequestId(self.0)
	}
}

impl Default for CounterIdGen {
	fn default() -> Self {
		Self::new()
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn ids_start_at_one_and_increase() {
		let mut ids = CounterIdGen::new();
		assert_eq!(ids.next(), RequestId(1));
		assert_eq!(ids.next(), RequestId(2));
		assert_eq!(ids.peek(), RequestId(3));
	}

	#[test]
	fn copies_do_not_share_state() {
		let mut a = CounterIdGen::default();
		a.next();
		let mut b = a;
		assert_eq!(a.next(), b.next());
	}
}
