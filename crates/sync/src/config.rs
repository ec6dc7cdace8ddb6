//! Tunables for the sync core.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::bootstrap::AssetLayout;

/// Which open view answers a `getFileData` request when several are open.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourcePolicy {
	/// The first view registered for the document.
	FirstRegistered,
	/// The view that most recently reported an edit, falling back to the newest view.
	#[default]
	MostRecentlyActive,
}

/// Configuration for a [`crate::SyncProvider`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
	/// Seconds to wait for a view to answer a request. Zero waits forever.
	pub request_timeout_secs: u64,
	/// How the authoritative view is chosen.
	pub source_policy: SourcePolicy,
	/// Bundled view assets.
	pub assets: AssetLayout,
}

fn default_timeout() -> u64 {
	30
}

impl Default for SyncConfig {
	fn default() -> Self {
		Self {
			request_timeout_secs: default_timeout(),
			source_policy: SourcePolicy::default(),
			assets: AssetLayout::default(),
		}
	}
}

impl SyncConfig {
	/// The request timeout, `None` when disabled.
	pub fn request_timeout(&self) -> Option<Duration> {
		(self.request_timeout_secs > 0).then(|| Duration::from_secs(self.request_timeout_secs))
	}
}
