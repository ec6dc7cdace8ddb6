//! Document identity.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use url::Url;

/// Scheme of documents that have never been persisted.
pub const UNTITLED_SCHEME: &str = "untitled";

/// Stable identity of a logical document, derived from its storage location.
///
/// Equality and hashing use the normalized URL, so two views opened on the same location
/// belong to the same document.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DocumentUri(Url);

impl DocumentUri {
	/// Parses a URI such as `file:///a.ofd` or `untitled:Untitled-1`.
	pub fn parse(input: &str) -> Result<Self, url::ParseError> {
		Url::parse(input).map(Self)
	}

	/// Builds a `file:` URI from an absolute path.
	///
	/// Returns `None` for relative paths.
	pub fn from_file_path(path: impl AsRef<Path>) -> Option<Self> {
		Url::from_file_path(path).ok().map(Self)
	}

	/// Builds an `untitled:` URI.
	pub fn untitled(name: &str) -> Result<Self, url::ParseError> {
		Self::parse(&format!("{UNTITLED_SCHEME}:{name}"))
	}

	/// Storage scheme, e.g. `file`.
	pub fn scheme(&self) -> &str {
		self.0.scheme()
	}

	/// Returns true for documents that have never been persisted.
	pub fn is_untitled(&self) -> bool {
		self.scheme() == UNTITLED_SCHEME
	}

	/// Local path for `file:` URIs.
	pub fn to_file_path(&self) -> Option<PathBuf> {
		if self.scheme() != "file" {
			return None;
		}
		self.0.to_file_path().ok()
	}

	/// The normalized URI text.
	pub fn as_str(&self) -> &str {
		self.0.as_str()
	}

	/// The underlying URL.
	pub fn as_url(&self) -> &Url {
		&self.0
	}
}

impl From<Url> for DocumentUri {
	fn from(url: Url) -> Self {
		Self(url)
	}
}

impl FromStr for DocumentUri {
	type Err = url::ParseError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		Self::parse(s)
	}
}

impl fmt::Display for DocumentUri {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.0.as_str())
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn untitled_uris_are_recognized() {
		let uri = DocumentUri::untitled("Untitled-1").unwrap();
		assert!(uri.is_untitled());
		assert_eq!(uri.as_str(), "untitled:Untitled-1");
		assert_eq!(uri.to_file_path(), None);
	}

	#[test]
	fn identity_is_the_normalized_location() {
		let a: DocumentUri = "file:///docs/a.ofd".parse().unwrap();
		let b: DocumentUri = "FILE:///docs/./a.ofd".parse().unwrap();
		assert_eq!(a, b);
		assert_eq!(a.scheme(), "file");
		assert!(!a.is_untitled());
	}

	#[cfg(unix)]
	#[test]
	fn file_paths_round_trip() {
		let uri = DocumentUri::from_file_path("/tmp/report.ofd").unwrap();
		assert_eq!(uri.as_str(), "file:///tmp/report.ofd");
		assert_eq!(uri.to_file_path(), Some(PathBuf::from("/tmp/report.ofd")));
		assert!(DocumentUri::from_file_path("relative.ofd").is_none());
	}
}
