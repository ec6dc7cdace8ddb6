//! Byte Source: reads raw document bytes from storage.

use std::collections::{HashMap, HashSet};
use std::io;

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::RwLock;
use tracing::debug;

use crate::uri::DocumentUri;
use crate::{Error, Result};

/// Storage collaborator consumed by the provider.
#[async_trait]
pub trait ByteSource: Send + Sync {
	/// Reads the full content at `uri`.
	async fn read(&self, uri: &DocumentUri) -> io::Result<Bytes>;

	/// Whether storage behind `scheme` accepts writes.
	fn is_writable(&self, scheme: &str) -> bool;
}

/// Reads the bytes of a document, or of its backup.
///
/// Untitled documents yield an empty buffer without touching storage. Storage failures are
/// not retried and surface as [`Error::StorageRead`].
pub async fn read_document(source: &dyn ByteSource, uri: &DocumentUri) -> Result<Bytes> {
	if uri.is_untitled() {
		return Ok(Bytes::new());
	}
	let bytes = source.read(uri).await.map_err(|source| Error::StorageRead {
		uri: uri.clone(),
		source,
	})?;
	debug!(uri = %uri, len = bytes.len(), "read document bytes");
	Ok(bytes)
}

/// Local disk storage for `file:` URIs.
#[derive(Debug, Clone, Default)]
pub struct LocalFileSystem {
	read_only: bool,
}

impl LocalFileSystem {
	/// Creates a file system that reports `file:` as writable unless `read_only` is set.
	pub fn new(read_only: bool) -> Self {
		Self { read_only }
	}
}

#[async_trait]
impl ByteSource for LocalFileSystem {
	async fn read(&self, uri: &DocumentUri) -> io::Result<Bytes> {
		let path = uri.to_file_path().ok_or_else(|| {
			io::Error::new(
				io::ErrorKind::Unsupported,
				format!("unsupported scheme `{}`", uri.scheme()),
			)
		})?;
		tokio::fs::read(&path).await.map(Bytes::from)
	}

	fn is_writable(&self, scheme: &str) -> bool {
		scheme == "file" && !self.read_only
	}
}

/// In-memory storage keyed by document identity.
#[derive(Debug)]
pub struct MemorySource {
	files: RwLock<HashMap<DocumentUri, Bytes>>,
	writable: RwLock<HashSet<String>>,
}

impl MemorySource {
	/// Creates an empty store where only the `file` scheme is writable.
	pub fn new() -> Self {
		Self {
			files: RwLock::new(HashMap::new()),
			writable: RwLock::new(HashSet::from(["file".to_string()])),
		}
	}

	/// Stores `content` at `uri`, replacing what was there.
	pub fn insert(&self, uri: DocumentUri, content: impl Into<Bytes>) {
		self.files.write().insert(uri, content.into());
	}

	/// Removes the content at `uri`.
	pub fn remove(&self, uri: &DocumentUri) -> Option<Bytes> {
		self.files.write().remove(uri)
	}

	/// Marks `scheme` as writable or read-only.
	pub fn set_writable(&self, scheme: &str, writable: bool) {
		let mut schemes = self.writable.write();
		if writable {
			schemes.insert(scheme.to_string());
		} else {
			schemes.remove(scheme);
		}
	}
}

impl Default for MemorySource {
	fn default() -> Self {
		Self::new()
	}
}

#[async_trait]
impl ByteSource for MemorySource {
	async fn read(&self, uri: &DocumentUri) -> io::Result<Bytes> {
		self.files
			.read()
			.get(uri)
			.cloned()
			.ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, format!("{uri} not found")))
	}

	fn is_writable(&self, scheme: &str) -> bool {
		self.writable.read().contains(scheme)
	}
}
