//! Wires the sync provider to headless views.

use std::fmt;
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, anyhow, bail};
use ofdview_sync::{DocumentUri, Envelope, LocalFileSystem, OpenContext, SyncProvider, ViewId, ViewPort};
use ofdview_view::{ViewRuntime, ViewStatus};
use tracing::{debug, info};

use crate::cli::Cli;
use crate::config::Config;
use crate::probe::ContainerProbe;

const UNTITLED_NAME: &str = "Untitled-1";

/// A view without a display: runs the view protocol against a [`ViewPort`].
pub struct HeadlessView {
	port: ViewPort,
	runtime: ViewRuntime<ContainerProbe>,
}

impl HeadlessView {
	pub fn new(port: ViewPort, viewport_width: u32) -> Self {
		Self {
			port,
			runtime: ViewRuntime::new(ContainerProbe, viewport_width),
		}
	}

	pub fn id(&self) -> ViewId {
		self.port.id()
	}

	/// Signals `ready` and handles host messages until the first content arrives.
	pub async fn settle(&mut self) -> anyhow::Result<()> {
		self.port.post(self.runtime.ready())?;
		while *self.runtime.status() == ViewStatus::Waiting {
			let Some(message) = self.port.recv().await else {
				bail!("{} closed before init", self.id());
			};
			self.dispatch(&message)?;
		}
		Ok(())
	}

	/// Handles host messages until the view closes.
	pub async fn serve(mut self) {
		while let Some(message) = self.port.recv().await {
			if let Err(err) = self.dispatch(&message) {
				debug!(view = %self.id(), error = %err, "reply not delivered");
				break;
			}
		}
	}

	fn dispatch(&mut self, message: &Envelope) -> ofdview_sync::Result<()> {
		match self.runtime.handle(message) {
			Some(reply) => self.port.post(reply),
			None => Ok(()),
		}
	}

	fn report(&self) -> ViewReport {
		ViewReport {
			id: self.id(),
			status: self.runtime.status().clone(),
			editable: self.runtime.is_editable(),
			elements: self.runtime.elements().to_vec(),
		}
	}
}

/// What one view showed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ViewReport {
	pub id: ViewId,
	pub status: ViewStatus,
	/// Whether the host allowed editing.
	pub editable: bool,
	pub elements: Vec<String>,
}

/// Outcome of one run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Report {
	pub uri: DocumentUri,
	pub views: Vec<ViewReport>,
	/// Length of the bytes fetched back from the views.
	pub fetched: Option<usize>,
}

/// Opens the document, attaches the views and collects what they render.
pub async fn run(cli: &Cli, config: Config) -> anyhow::Result<Report> {
	let width = cli.width.unwrap_or(config.view.viewport_width);
	let source = Arc::new(LocalFileSystem::new(config.storage.read_only));
	let provider = SyncProvider::new(source, config.sync);

	let uri = match &cli.file {
		Some(path) => file_uri(path)?,
		None => DocumentUri::untitled(UNTITLED_NAME)?,
	};
	let backup = cli.backup.as_deref().map(file_uri).transpose()?;
	let document = provider
		.open_custom_document(uri.clone(), OpenContext { backup })
		.await
		.with_context(|| format!("failed to open {uri}"))?;
	info!(uri = %uri, len = document.content().len(), "document opened");

	let mut handles = Vec::new();
	let mut tasks = Vec::new();
	let mut views = Vec::new();
	for _ in 0..cli.views {
		let (handle, inbox, port) = provider.create_view();
		tasks.push(provider.resolve_custom_editor(document.clone(), handle.clone(), inbox)?);

		let mut view = HeadlessView::new(port, width);
		view.settle().await?;
		views.push(view.report());
		handles.push(handle);
		tasks.push(tokio::spawn(view.serve()));
	}

	let fetched = if cli.fetch {
		let data = provider.fetch_file_data(document.uri()).await?;
		info!(uri = %uri, len = data.len(), "file data fetched");
		Some(data.len())
	} else {
		None
	};

	for handle in &handles {
		handle.close();
	}
	document.dispose();
	for task in tasks {
		task.await?;
	}

	Ok(Report { uri, views, fetched })
}

fn file_uri(path: &Path) -> anyhow::Result<DocumentUri> {
	let absolute = std::path::absolute(path).with_context(|| format!("invalid path {}", path.display()))?;
	DocumentUri::from_file_path(&absolute).ok_or_else(|| anyhow!("cannot address {} as a file URI", absolute.display()))
}

impl fmt::Display for Report {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		writeln!(f, "{}", self.uri)?;
		for view in &self.views {
			let mode = if view.editable { "editable" } else { "read-only" };
			match &view.status {
				ViewStatus::Waiting => writeln!(f, "{}: waiting", view.id)?,
				ViewStatus::Untitled => writeln!(f, "{} ({mode}): empty document", view.id)?,
				ViewStatus::Failed(error) => writeln!(f, "{} ({mode}): failed: {error}", view.id)?,
				ViewStatus::Rendered => {
					writeln!(f, "{} ({mode}):", view.id)?;
					for element in &view.elements {
						writeln!(f, "  {element}")?;
					}
				}
			}
		}
		if let Some(len) = self.fetched {
			writeln!(f, "fetched {len} bytes from views")?;
		}
		Ok(())
	}
}
