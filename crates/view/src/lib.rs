//! View-side runtime of the OFD document protocol.
//!
//! A view is a rendering surface driven entirely by host messages. [`ViewRuntime`] keeps
//! the bytes it was last given, hands them to a [`Renderer`] and produces the envelopes the
//! host expects back. It owns no transport; callers feed it envelopes and post whatever it
//! returns.
#![warn(missing_docs)]

use ofdview_protocol::{Envelope, HostMessage, InitBody, ViewMessage};
use tracing::{debug, warn};

/// External parse/render library driven by a view.
pub trait Renderer {
	/// Parsed document.
	type Parsed;
	/// One rendered element, such as a page.
	type Element;

	/// Parses document bytes, or returns a human readable failure.
	fn parse(&self, bytes: &[u8]) -> Result<Self::Parsed, String>;

	/// Lays out a parsed document for the given viewport width in pixels.
	fn render(&self, viewport_width: u32, parsed: &Self::Parsed) -> Vec<Self::Element>;
}

/// What the view currently shows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ViewStatus {
	/// Loaded, waiting for `init`.
	Waiting,
	/// Showing an empty, not yet persisted document.
	Untitled,
	/// Showing rendered content.
	Rendered,
	/// The last content failed to parse.
	Failed(String),
}

/// Protocol state machine of one view.
pub struct ViewRuntime<R: Renderer> {
	renderer: R,
	viewport_width: u32,
	status: ViewStatus,
	editable: bool,
	data: Vec<u8>,
	elements: Vec<R::Element>,
}

impl<R: Renderer> ViewRuntime<R> {
	/// Creates a runtime rendering at `viewport_width` pixels.
	pub fn new(renderer: R, viewport_width: u32) -> Self {
		Self {
			renderer,
			viewport_width,
			status: ViewStatus::Waiting,
			editable: false,
			data: Vec::new(),
			elements: Vec::new(),
		}
	}

	/// The `ready` signal sent once the view is loaded.
	pub fn ready(&self) -> Envelope {
		ViewMessage::Ready.into_envelope()
	}

	/// Applies one host message and returns the reply to post, if any.
	///
	/// Parse failures leave the view open and produce an `openOfdError` report.
	pub fn handle(&mut self, envelope: &Envelope) -> Option<Envelope> {
		let message = match HostMessage::from_envelope(envelope) {
			Ok(message) => message,
			Err(err) => {
				debug!(kind = %envelope.kind, error = %err, "ignoring host message");
				return None;
			}
		};

		match message {
			HostMessage::Init(InitBody::Untitled { editable, .. }) => {
				self.editable = editable;
				self.data.clear();
				self.elements.clear();
				self.status = ViewStatus::Untitled;
				None
			}
			HostMessage::Init(InitBody::Persisted { value, editable }) => {
				self.editable = editable;
				self.load(value)
			}
			HostMessage::Update { content } => self.load(content),
			HostMessage::GetFileData => {
				let Some(id) = envelope.request_id else {
					warn!("getFileData without request id");
					return None;
				};
				Some(ViewMessage::file_data(id, &self.data).into_envelope())
			}
		}
	}

	/// The `edit` report for a user change.
	pub fn report_edit(&self, label: impl Into<String>) -> Envelope {
		ViewMessage::Edit { label: label.into() }.into_envelope()
	}

	/// Re-renders the current content for a new viewport width.
	pub fn resize(&mut self, viewport_width: u32) -> Option<Envelope> {
		self.viewport_width = viewport_width;
		match self.status {
			ViewStatus::Rendered => {
				let data = std::mem::take(&mut self.data);
				self.load(data)
			}
			_ => None,
		}
	}

	fn load(&mut self, data: Vec<u8>) -> Option<Envelope> {
		self.data = data;
		match self.renderer.parse(&self.data) {
			Ok(parsed) => {
				self.elements = self.renderer.render(self.viewport_width, &parsed);
				self.status = ViewStatus::Rendered;
				debug!(len = self.data.len(), elements = self.elements.len(), "content rendered");
				None
			}
			Err(error) => {
				warn!(error = %error, "content failed to parse");
				self.elements.clear();
				self.status = ViewStatus::Failed(error.clone());
				Some(ViewMessage::OpenOfdError { error }.into_envelope())
			}
		}
	}

	/// Current status.
	pub fn status(&self) -> &ViewStatus {
		&self.status
	}

	/// Elements of the last successful render.
	pub fn elements(&self) -> &[R::Element] {
		&self.elements
	}

	/// The bytes the view currently holds.
	pub fn data(&self) -> &[u8] {
		&self.data
	}

	/// Whether the host allows editing.
	pub fn is_editable(&self) -> bool {
		self.editable
	}

	/// Viewport width in pixels.
	pub fn viewport_width(&self) -> u32 {
		self.viewport_width
	}
}
