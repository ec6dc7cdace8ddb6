//! Wire envelope and typed messages.
//!
//! Both directions share one envelope shape. Typed enums are conversions on top of it;
//! the channel itself only ever carries [`Envelope`] values.

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::types::RequestId;
use crate::{Error, Result};

/// Recognized values of the envelope `type` field.
pub mod kind {
	/// Host→view: bootstrap content, sent once per view after `ready`.
	pub const INIT: &str = "init";
	/// Host→view: document content changed.
	pub const UPDATE: &str = "update";
	/// Host→view request: send back the bytes the view currently holds.
	pub const GET_FILE_DATA: &str = "getFileData";
	/// View→host: the view finished loading and can receive `init`.
	pub const READY: &str = "ready";
	/// View→host: reply to a request, correlated by `requestId`.
	pub const RESPONSE: &str = "response";
	/// View→host: the parser or renderer failed.
	pub const OPEN_OFD_ERROR: &str = "openOfdError";
	/// View→host: the user edited the document.
	pub const EDIT: &str = "edit";
}

/// The untyped message envelope `{ type, requestId?, body? }`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Envelope {
	/// Message type, one of [`kind`] for recognized messages.
	#[serde(rename = "type")]
	pub kind: String,
	/// Correlation id for requests and their replies.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub request_id: Option<RequestId>,
	/// Message payload.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub body: Option<Value>,
	/// Top-level error text. Older views put the `openOfdError` message here instead of
	/// inside `body`.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub error: Option<String>,
}

impl Envelope {
	/// Creates an envelope with only a type.
	pub fn new(kind: impl Into<String>) -> Self {
		Self {
			kind: kind.into(),
			request_id: None,
			body: None,
			error: None,
		}
	}

	/// Sets the body.
	#[must_use]
	pub fn with_body(mut self, body: Value) -> Self {
		self.body = Some(body);
		self
	}

	/// Sets the correlation id.
	#[must_use]
	pub fn with_request_id(mut self, id: RequestId) -> Self {
		self.request_id = Some(id);
		self
	}

	/// Returns true if the type matches `kind`.
	pub fn is(&self, kind: &str) -> bool {
		self.kind == kind
	}

	/// Error text of an error report, from the top level or from `body.error`.
	pub fn error_text(&self) -> Option<String> {
		if let Some(error) = &self.error {
			return Some(error.clone());
		}
		match self.body.as_ref()?.get("error")? {
			Value::String(s) => Some(s.clone()),
			Value::Null => None,
			other => Some(other.to_string()),
		}
	}

	/// Decodes an envelope from JSON text.
	pub fn from_json(text: &str) -> Result<Self> {
		Ok(serde_json::from_str(text)?)
	}

	/// Encodes the envelope as JSON text.
	pub fn to_json(&self) -> Result<String> {
		Ok(serde_json::to_string(self)?)
	}

	fn body_as<T: for<'de> Deserialize<'de>>(&self) -> Result<T> {
		let body = self.body.clone().unwrap_or(Value::Null);
		Ok(serde_json::from_value(body)?)
	}
}

/// Body of the `init` message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum InitBody {
	/// A document that has never been persisted.
	Untitled {
		/// Always true for this variant.
		untitled: bool,
		/// Whether the view may accept edits.
		editable: bool,
	},
	/// A document loaded from storage or a backup.
	Persisted {
		/// The raw document bytes.
		value: Vec<u8>,
		/// Whether the backing storage accepts writes.
		editable: bool,
	},
}

impl InitBody {
	/// `{ untitled: true, editable: true }`.
	pub const fn untitled() -> Self {
		Self::Untitled {
			untitled: true,
			editable: true,
		}
	}

	/// `{ value, editable }`.
	pub fn persisted(value: impl Into<Vec<u8>>, editable: bool) -> Self {
		Self::Persisted {
			value: value.into(),
			editable,
		}
	}

	/// Whether the view may accept edits.
	pub const fn editable(&self) -> bool {
		match self {
			Self::Untitled { editable, .. } | Self::Persisted { editable, .. } => *editable,
		}
	}
}

#[derive(Deserialize)]
struct UpdateBody {
	content: Vec<u8>,
}

/// Typed host→view message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostMessage {
	/// Bootstrap content.
	Init(InitBody),
	/// Content changed on the host side.
	Update {
		/// The new document bytes.
		content: Vec<u8>,
	},
	/// Request for the bytes the view currently holds.
	GetFileData,
}

impl HostMessage {
	/// The envelope type of this message.
	pub const fn kind(&self) -> &'static str {
		match self {
			Self::Init(_) => kind::INIT,
			Self::Update { .. } => kind::UPDATE,
			Self::GetFileData => kind::GET_FILE_DATA,
		}
	}

	/// The envelope body of this message.
	pub fn body(&self) -> Value {
		match self {
			Self::Init(InitBody::Untitled { untitled, editable }) => {
				json!({ "untitled": untitled, "editable": editable })
			}
			Self::Init(InitBody::Persisted { value, editable }) => {
				json!({ "value": value, "editable": editable })
			}
			Self::Update { content } => json!({ "content": content }),
			Self::GetFileData => json!({}),
		}
	}

	/// Wraps the message as a fire-and-forget envelope.
	pub fn into_envelope(self) -> Envelope {
		Envelope::new(self.kind()).with_body(self.body())
	}

	/// Wraps the message as a request expecting a reply with `id`.
	pub fn into_request(self, id: RequestId) -> Envelope {
		self.into_envelope().with_request_id(id)
	}

	/// Decodes a host message on the view side.
	pub fn from_envelope(envelope: &Envelope) -> Result<Self> {
		match envelope.kind.as_str() {
			kind::INIT => Ok(Self::Init(envelope.body_as()?)),
			kind::UPDATE => {
				let UpdateBody { content } = envelope.body_as()?;
				Ok(Self::Update { content })
			}
			kind::GET_FILE_DATA => Ok(Self::GetFileData),
			other => Err(Error::UnknownKind(other.to_string())),
		}
	}
}

/// Typed view→host message.
#[derive(Debug, Clone, PartialEq)]
pub enum ViewMessage {
	/// The view is loaded and waiting for `init`.
	Ready,
	/// Reply to the request with the same id.
	Response {
		/// Id copied from the request.
		request_id: RequestId,
		/// Reply payload.
		body: Value,
	},
	/// Parse or render failure inside the view.
	OpenOfdError {
		/// Human readable failure text.
		error: String,
	},
	/// The user edited the document.
	Edit {
		/// Label shown by the host's undo stack.
		label: String,
	},
}

impl ViewMessage {
	/// Reply to a `getFileData` request: the body is the byte array itself.
	pub fn file_data(request_id: RequestId, data: &[u8]) -> Self {
		Self::Response {
			request_id,
			body: json!(data),
		}
	}

	/// Wraps the message as an envelope.
	pub fn into_envelope(self) -> Envelope {
		match self {
			Self::Ready => Envelope::new(kind::READY),
			Self::Response { request_id, body } => {
				Envelope::new(kind::RESPONSE).with_request_id(request_id).with_body(body)
			}
			Self::OpenOfdError { error } => {
				Envelope::new(kind::OPEN_OFD_ERROR).with_body(json!({ "error": error }))
			}
			Self::Edit { label } => Envelope::new(kind::EDIT).with_body(json!({ "label": label })),
		}
	}
}
