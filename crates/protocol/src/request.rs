//! Request envelopes sent by the client and notifications sent by the server.
//!
//! Every client request has the shape `{"type": "<method>", "payload": {...}}`.
//! The transport adds the `id` correlation field before the frame is written.

use serde::{Deserialize, Serialize};

use crate::descriptor::{RepoSide, SessionDescriptor};

/// Request methods understood by the analysis service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Method {
	#[serde(rename = "session.create")]
	CreateSession,
	#[serde(rename = "session.hover")]
	Hover,
	#[serde(rename = "session.references")]
	References,
	#[serde(rename = "session.definition")]
	Definition,
	#[serde(rename = "session.file_contents")]
	FileContents,
}

impl Method {
	pub fn as_str(self) -> &'static str {
		match self {
			Self::CreateSession => "session.create",
			Self::Hover => "session.hover",
			Self::References => "session.references",
			Self::Definition => "session.definition",
			Self::FileContents => "session.file_contents",
		}
	}
}

/// Envelope for every client request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClientRequest<P> {
	#[serde(rename = "type")]
	pub method: Method,
	pub payload: P,
}

impl<P> ClientRequest<P> {
	pub fn new(method: Method, payload: P) -> Self {
		Self { method, payload }
	}
}

/// Payload of `session.create`.
///
/// Which optional fields are present depends on the descriptor type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateSessionPayload {
	pub organisation: String,
	pub name: String,
	/// Git hosting service identifier (e.g. `github`).
	pub service: String,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub pull_request_id: Option<u64>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub head_sha: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub base_sha: Option<String>,
}

impl CreateSessionPayload {
	/// Builds the creation payload for `descriptor`.
	///
	/// Returns `None` for [`SessionDescriptor::Unsupported`]; no request should
	/// be sent in that case.
	pub fn from_descriptor(descriptor: &SessionDescriptor, service: &str) -> Option<Self> {
		let payload = match descriptor {
			SessionDescriptor::Pull {
				organisation,
				name,
				pull_request_id,
			} => Self {
				organisation: organisation.clone(),
				name: name.clone(),
				service: service.to_string(),
				pull_request_id: Some(*pull_request_id),
				head_sha: None,
				base_sha: None,
			},
			SessionDescriptor::File {
				organisation,
				name,
				head_sha,
			} => Self {
				organisation: organisation.clone(),
				name: name.clone(),
				service: service.to_string(),
				pull_request_id: None,
				head_sha: Some(head_sha.clone()),
				base_sha: None,
			},
			SessionDescriptor::Commit {
				organisation,
				name,
				head_sha,
				base_sha,
			}
			| SessionDescriptor::Compare {
				organisation,
				name,
				head_sha,
				base_sha,
			} => Self {
				organisation: organisation.clone(),
				name: name.clone(),
				service: service.to_string(),
				pull_request_id: None,
				head_sha: Some(head_sha.clone()),
				base_sha: Some(base_sha.clone()),
			},
			SessionDescriptor::Unsupported => return None,
		};
		Some(payload)
	}
}

/// Payload of the hover, references, definition and file-contents queries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryPayload {
	/// `"true"` for the base side, `"false"` for head. Sent as a string.
	pub is_base_repo: String,
	pub location_id: String,
}

impl QueryPayload {
	/// Query at a position inside a file.
	pub fn at(side: RepoSide, path: &str, line: u32, character: u32) -> Self {
		Self {
			is_base_repo: side.is_base_repo().to_string(),
			location_id: location_id(path, line, character),
		}
	}

	/// Query for a whole file.
	pub fn file(side: RepoSide, path: &str) -> Self {
		Self {
			is_base_repo: side.is_base_repo().to_string(),
			location_id: path.to_string(),
		}
	}
}

/// Formats a location as `<path>#L<line>#C<char>`.
pub fn location_id(path: &str, line: u32, character: u32) -> String {
	format!("{path}#L{line}#C{character}")
}

/// Server-initiated status notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusUpdate {
	pub status_update: String,
}
