//! Error types for the codelens runtime.

use codelens_protocol::SessionStatus;
use serde_json::Value;
use thiserror::Error;

/// Result type alias for runtime operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in the codelens runtime.
#[derive(Debug, Error)]
pub enum Error {
	/// The socket could not be opened.
	#[error("Failed to connect to analysis service: {0}")]
	ConnectionFailed(String),

	/// A request was issued while no connection was open.
	#[error("Not connected to analysis service")]
	NotConnected,

	/// The connection was torn down before a response arrived.
	#[error("Connection closed before a response was received")]
	ConnectionClosed,

	/// Error reported by the server for a specific request.
	#[error("Server error: {message}")]
	Remote {
		/// Human-readable error message.
		message: String,
		/// Raw `error` field of the response.
		payload: Value,
	},

	/// RPC attempted before the session reached `ready`.
	#[error("Session is not ready (status: {status})")]
	NotReady { status: SessionStatus },

	/// Invalid argument provided to method.
	#[error("Invalid argument: {0}")]
	InvalidArgument(String),

	/// Root URL could not be parsed or turned into a socket URL.
	#[error("Invalid service URL: {0}")]
	InvalidUrl(#[from] url::ParseError),

	/// JSON serialization/deserialization error.
	#[error("JSON error: {0}")]
	Json(#[from] serde_json::Error),
}

impl Error {
	/// Builds a [`Error::Remote`] from a response's `error` field.
	pub fn remote(payload: Value) -> Self {
		let message = match &payload {
			Value::String(message) => message.clone(),
			Value::Object(map) => map
				.get("message")
				.and_then(Value::as_str)
				.map(str::to_string)
				.unwrap_or_else(|| payload.to_string()),
			other => other.to_string(),
		};
		Error::Remote { message, payload }
	}

	/// Returns the server message if this is a Remote error.
	pub fn remote_message(&self) -> Option<&str> {
		match self {
			Error::Remote { message, .. } => Some(message),
			_ => None,
		}
	}

	/// Returns true when the failure came from the connection rather than the server.
	pub fn is_transport(&self) -> bool {
		matches!(
			self,
			Error::ConnectionFailed(_) | Error::NotConnected | Error::ConnectionClosed
		)
	}
}
