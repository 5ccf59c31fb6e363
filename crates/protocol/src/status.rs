//! Session status values.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Caller-visible state of the analysis session.
///
/// The same names are used by the server in `status_update` notifications.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
	#[default]
	Disconnected,
	Connecting,
	Creating,
	Ready,
	Error,
	UnsupportedLanguage,
	NoSession,
	NoAccess,
}

impl SessionStatus {
	pub fn as_str(self) -> &'static str {
		match self {
			Self::Disconnected => "disconnected",
			Self::Connecting => "connecting",
			Self::Creating => "creating",
			Self::Ready => "ready",
			Self::Error => "error",
			Self::UnsupportedLanguage => "unsupported_language",
			Self::NoSession => "no_session",
			Self::NoAccess => "no_access",
		}
	}

	/// Whether RPC calls may be issued in this state.
	pub fn is_ready(self) -> bool {
		self == Self::Ready
	}
}

impl fmt::Display for SessionStatus {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

/// Returned when a status name is not part of the protocol.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownStatus(pub String);

impl fmt::Display for UnknownStatus {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "unknown session status '{}'", self.0)
	}
}

impl std::error::Error for UnknownStatus {}

impl FromStr for SessionStatus {
	type Err = UnknownStatus;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		Ok(match s {
			"disconnected" => Self::Disconnected,
			"connecting" => Self::Connecting,
			"creating" => Self::Creating,
			"ready" => Self::Ready,
			"error" => Self::Error,
			"unsupported_language" => Self::UnsupportedLanguage,
			"no_session" => Self::NoSession,
			"no_access" => Self::NoAccess,
			other => return Err(UnknownStatus(other.to_string())),
		})
	}
}
