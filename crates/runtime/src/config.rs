//! Session configuration.

use std::time::Duration;

use serde::Deserialize;
use url::Url;

use crate::error::{Error, Result};

/// Default base delay for reconnection backoff.
pub const DEFAULT_BASE_DELAY: Duration = Duration::from_millis(1000);

/// Default git hosting service identifier sent on session creation.
pub const DEFAULT_GIT_SERVICE: &str = "github";

/// Default analysis service root.
pub const DEFAULT_ROOT_URL: &str = "http://127.0.0.1:8000/";

/// Settings shared by the transport and session manager.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
	/// HTTP(S) root of the analysis service; the socket lives at `<root>sessions/`.
	pub root_url: String,
	/// Git hosting service identifier included in `session.create`.
	pub git_service: String,
	/// Base delay for exponential reconnection backoff.
	#[serde(with = "millis")]
	pub base_delay: Duration,
}

impl Default for SessionConfig {
	fn default() -> Self {
		Self {
			root_url: DEFAULT_ROOT_URL.to_string(),
			git_service: DEFAULT_GIT_SERVICE.to_string(),
			base_delay: DEFAULT_BASE_DELAY,
		}
	}
}

impl SessionConfig {
	pub fn with_root_url(mut self, root_url: impl Into<String>) -> Self {
		self.root_url = root_url.into();
		self
	}

	pub fn with_git_service(mut self, service: impl Into<String>) -> Self {
		self.git_service = service.into();
		self
	}

	pub fn with_base_delay(mut self, delay: Duration) -> Self {
		self.base_delay = delay;
		self
	}
}

/// Builds the socket URL for `root_url` and `token`.
///
/// `http` becomes `ws`, `https` becomes `wss`, and the token is passed as the
/// `token` query parameter of `sessions/`.
pub fn session_socket_url(root_url: &str, token: &str) -> Result<Url> {
	let mut url = Url::parse(root_url)?;
	let scheme = match url.scheme() {
		"http" | "ws" => "ws",
		"https" | "wss" => "wss",
		other => return Err(Error::InvalidArgument(format!("unsupported URL scheme '{other}'"))),
	};
	if !url.path().ends_with('/') {
		let path = format!("{}/", url.path());
		url.set_path(&path);
	}
	let mut url = url.join("sessions/")?;
	url.set_scheme(scheme)
		.map_err(|_| Error::InvalidArgument(format!("cannot use scheme '{scheme}' for {root_url}")))?;
	url.query_pairs_mut().clear().append_pair("token", token);
	Ok(url)
}

mod millis {
	use std::time::Duration;

	use serde::{Deserialize, Deserializer};

	pub fn deserialize<'de, D>(deserializer: D) -> std::result::Result<Duration, D::Error>
	where
		D: Deserializer<'de>,
	{
		Ok(Duration::from_millis(u64::deserialize(deserializer)?))
	}
}
