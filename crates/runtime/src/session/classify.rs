//! Mapping of session-creation errors onto caller-visible statuses.

use codelens_protocol::SessionStatus;

const UNSUPPORTED_LANGUAGE: &str = "Language not supported";

const NO_ACCESS: [&str; 3] = ["Repository not found", "Branch not found", "Pull Request not found"];

/// Status for a server error returned by `session.create`.
///
/// Anything not recognized maps to [`SessionStatus::Error`] and should be
/// forwarded to the error reporter.
pub fn classify_creation_error(message: &str) -> SessionStatus {
	if message.contains(UNSUPPORTED_LANGUAGE) {
		SessionStatus::UnsupportedLanguage
	} else if NO_ACCESS.iter().any(|needle| message.contains(needle)) {
		SessionStatus::NoAccess
	} else {
		SessionStatus::Error
	}
}
