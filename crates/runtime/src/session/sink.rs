//! Collaborators the session manager reports to and reads from.

use codelens_protocol::SessionStatus;
use tokio::sync::mpsc;

use crate::error::Error;

/// One-way channel for status changes, in the order they happen.
///
/// `publish` is called while session state is locked; implementations must
/// not call back into the [`SessionManager`](super::SessionManager).
pub trait StatusSink: Send + Sync {
	fn publish(&self, status: SessionStatus);
}

impl<F> StatusSink for F
where
	F: Fn(SessionStatus) + Send + Sync,
{
	fn publish(&self, status: SessionStatus) {
		self(status)
	}
}

/// Status sink backed by an unbounded tokio channel.
#[derive(Debug, Clone)]
pub struct ChannelSink(mpsc::UnboundedSender<SessionStatus>);

impl ChannelSink {
	/// Creates a sink and the receiver observing it.
	pub fn channel() -> (Self, mpsc::UnboundedReceiver<SessionStatus>) {
		let (tx, rx) = mpsc::unbounded_channel();
		(Self(tx), rx)
	}
}

impl StatusSink for ChannelSink {
	fn publish(&self, status: SessionStatus) {
		if self.0.send(status).is_err() {
			tracing::trace!(%status, "status receiver dropped");
		}
	}
}

/// Supplies the connection token each time a connection is opened.
pub trait TokenSource: Send + Sync {
	fn token(&self) -> String;
}

impl<F> TokenSource for F
where
	F: Fn() -> String + Send + Sync,
{
	fn token(&self) -> String {
		self()
	}
}

/// A token that never changes.
#[derive(Debug, Clone)]
pub struct StaticToken(pub String);

impl TokenSource for StaticToken {
	fn token(&self) -> String {
		self.0.clone()
	}
}

/// Receives session-creation errors that match no known status.
pub trait ErrorReporter: Send + Sync {
	fn report(&self, error: &Error);
}

/// Reporter that logs through `tracing`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingReporter;

impl ErrorReporter for TracingReporter {
	fn report(&self, error: &Error) {
		tracing::error!(error = %error, "unclassified session creation failure");
	}
}
