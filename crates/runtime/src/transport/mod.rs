//! Transport layer owning the single socket connection.
//!
//! The [`Transport`] trait is the seam between session logic and the network.
//! [`WebSocketTransport`] is the production implementation; session tests
//! drive the state machine through an in-memory implementation instead.
//!
//! A transport knows nothing about sessions or retries. It opens and closes
//! one connection, correlates requests with responses, and hands every
//! message without an `id` to the registered listener.

mod websocket;

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::Result;

pub use websocket::WebSocketTransport;

/// How a connection ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CloseEvent {
	/// True only when the close was requested through [`Transport::close`].
	pub was_clean: bool,
}

impl CloseEvent {
	pub fn clean() -> Self {
		Self { was_clean: true }
	}

	pub fn unexpected() -> Self {
		Self { was_clean: false }
	}
}

/// Invoked once when an opened connection terminates.
pub type CloseHandler = Box<dyn FnOnce(CloseEvent) + Send + 'static>;

/// Receives every inbound message that carries no correlation id.
pub type MessageListener = Arc<dyn Fn(Value) + Send + Sync + 'static>;

/// Owner of one persistent connection with request/response correlation.
#[async_trait]
pub trait Transport: Send + Sync {
	/// Opens the connection for `token`, or waits on the attempt already in progress.
	///
	/// A connection that is still closing is waited out first. `on_close` is
	/// kept only when this call creates the connection.
	async fn connect(&self, token: &str, on_close: CloseHandler) -> Result<()>;

	/// Sends `payload` with a fresh correlation id and awaits its response.
	///
	/// Resolves with the response's `result`, or fails with
	/// [`Error::Remote`](crate::Error::Remote) when the response carries `error`.
	async fn send_request(&self, payload: Value) -> Result<Value>;

	/// Replaces the unsolicited-message listener.
	fn set_listener(&self, listener: MessageListener);

	/// Closes the connection if there is one and waits for teardown.
	async fn close(&self) -> Result<()>;

	fn is_open(&self) -> bool;

	fn is_opening(&self) -> bool;
}
