//! Request/response correlation for one socket connection.
//!
//! Every outgoing request gets an `id` from a per-connection counter and a
//! oneshot slot in the pending map. Inbound messages are classified by
//! [`Inbound::classify`]:
//!
//! 1. A message with an `id` that matches a pending request completes it
//! 2. A message with an unknown `id` is a late or duplicate response and is dropped
//! 3. A message without `id` is unsolicited and handed back to the caller
//!
//! [`Correlator::reject_all`] drains the map on teardown so no request is left
//! waiting on a connection that no longer exists.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::task::{Context, Poll};

use parking_lot::Mutex;
use serde_json::{Map, Value};
use tokio::sync::oneshot;

use crate::error::{Error, Result};

/// Pending request slots keyed by correlation id.
type PendingMap = Arc<Mutex<HashMap<u64, oneshot::Sender<Result<Value>>>>>;

/// An inbound frame after correlation-field extraction.
#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
	/// Response to a request (has a numeric `id`).
	Response {
		id: u64,
		result: Option<Value>,
		error: Option<Value>,
	},
	/// Response whose `id` is not one we could have issued.
	Unmatched(Value),
	/// Server-initiated message (no `id`).
	Unsolicited(Value),
}

impl Inbound {
	pub fn classify(message: Value) -> Self {
		let id = match &message {
			Value::Object(object) => match object.get("id") {
				None | Some(Value::Null) => None,
				Some(id) => Some(id.as_u64()),
			},
			_ => None,
		};

		match (id, message) {
			(Some(Some(id)), Value::Object(mut object)) => Inbound::Response {
				id,
				result: object.remove("result"),
				error: object.remove("error").filter(|e| !e.is_null()),
			},
			(Some(_), message) => Inbound::Unmatched(message),
			(None, message) => Inbound::Unsolicited(message),
		}
	}
}

/// RAII guard removing the pending slot when a request future is dropped early.
#[derive(Debug)]
struct CancelGuard {
	id: u64,
	pending: PendingMap,
	completed: bool,
}

impl CancelGuard {
	fn new(id: u64, pending: PendingMap) -> Self {
		Self {
			id,
			pending,
			completed: false,
		}
	}

	fn complete(&mut self) {
		self.completed = true;
	}
}

impl Drop for CancelGuard {
	fn drop(&mut self) {
		if self.completed {
			return;
		}
		if self.pending.lock().remove(&self.id).is_some() {
			tracing::debug!(id = self.id, "removed abandoned request");
		}
	}
}

/// Future resolving with the response to one request.
#[derive(Debug)]
pub struct ResponseFuture {
	rx: oneshot::Receiver<Result<Value>>,
	guard: CancelGuard,
}

impl Future for ResponseFuture {
	type Output = Result<Value>;

	fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
		match Pin::new(&mut self.rx).poll(cx) {
			Poll::Ready(result) => {
				self.guard.complete();
				Poll::Ready(result.map_err(|_| Error::ConnectionClosed).and_then(|r| r))
			}
			Poll::Pending => Poll::Pending,
		}
	}
}

/// Correlates requests and responses on a single connection.
pub struct Correlator {
	last_id: AtomicU64,
	pending: PendingMap,
}

impl Default for Correlator {
	fn default() -> Self {
		Self::new()
	}
}

impl Correlator {
	pub fn new() -> Self {
		Self {
			last_id: AtomicU64::new(0),
			pending: Arc::new(Mutex::new(HashMap::new())),
		}
	}

	/// Stamps `payload` with a fresh id and registers its pending slot.
	///
	/// Returns the framed message to transmit and the future for its response.
	pub fn register(&self, payload: Value) -> Result<(u64, Value, ResponseFuture)> {
		let Value::Object(fields) = payload else {
			return Err(Error::InvalidArgument("request payload must be a JSON object".to_string()));
		};

		let id = self.last_id.fetch_add(1, Ordering::SeqCst) + 1;
		let mut framed = Map::with_capacity(fields.len() + 1);
		framed.insert("id".to_string(), Value::from(id));
		framed.extend(fields.into_iter().filter(|(key, _)| key != "id"));

		let (tx, rx) = oneshot::channel();
		self.pending.lock().insert(id, tx);

		let future = ResponseFuture {
			rx,
			guard: CancelGuard::new(id, Arc::clone(&self.pending)),
		};
		Ok((id, Value::Object(framed), future))
	}

	/// Routes an inbound message.
	///
	/// Responses complete their pending request; the unsolicited message, if
	/// any, is returned for the listener.
	pub fn dispatch(&self, message: Value) -> Option<Value> {
		match Inbound::classify(message) {
			Inbound::Response { id, result, error } => {
				let Some(slot) = self.pending.lock().remove(&id) else {
					tracing::debug!(id, "dropping response without pending request");
					return None;
				};
				let outcome = match error {
					Some(error) => Err(Error::remote(error)),
					None => Ok(result.unwrap_or(Value::Null)),
				};
				let _ = slot.send(outcome);
				None
			}
			Inbound::Unmatched(message) => {
				tracing::debug!(%message, "dropping response with non-numeric id");
				None
			}
			Inbound::Unsolicited(message) => Some(message),
		}
	}

	/// Rejects every pending request with [`Error::ConnectionClosed`].
	pub fn reject_all(&self) -> usize {
		let drained: Vec<_> = self.pending.lock().drain().collect();
		let count = drained.len();
		for (_, slot) in drained {
			let _ = slot.send(Err(Error::ConnectionClosed));
		}
		count
	}

	/// Number of requests awaiting a response.
	pub fn pending_len(&self) -> usize {
		self.pending.lock().len()
	}
}
