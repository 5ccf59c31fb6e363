//! Session lifecycle on top of a [`Transport`].
//!
//! The [`SessionManager`] owns the session status, the stored
//! [`SessionDescriptor`], and the reconnection policy. One creation sequence
//! looks like:
//!
//! ```text
//! tear down old connection ─▶ connecting ─▶ creating ─┬─▶ ready
//!                                                     ├─▶ unsupported_language
//!                                                     ├─▶ no_access
//!                                                     └─▶ error (reported)
//! ```
//!
//! An unclean close drops the status to `disconnected` and schedules the same
//! sequence again after a randomized exponential backoff. A clean close (from
//! [`SessionManager::close`] or a replacement session) does not.
//!
//! Every sequence is stamped with an epoch. Starting a new sequence bumps the
//! epoch, and a sequence that resumes after an `.await` to find its epoch
//! outdated stops without touching status or counters.

mod backoff;
mod classify;
mod sink;

use std::sync::{Arc, Weak};

use codelens_protocol::{
	ClientRequest, CreateSessionPayload, Method, QueryPayload, RepoSide, SessionDescriptor, SessionStatus, StatusUpdate,
};
use parking_lot::Mutex;
use serde::Serialize;
use serde_json::Value;
use tokio::task::AbortHandle;

pub use backoff::{backoff_delay, backoff_delay_with};
pub use classify::classify_creation_error;
pub use sink::{ChannelSink, ErrorReporter, StaticToken, StatusSink, TokenSource, TracingReporter};

use crate::config::SessionConfig;
use crate::error::{Error, Result};
use crate::transport::{CloseEvent, CloseHandler, MessageListener, Transport};

/// Result of [`SessionManager::get_file_contents`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FileContents {
	/// The server's `result` payload.
	pub result: Value,
	/// Path that was requested.
	pub file_path: String,
	/// Side of the comparison that was requested.
	pub side: RepoSide,
}

struct ScheduledReconnect {
	id: u64,
	handle: AbortHandle,
}

struct State {
	status: SessionStatus,
	descriptor: Option<SessionDescriptor>,
	reconnect_attempts: u32,
	epoch: u64,
	reconnect: Option<ScheduledReconnect>,
	next_timer_id: u64,
}

impl State {
	/// Starts a new creation sequence, superseding any in flight.
	fn begin(&mut self) -> u64 {
		self.epoch += 1;
		self.epoch
	}

	fn cancel_reconnect(&mut self) {
		if let Some(scheduled) = self.reconnect.take() {
			scheduled.handle.abort();
		}
	}
}

struct Inner {
	transport: Arc<dyn Transport>,
	config: SessionConfig,
	tokens: Arc<dyn TokenSource>,
	sink: Arc<dyn StatusSink>,
	reporter: Arc<dyn ErrorReporter>,
	state: Mutex<State>,
}

impl Drop for Inner {
	fn drop(&mut self) {
		self.state.get_mut().cancel_reconnect();
	}
}

/// Builder for [`SessionManager`].
pub struct SessionManagerBuilder {
	transport: Arc<dyn Transport>,
	tokens: Arc<dyn TokenSource>,
	config: SessionConfig,
	sink: Option<Arc<dyn StatusSink>>,
	reporter: Option<Arc<dyn ErrorReporter>>,
}

impl SessionManagerBuilder {
	pub fn config(mut self, config: SessionConfig) -> Self {
		self.config = config;
		self
	}

	pub fn status_sink(mut self, sink: impl StatusSink + 'static) -> Self {
		self.sink = Some(Arc::new(sink));
		self
	}

	pub fn error_reporter(mut self, reporter: impl ErrorReporter + 'static) -> Self {
		self.reporter = Some(Arc::new(reporter));
		self
	}

	pub fn build(self) -> SessionManager {
		let sink: Arc<dyn StatusSink> = match self.sink {
			Some(sink) => sink,
			None => Arc::new(|_: SessionStatus| {}),
		};
		let reporter: Arc<dyn ErrorReporter> = match self.reporter {
			Some(reporter) => reporter,
			None => Arc::new(TracingReporter),
		};

		SessionManager {
			inner: Arc::new(Inner {
				transport: self.transport,
				config: self.config,
				tokens: self.tokens,
				sink,
				reporter,
				state: Mutex::new(State {
					status: SessionStatus::Disconnected,
					descriptor: None,
					reconnect_attempts: 0,
					epoch: 0,
					reconnect: None,
					next_timer_id: 0,
				}),
			}),
		}
	}
}

/// Maintains one analysis session and gates queries on its readiness.
///
/// Cloning is cheap and every clone drives the same session. The scheduled
/// reconnection, if any, is cancelled when the last clone is dropped.
#[derive(Clone)]
pub struct SessionManager {
	inner: Arc<Inner>,
}

impl SessionManager {
	pub fn builder(transport: Arc<dyn Transport>, tokens: impl TokenSource + 'static) -> SessionManagerBuilder {
		SessionManagerBuilder {
			transport,
			tokens: Arc::new(tokens),
			config: SessionConfig::default(),
			sink: None,
			reporter: None,
		}
	}

	/// Replaces the stored descriptor and (re)creates the session.
	///
	/// Resets the reconnection counter and supersedes any scheduled
	/// reconnection or creation still in flight. Never fails: the outcome is
	/// the status this attempt ended in, which is also published to the sink.
	pub async fn create_new_session(&self, descriptor: SessionDescriptor) -> SessionStatus {
		let epoch = {
			let mut state = self.inner.state.lock();
			state.descriptor = Some(descriptor.clone());
			state.reconnect_attempts = 0;
			state.cancel_reconnect();
			state.begin()
		};

		tracing::info!(kind = descriptor.kind(), "creating session");
		self.inner.run_creation(epoch, descriptor).await
	}

	/// Closes the connection without scheduling a reconnection.
	pub async fn close(&self) -> Result<()> {
		{
			let mut state = self.inner.state.lock();
			state.cancel_reconnect();
			state.begin();
		}

		self.inner.transport.close().await?;

		let mut state = self.inner.state.lock();
		if state.status != SessionStatus::Disconnected {
			self.inner.set_status(&mut state, SessionStatus::Disconnected);
		}
		Ok(())
	}

	pub fn status(&self) -> SessionStatus {
		self.inner.state.lock().status
	}

	pub fn is_ready(&self) -> bool {
		self.status().is_ready()
	}

	/// Reconnection attempts since the last successful creation.
	pub fn reconnect_attempts(&self) -> u32 {
		self.inner.state.lock().reconnect_attempts
	}

	pub fn descriptor(&self) -> Option<SessionDescriptor> {
		self.inner.state.lock().descriptor.clone()
	}

	pub async fn get_hover(&self, side: RepoSide, path: &str, line: u32, character: u32) -> Result<Value> {
		self.query(Method::Hover, QueryPayload::at(side, path, line, character)).await
	}

	pub async fn get_references(&self, side: RepoSide, path: &str, line: u32, character: u32) -> Result<Value> {
		self.query(Method::References, QueryPayload::at(side, path, line, character)).await
	}

	pub async fn get_definition(&self, side: RepoSide, path: &str, line: u32, character: u32) -> Result<Value> {
		self.query(Method::Definition, QueryPayload::at(side, path, line, character)).await
	}

	pub async fn get_file_contents(&self, side: RepoSide, path: &str) -> Result<FileContents> {
		let result = self.query(Method::FileContents, QueryPayload::file(side, path)).await?;
		Ok(FileContents {
			result,
			file_path: path.to_string(),
			side,
		})
	}

	async fn query(&self, method: Method, payload: QueryPayload) -> Result<Value> {
		let status = self.status();
		if !status.is_ready() {
			return Err(Error::NotReady { status });
		}

		let request = serde_json::to_value(ClientRequest::new(method, payload))?;
		tracing::debug!(method = method.as_str(), "sending query");
		self.inner.transport.send_request(request).await
	}
}

impl Inner {
	async fn run_creation(self: &Arc<Self>, epoch: u64, descriptor: SessionDescriptor) -> SessionStatus {
		// Also waits out a connection that is still in its close handshake.
		if let Err(e) = self.transport.close().await {
			tracing::debug!(error = %e, "teardown before session creation failed");
		}

		let Some(payload) = CreateSessionPayload::from_descriptor(&descriptor, &self.config.git_service) else {
			tracing::warn!("no session to be created for unsupported descriptor");
			return self.finish(epoch, SessionStatus::NoSession);
		};

		if !self.transition(epoch, SessionStatus::Connecting) {
			return self.current_status();
		}

		let token = self.tokens.token();
		if let Err(e) = self.transport.connect(&token, self.close_handler()).await {
			tracing::warn!(error = %e, "failed to connect");
			return self.connect_failed(epoch);
		}

		self.transport.set_listener(self.status_listener());
		if !self.transition(epoch, SessionStatus::Creating) {
			return self.current_status();
		}

		let response = match serde_json::to_value(ClientRequest::new(Method::CreateSession, payload)) {
			Ok(request) => self.transport.send_request(request).await,
			Err(e) => Err(e.into()),
		};

		match response {
			Ok(_) => {
				tracing::info!(kind = descriptor.kind(), "session ready");
				self.finish(epoch, SessionStatus::Ready)
			}
			Err(error @ Error::Remote { .. }) => {
				let status = classify_creation_error(error.remote_message().unwrap_or_default());
				tracing::info!(%status, error = %error, "session creation rejected");
				let status = self.finish(epoch, status);
				if status == SessionStatus::Error {
					self.reporter.report(&error);
				}
				status
			}
			Err(error) if error.is_transport() => {
				// The close handler owns recovery for transport failures.
				tracing::debug!(error = %error, "session creation interrupted");
				self.current_status()
			}
			Err(error) => {
				tracing::warn!(error = %error, "session creation failed");
				let status = self.finish(epoch, SessionStatus::Error);
				if status == SessionStatus::Error {
					self.reporter.report(&error);
				}
				status
			}
		}
	}

	fn current_status(&self) -> SessionStatus {
		self.state.lock().status
	}

	/// Publishes `status` if `epoch` is still current.
	fn transition(&self, epoch: u64, status: SessionStatus) -> bool {
		let mut state = self.state.lock();
		if state.epoch != epoch {
			tracing::debug!(epoch, current = state.epoch, "creation superseded");
			return false;
		}
		self.set_status(&mut state, status);
		true
	}

	/// Final status of a creation sequence; stale sequences report the current status.
	fn finish(&self, epoch: u64, status: SessionStatus) -> SessionStatus {
		let mut state = self.state.lock();
		if state.epoch != epoch {
			return state.status;
		}
		if status == SessionStatus::Ready {
			state.reconnect_attempts = 0;
		}
		self.set_status(&mut state, status);
		status
	}

	fn connect_failed(self: &Arc<Self>, epoch: u64) -> SessionStatus {
		let mut state = self.state.lock();
		if state.epoch != epoch {
			return state.status;
		}
		self.set_status(&mut state, SessionStatus::Disconnected);
		self.schedule_reconnect(&mut state);
		SessionStatus::Disconnected
	}

	fn set_status(&self, state: &mut State, status: SessionStatus) {
		state.status = status;
		tracing::debug!(%status, "session status");
		self.sink.publish(status);
	}

	fn close_handler(self: &Arc<Self>) -> CloseHandler {
		let inner = Arc::downgrade(self);
		Box::new(move |event| {
			if let Some(inner) = inner.upgrade() {
				inner.on_close(event);
			}
		})
	}

	fn on_close(self: &Arc<Self>, event: CloseEvent) {
		let mut state = self.state.lock();
		self.set_status(&mut state, SessionStatus::Disconnected);

		if event.was_clean {
			tracing::debug!("connection closed cleanly");
			return;
		}

		tracing::warn!("connection lost");
		self.schedule_reconnect(&mut state);
	}

	fn status_listener(self: &Arc<Self>) -> MessageListener {
		let inner = Arc::downgrade(self);
		Arc::new(move |message: Value| {
			if let Some(inner) = inner.upgrade() {
				inner.on_unsolicited(message);
			}
		})
	}

	fn on_unsolicited(&self, message: Value) {
		let Ok(update) = serde_json::from_value::<StatusUpdate>(message.clone()) else {
			tracing::debug!(%message, "ignoring unsolicited message");
			return;
		};

		let status = match update.status_update.parse::<SessionStatus>() {
			Ok(status) => status,
			Err(e) => {
				tracing::warn!(error = %e, "ignoring status update");
				return;
			}
		};

		if status == SessionStatus::Error {
			tracing::warn!(%message, "server reported session error");
		}

		let mut state = self.state.lock();
		self.set_status(&mut state, status);
	}

	fn schedule_reconnect(self: &Arc<Self>, state: &mut State) {
		let Ok(runtime) = tokio::runtime::Handle::try_current() else {
			tracing::warn!("no async runtime, reconnection not scheduled");
			return;
		};

		let attempt = state.reconnect_attempts;
		let delay = backoff_delay(attempt, self.config.base_delay);
		state.reconnect_attempts = attempt.saturating_add(1);
		state.next_timer_id += 1;
		let id = state.next_timer_id;

		let inner: Weak<Self> = Arc::downgrade(self);
		let handle = runtime.spawn(async move {
			tokio::time::sleep(delay).await;
			if let Some(inner) = inner.upgrade() {
				inner.reconnect_if_required(id).await;
			}
		});

		state.cancel_reconnect();
		state.reconnect = Some(ScheduledReconnect {
			id,
			handle: handle.abort_handle(),
		});
		tracing::info!(attempt = attempt + 1, delay_ms = delay.as_millis() as u64, "reconnection scheduled");
	}

	async fn reconnect_if_required(self: &Arc<Self>, timer: u64) {
		let (epoch, descriptor, attempt) = {
			let mut state = self.state.lock();
			if state.reconnect.as_ref().map(|scheduled| scheduled.id) != Some(timer) {
				return;
			}
			state.reconnect = None;

			if self.transport.is_open() || self.transport.is_opening() {
				tracing::debug!("already connected, skipping reconnection");
				return;
			}

			let Some(descriptor) = state.descriptor.clone() else {
				return;
			};
			(state.begin(), descriptor, state.reconnect_attempts)
		};

		tracing::info!(attempt, "reconnecting");
		let status = self.run_creation(epoch, descriptor).await;
		tracing::debug!(%status, "reconnection finished");
	}
}

#[cfg(test)]
mod tests;
