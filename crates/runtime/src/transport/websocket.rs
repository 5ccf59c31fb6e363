//! WebSocket transport over tokio-tungstenite.
//!
//! Each connection is driven by one spawned task that owns the socket. Callers
//! talk to it through an unbounded command channel and observe its lifecycle
//! through a `watch` channel:
//!
//! ```text
//! Opening ──▶ Open ──▶ Closing ──▶ Closed
//!    │
//!    └──▶ Failed(reason)
//! ```
//!
//! Teardown order matters: the link is detached from the slot and the command
//! channel is closed before pending requests are rejected, so a request can
//! never be queued on a connection that has already drained its pending map.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use parking_lot::{Mutex, RwLock};
use serde_json::Value;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use url::Url;

use super::{CloseEvent, CloseHandler, MessageListener, Transport};
use crate::config::{SessionConfig, session_socket_url};
use crate::connection::Correlator;
use crate::error::{Error, Result};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Upper bound on waiting for the server to acknowledge a close frame.
const CLOSE_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, PartialEq, Eq)]
enum LinkState {
	Opening,
	Open,
	Closing,
	Closed,
	Failed(String),
}

enum Command {
	Send(Value),
	Close,
}

/// One connection attempt and, once open, the live connection.
struct Link {
	state: watch::Sender<LinkState>,
	commands: mpsc::UnboundedSender<Command>,
	correlator: Correlator,
	on_close: Mutex<Option<CloseHandler>>,
}

impl Link {
	fn state(&self) -> LinkState {
		self.state.borrow().clone()
	}

	fn set_state(&self, state: LinkState) {
		self.state.send_replace(state);
	}
}

struct Shared {
	link: Mutex<Option<Arc<Link>>>,
	listener: RwLock<Option<MessageListener>>,
}

/// [`Transport`] speaking JSON text frames over a WebSocket.
pub struct WebSocketTransport {
	root_url: String,
	shared: Arc<Shared>,
}

impl WebSocketTransport {
	/// Creates a transport for the service rooted at `root_url` (`http(s)://...`).
	pub fn new(root_url: impl Into<String>) -> Self {
		Self {
			root_url: root_url.into(),
			shared: Arc::new(Shared {
				link: Mutex::new(None),
				listener: RwLock::new(None),
			}),
		}
	}

	pub fn from_config(config: &SessionConfig) -> Self {
		Self::new(config.root_url.clone())
	}

	fn current_state(&self) -> Option<LinkState> {
		self.shared.link.lock().as_ref().map(|link| link.state())
	}

	fn open_link(&self) -> Option<Arc<Link>> {
		self.shared
			.link
			.lock()
			.as_ref()
			.filter(|link| link.state() == LinkState::Open)
			.cloned()
	}
}

impl Drop for WebSocketTransport {
	fn drop(&mut self) {
		if let Some(link) = self.shared.link.lock().as_ref() {
			let _ = link.commands.send(Command::Close);
		}
	}
}

#[async_trait]
impl Transport for WebSocketTransport {
	async fn connect(&self, token: &str, on_close: CloseHandler) -> Result<()> {
		let mut on_close = Some(on_close);
		loop {
			let attempt = {
				let mut slot = self.shared.link.lock();
				match slot.as_ref() {
					Some(link) if matches!(link.state(), LinkState::Closing | LinkState::Closed) => {
						Err(link.state.subscribe())
					}
					Some(link) => {
						tracing::debug!("connection already exists, joining attempt");
						Ok(link.state.subscribe())
					}
					None => {
						let url = session_socket_url(&self.root_url, token)?;
						let (commands, commands_rx) = mpsc::unbounded_channel();
						let (state, state_rx) = watch::channel(LinkState::Opening);
						let link = Arc::new(Link {
							state,
							commands,
							correlator: Correlator::new(),
							on_close: Mutex::new(on_close.take()),
						});
						*slot = Some(Arc::clone(&link));
						tokio::spawn(drive(Arc::clone(&self.shared), link, url, commands_rx));
						Ok(state_rx)
					}
				}
			};

			match attempt {
				Ok(state_rx) => return wait_open(state_rx).await,
				Err(closing) => {
					tracing::debug!("previous connection still closing, waiting for teardown");
					wait_closed(closing).await;
				}
			}
		}
	}

	async fn send_request(&self, payload: Value) -> Result<Value> {
		let link = self.open_link().ok_or(Error::NotConnected)?;
		let (id, framed, response) = link.correlator.register(payload)?;

		tracing::debug!(id, "sending request");
		if link.commands.send(Command::Send(framed)).is_err() {
			return Err(Error::ConnectionClosed);
		}

		response.await
	}

	fn set_listener(&self, listener: MessageListener) {
		*self.shared.listener.write() = Some(listener);
	}

	async fn close(&self) -> Result<()> {
		let current = self.shared.link.lock().clone();
		let Some(link) = current else {
			return Ok(());
		};

		let state_rx = link.state.subscribe();
		let _ = link.commands.send(Command::Close);
		wait_closed(state_rx).await;
		Ok(())
	}

	fn is_open(&self) -> bool {
		self.current_state() == Some(LinkState::Open)
	}

	fn is_opening(&self) -> bool {
		self.current_state() == Some(LinkState::Opening)
	}
}

async fn wait_open(mut state_rx: watch::Receiver<LinkState>) -> Result<()> {
	loop {
		let state = state_rx.borrow_and_update().clone();
		match state {
			LinkState::Open => return Ok(()),
			LinkState::Failed(reason) => return Err(Error::ConnectionFailed(reason)),
			LinkState::Closing | LinkState::Closed => {
				return Err(Error::ConnectionFailed("connection closed before it opened".to_string()));
			}
			LinkState::Opening => {}
		}
		if state_rx.changed().await.is_err() {
			return Err(Error::ConnectionFailed("connection task ended".to_string()));
		}
	}
}

async fn wait_closed(mut state_rx: watch::Receiver<LinkState>) {
	loop {
		let state = state_rx.borrow_and_update().clone();
		if matches!(state, LinkState::Closed | LinkState::Failed(_)) {
			return;
		}
		if state_rx.changed().await.is_err() {
			return;
		}
	}
}

/// Owns the socket for the lifetime of one link.
async fn drive(shared: Arc<Shared>, link: Arc<Link>, url: Url, mut commands_rx: mpsc::UnboundedReceiver<Command>) {
	let host = url.host_str().unwrap_or_default().to_string();
	tracing::debug!(host = %host, "opening connection");

	let connecting = connect_async(url.as_str());
	tokio::pin!(connecting);

	let mut ws = loop {
		tokio::select! {
			result = &mut connecting => match result {
				Ok((ws, _)) => break ws,
				Err(e) => {
					fail_open(&shared, &link, commands_rx, e.to_string());
					return;
				}
			},
			command = commands_rx.recv() => match command {
				Some(Command::Send(_)) => continue,
				Some(Command::Close) | None => {
					fail_open(&shared, &link, commands_rx, "closed while opening".to_string());
					return;
				}
			},
		}
	};

	link.set_state(LinkState::Open);
	tracing::info!(host = %host, "connection open");

	let mut was_clean = false;
	loop {
		tokio::select! {
			command = commands_rx.recv() => match command {
				Some(Command::Send(frame)) => {
					if let Err(e) = ws.send(Message::Text(frame.to_string())).await {
						tracing::warn!(error = %e, "failed to write frame");
						break;
					}
				}
				Some(Command::Close) | None => {
					was_clean = true;
					link.set_state(LinkState::Closing);
					close_gracefully(&mut ws).await;
					break;
				}
			},
			incoming = ws.next() => match incoming {
				Some(Ok(message)) => handle_message(&shared, &link, message),
				Some(Err(e)) => {
					tracing::warn!(error = %e, "socket error");
					break;
				}
				None => {
					tracing::debug!("socket closed by peer");
					break;
				}
			},
		}
	}

	teardown(&shared, &link, commands_rx, CloseEvent { was_clean });
	tracing::info!(host = %host, was_clean, "connection closed");
}

fn handle_message(shared: &Shared, link: &Link, message: Message) {
	let parsed = match message {
		Message::Text(text) => serde_json::from_str::<Value>(&text),
		Message::Binary(bytes) => serde_json::from_slice::<Value>(&bytes),
		Message::Close(frame) => {
			tracing::debug!(?frame, "server sent close frame");
			return;
		}
		_ => return,
	};

	let message = match parsed {
		Ok(message) => message,
		Err(e) => {
			tracing::warn!(error = %e, "dropping unparseable frame");
			return;
		}
	};

	if let Some(unsolicited) = link.correlator.dispatch(message) {
		let listener = shared.listener.read().clone();
		match listener {
			Some(listener) => listener(unsolicited),
			None => tracing::debug!("no listener registered, dropping unsolicited message"),
		}
	}
}

async fn close_gracefully(ws: &mut WsStream) {
	if let Err(e) = ws.close(None).await {
		tracing::debug!(error = %e, "close frame not sent");
		return;
	}

	let drain = async { while let Some(Ok(_)) = ws.next().await {} };
	if tokio::time::timeout(CLOSE_HANDSHAKE_TIMEOUT, drain).await.is_err() {
		tracing::debug!("close handshake timed out");
	}
}

fn detach(shared: &Shared, link: &Arc<Link>) {
	let mut slot = shared.link.lock();
	if slot.as_ref().is_some_and(|current| Arc::ptr_eq(current, link)) {
		*slot = None;
	}
}

fn teardown(shared: &Shared, link: &Arc<Link>, mut commands_rx: mpsc::UnboundedReceiver<Command>, event: CloseEvent) {
	link.set_state(LinkState::Closing);
	detach(shared, link);
	commands_rx.close();

	let rejected = link.correlator.reject_all();
	if rejected > 0 {
		tracing::debug!(rejected, "rejected pending requests on close");
	}

	let on_close = link.on_close.lock().take();
	if let Some(on_close) = on_close {
		on_close(event);
	}
	link.set_state(LinkState::Closed);
}

fn fail_open(shared: &Shared, link: &Arc<Link>, mut commands_rx: mpsc::UnboundedReceiver<Command>, reason: String) {
	tracing::warn!(reason = %reason, "connection attempt failed");
	detach(shared, link);
	commands_rx.close();
	link.correlator.reject_all();
	link.on_close.lock().take();
	link.set_state(LinkState::Failed(reason));
}
