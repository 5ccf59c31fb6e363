use std::collections::VecDeque;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;
use tokio::sync::{Notify, mpsc};

use super::*;

#[derive(Default)]
struct MockState {
	open: bool,
	opening: bool,
	hold_connect: bool,
	hold_next_request: bool,
	connect_results: VecDeque<Result<()>>,
	responses: VecDeque<Result<Value>>,
	sent: Vec<Value>,
	tokens: Vec<String>,
	connects: usize,
	on_close: Option<CloseHandler>,
	listener: Option<MessageListener>,
}

/// In-memory transport with scripted outcomes.
#[derive(Default)]
struct MockTransport {
	state: Mutex<MockState>,
	release: Notify,
	release_request: Notify,
}

impl MockTransport {
	fn new() -> Arc<Self> {
		Arc::new(Self::default())
	}

	fn fail_next_connect(&self) {
		self.state
			.lock()
			.connect_results
			.push_back(Err(Error::ConnectionFailed("refused".to_string())));
	}

	fn respond(&self, response: Result<Value>) {
		self.state.lock().responses.push_back(response);
	}

	fn hold_connect(&self, hold: bool) {
		self.state.lock().hold_connect = hold;
	}

	fn hold_next_request(&self) {
		self.state.lock().hold_next_request = true;
	}

	fn connects(&self) -> usize {
		self.state.lock().connects
	}

	fn sent(&self) -> Vec<Value> {
		self.state.lock().sent.clone()
	}

	fn drop_connection(&self) {
		let on_close = {
			let mut state = self.state.lock();
			state.open = false;
			state.on_close.take()
		};
		if let Some(on_close) = on_close {
			on_close(CloseEvent::unexpected());
		}
	}

	fn push_unsolicited(&self, message: Value) {
		let listener = self.state.lock().listener.clone();
		if let Some(listener) = listener {
			listener(message);
		}
	}
}

#[async_trait]
impl Transport for MockTransport {
	async fn connect(&self, token: &str, on_close: CloseHandler) -> Result<()> {
		let hold = {
			let mut state = self.state.lock();
			state.connects += 1;
			state.tokens.push(token.to_string());
			state.opening = true;
			state.hold_connect
		};
		if hold {
			self.release.notified().await;
		}

		let mut state = self.state.lock();
		state.opening = false;
		state.connect_results.pop_front().unwrap_or(Ok(()))?;
		state.open = true;
		state.on_close = Some(on_close);
		Ok(())
	}

	async fn send_request(&self, payload: Value) -> Result<Value> {
		let (response, hold) = {
			let mut state = self.state.lock();
			if !state.open {
				return Err(Error::NotConnected);
			}
			state.sent.push(payload);
			let response = state.responses.pop_front().unwrap_or_else(|| Ok(json!({})));
			(response, std::mem::take(&mut state.hold_next_request))
		};
		if hold {
			self.release_request.notified().await;
		}
		response
	}

	fn set_listener(&self, listener: MessageListener) {
		self.state.lock().listener = Some(listener);
	}

	async fn close(&self) -> Result<()> {
		let on_close = {
			let mut state = self.state.lock();
			if !state.open {
				return Ok(());
			}
			state.open = false;
			state.on_close.take()
		};
		if let Some(on_close) = on_close {
			on_close(CloseEvent::clean());
		}
		Ok(())
	}

	fn is_open(&self) -> bool {
		self.state.lock().open
	}

	fn is_opening(&self) -> bool {
		self.state.lock().opening
	}
}

#[derive(Clone, Default)]
struct RecordingReporter(Arc<Mutex<Vec<String>>>);

impl ErrorReporter for RecordingReporter {
	fn report(&self, error: &Error) {
		self.0.lock().push(error.to_string());
	}
}

struct Harness {
	manager: SessionManager,
	transport: Arc<MockTransport>,
	statuses: mpsc::UnboundedReceiver<SessionStatus>,
	reported: RecordingReporter,
}

impl Harness {
	fn new() -> Self {
		let transport = MockTransport::new();
		let (sink, statuses) = ChannelSink::channel();
		let reported = RecordingReporter::default();
		let manager = SessionManager::builder(transport.clone(), StaticToken("secret".to_string()))
			.status_sink(sink)
			.error_reporter(reported.clone())
			.build();

		Self {
			manager,
			transport,
			statuses,
			reported,
		}
	}

	fn drain(&mut self) -> Vec<SessionStatus> {
		let mut seen = Vec::new();
		while let Ok(status) = self.statuses.try_recv() {
			seen.push(status);
		}
		seen
	}

	fn reported(&self) -> Vec<String> {
		self.reported.0.lock().clone()
	}
}

fn pull() -> SessionDescriptor {
	SessionDescriptor::pull("acme", "widgets", 42)
}

async fn settle() {
	for _ in 0..20 {
		tokio::task::yield_now().await;
	}
}

use SessionStatus::{Connecting, Creating, Disconnected, NoAccess, NoSession, Ready, UnsupportedLanguage};

#[tokio::test]
async fn pull_request_session_becomes_ready() {
	let mut h = Harness::new();

	let status = h.manager.create_new_session(pull()).await;

	assert_eq!(status, Ready);
	assert!(h.manager.is_ready());
	assert_eq!(h.drain(), vec![Connecting, Creating, Ready]);
	assert_eq!(h.transport.state.lock().tokens, vec!["secret".to_string()]);
	assert_eq!(
		h.transport.sent(),
		vec![json!({
			"type": "session.create",
			"payload": {
				"organisation": "acme",
				"name": "widgets",
				"service": "github",
				"pull_request_id": 42
			}
		})]
	);
	assert!(h.reported().is_empty());
}

#[tokio::test]
async fn compare_session_sends_both_commits() {
	let mut h = Harness::new();

	let status = h
		.manager
		.create_new_session(SessionDescriptor::compare("acme", "widgets", "head123", "base456"))
		.await;

	assert_eq!(status, Ready);
	assert_eq!(
		h.transport.sent()[0]["payload"],
		json!({
			"organisation": "acme",
			"name": "widgets",
			"service": "github",
			"head_sha": "head123",
			"base_sha": "base456"
		})
	);
	assert_eq!(h.drain(), vec![Connecting, Creating, Ready]);
}

#[tokio::test]
async fn git_service_comes_from_config() {
	let transport = MockTransport::new();
	let manager = SessionManager::builder(transport.clone(), || "token".to_string())
		.config(SessionConfig::default().with_git_service("gitlab"))
		.build();

	manager
		.create_new_session(SessionDescriptor::file("acme", "widgets", "abc"))
		.await;

	assert_eq!(transport.sent()[0]["payload"]["service"], "gitlab");
	assert_eq!(transport.sent()[0]["payload"]["head_sha"], "abc");
}

#[tokio::test(start_paused = true)]
async fn unsupported_language_is_not_reported() {
	let mut h = Harness::new();
	h.transport
		.respond(Err(Error::remote(json!("Language not supported: COBOL"))));

	let status = h.manager.create_new_session(pull()).await;

	assert_eq!(status, UnsupportedLanguage);
	assert_eq!(h.drain(), vec![Connecting, Creating, UnsupportedLanguage]);
	assert!(h.reported().is_empty());

	tokio::time::sleep(Duration::from_secs(60)).await;
	assert_eq!(h.transport.connects(), 1);
	assert_eq!(h.manager.reconnect_attempts(), 0);
	assert_eq!(h.manager.status(), UnsupportedLanguage);
}

#[tokio::test(start_paused = true)]
async fn missing_repository_means_no_access() {
	let mut h = Harness::new();
	h.transport
		.respond(Err(Error::remote(json!({"message": "Repository not found"}))));

	let status = h.manager.create_new_session(pull()).await;

	assert_eq!(status, NoAccess);
	assert_eq!(h.drain(), vec![Connecting, Creating, NoAccess]);
	assert!(h.reported().is_empty());

	tokio::time::sleep(Duration::from_secs(60)).await;
	assert_eq!(h.transport.connects(), 1);
	assert_eq!(h.manager.reconnect_attempts(), 0);
}

#[tokio::test]
async fn unknown_creation_error_is_reported() {
	let mut h = Harness::new();
	h.transport.respond(Err(Error::remote(json!("Internal error"))));

	let status = h.manager.create_new_session(pull()).await;

	assert_eq!(status, SessionStatus::Error);
	assert_eq!(h.drain(), vec![Connecting, Creating, SessionStatus::Error]);
	assert_eq!(h.reported().len(), 1);
	assert!(h.reported()[0].contains("Internal error"));
}

#[tokio::test]
async fn local_failure_during_creation_is_reported() {
	let mut h = Harness::new();
	h.transport
		.respond(Err(Error::InvalidArgument("payload rejected".to_string())));

	let status = h.manager.create_new_session(pull()).await;

	assert_eq!(status, SessionStatus::Error);
	assert_eq!(h.drain(), vec![Connecting, Creating, SessionStatus::Error]);
	assert_eq!(h.reported().len(), 1);
	assert!(h.reported()[0].contains("payload rejected"));
}

#[tokio::test(start_paused = true)]
async fn connection_lost_during_creation_is_left_to_reconnection() {
	let mut h = Harness::new();
	h.transport.respond(Err(Error::ConnectionClosed));

	let status = h.manager.create_new_session(pull()).await;

	assert_eq!(status, Creating);
	assert!(h.reported().is_empty());

	h.transport.drop_connection();

	assert_eq!(h.manager.status(), Disconnected);
	assert_eq!(h.manager.reconnect_attempts(), 1);
	assert_eq!(h.drain(), vec![Connecting, Creating, Disconnected]);
}

#[tokio::test]
async fn late_response_from_superseded_creation_is_ignored() {
	let mut h = Harness::new();
	h.transport.hold_next_request();
	h.transport.respond(Err(Error::remote(json!("Internal error"))));

	let first = tokio::spawn({
		let manager = h.manager.clone();
		async move { manager.create_new_session(pull()).await }
	});
	settle().await;
	assert_eq!(h.manager.status(), Creating);

	let second = h
		.manager
		.create_new_session(SessionDescriptor::pull("acme", "widgets", 43))
		.await;
	assert_eq!(second, Ready);

	h.transport.release_request.notify_one();
	assert_eq!(first.await.unwrap(), Ready);

	assert_eq!(h.manager.status(), Ready);
	assert_eq!(h.manager.reconnect_attempts(), 0);
	assert_eq!(
		h.drain(),
		vec![Connecting, Creating, Disconnected, Connecting, Creating, Ready]
	);
	assert!(h.reported().is_empty());
}

#[tokio::test]
async fn unsupported_descriptor_never_connects() {
	let mut h = Harness::new();

	let status = h
		.manager
		.create_new_session(SessionDescriptor::Unsupported)
		.await;

	assert_eq!(status, NoSession);
	assert_eq!(h.drain(), vec![NoSession]);
	assert_eq!(h.transport.connects(), 0);
	assert!(h.transport.sent().is_empty());
}

#[tokio::test(start_paused = true)]
async fn failed_connect_schedules_reconnection() {
	let mut h = Harness::new();
	h.transport.fail_next_connect();

	let status = h.manager.create_new_session(pull()).await;

	assert_eq!(status, Disconnected);
	assert_eq!(h.drain(), vec![Connecting, Disconnected]);
	assert_eq!(h.manager.reconnect_attempts(), 1);
	assert!(h.reported().is_empty());

	tokio::time::sleep(Duration::from_secs(2)).await;

	assert_eq!(h.transport.connects(), 2);
	assert_eq!(h.manager.status(), Ready);
	assert_eq!(h.manager.reconnect_attempts(), 0);
	assert_eq!(h.drain(), vec![Connecting, Creating, Ready]);
}

#[tokio::test(start_paused = true)]
async fn unexpected_close_reconnects_with_same_descriptor() {
	let mut h = Harness::new();
	h.manager.create_new_session(pull()).await;
	h.drain();

	h.transport.drop_connection();

	assert_eq!(h.manager.status(), Disconnected);
	assert_eq!(h.manager.reconnect_attempts(), 1);

	tokio::time::sleep(Duration::from_secs(2)).await;

	assert_eq!(h.transport.connects(), 2);
	assert_eq!(h.manager.status(), Ready);
	assert_eq!(h.manager.reconnect_attempts(), 0);
	assert_eq!(h.drain(), vec![Disconnected, Connecting, Creating, Ready]);

	let sent = h.transport.sent();
	assert_eq!(sent.len(), 2);
	assert_eq!(sent[0], sent[1]);
}

#[tokio::test(start_paused = true)]
async fn failed_reconnections_keep_growing_the_counter() {
	let mut h = Harness::new();
	h.manager.create_new_session(pull()).await;
	h.transport.fail_next_connect();
	h.transport.fail_next_connect();

	h.transport.drop_connection();
	tokio::time::sleep(Duration::from_secs(10)).await;

	assert_eq!(h.transport.connects(), 4);
	assert_eq!(h.manager.status(), Ready);
	assert_eq!(h.manager.reconnect_attempts(), 0);
	assert!(h.reported().is_empty());
}

#[tokio::test(start_paused = true)]
async fn explicit_close_does_not_reconnect() {
	let mut h = Harness::new();
	h.manager.create_new_session(pull()).await;
	h.drain();

	h.manager.close().await.unwrap();
	tokio::time::sleep(Duration::from_secs(60)).await;

	assert_eq!(h.drain(), vec![Disconnected]);
	assert_eq!(h.transport.connects(), 1);
	assert_eq!(h.manager.reconnect_attempts(), 0);
}

#[tokio::test]
async fn close_without_connection_still_disconnects() {
	let mut h = Harness::new();
	h.manager
		.create_new_session(SessionDescriptor::Unsupported)
		.await;
	h.drain();

	h.manager.close().await.unwrap();

	assert_eq!(h.manager.status(), Disconnected);
	assert_eq!(h.drain(), vec![Disconnected]);
}

#[tokio::test(start_paused = true)]
async fn new_session_tears_down_the_old_one() {
	let mut h = Harness::new();
	h.manager.create_new_session(pull()).await;
	h.drain();

	let status = h
		.manager
		.create_new_session(SessionDescriptor::pull("acme", "widgets", 43))
		.await;
	tokio::time::sleep(Duration::from_secs(60)).await;

	assert_eq!(status, Ready);
	assert_eq!(h.drain(), vec![Disconnected, Connecting, Creating, Ready]);
	assert_eq!(h.transport.connects(), 2);
	assert_eq!(h.manager.descriptor(), Some(SessionDescriptor::pull("acme", "widgets", 43)));
}

#[tokio::test(start_paused = true)]
async fn new_session_cancels_scheduled_reconnection() {
	let h = Harness::new();
	h.manager.create_new_session(pull()).await;
	h.transport.drop_connection();
	assert_eq!(h.manager.reconnect_attempts(), 1);

	h.manager
		.create_new_session(SessionDescriptor::pull("acme", "widgets", 7))
		.await;
	assert_eq!(h.manager.reconnect_attempts(), 0);

	tokio::time::sleep(Duration::from_secs(60)).await;

	assert_eq!(h.transport.connects(), 2);
	assert_eq!(h.transport.sent()[1]["payload"]["pull_request_id"], 7);
}

#[tokio::test]
async fn outdated_timer_is_ignored() {
	let h = Harness::new();
	h.manager.create_new_session(pull()).await;
	h.transport.close().await.unwrap();

	h.manager.inner.reconnect_if_required(999).await;

	assert_eq!(h.transport.connects(), 1);
	assert_eq!(h.manager.status(), Disconnected);
}

#[tokio::test]
async fn queries_wait_for_ready() {
	let h = Harness::new();
	h.transport.hold_connect(true);
	h.transport.respond(Ok(json!({"session": "created"})));
	h.transport.respond(Ok(json!({"contents": "fn main()"})));

	let creating = tokio::spawn({
		let manager = h.manager.clone();
		async move { manager.create_new_session(pull()).await }
	});
	settle().await;

	assert_eq!(h.manager.status(), Connecting);
	let err = h
		.manager
		.get_hover(RepoSide::Head, "src/lib.rs", 10, 4)
		.await
		.unwrap_err();
	assert!(matches!(err, Error::NotReady { status: Connecting }));
	assert!(h.transport.sent().is_empty());

	h.transport.release.notify_one();
	assert_eq!(creating.await.unwrap(), Ready);

	let hover = h
		.manager
		.get_hover(RepoSide::Head, "src/lib.rs", 10, 4)
		.await
		.unwrap();

	assert_eq!(hover, json!({"contents": "fn main()"}));
	assert_eq!(
		h.transport.sent()[1],
		json!({
			"type": "session.hover",
			"payload": {"is_base_repo": "false", "location_id": "src/lib.rs#L10#C4"}
		})
	);
}

#[tokio::test]
async fn queries_before_any_session_fail() {
	let h = Harness::new();

	let err = h
		.manager
		.get_definition(RepoSide::Base, "a.rs", 1, 1)
		.await
		.unwrap_err();

	assert!(matches!(err, Error::NotReady { status: Disconnected }));
	assert_eq!(h.transport.connects(), 0);
}

#[tokio::test]
async fn references_and_definition_use_their_methods() {
	let h = Harness::new();
	h.manager.create_new_session(pull()).await;

	h.manager
		.get_references(RepoSide::Base, "src/a.rs", 3, 0)
		.await
		.unwrap();
	h.manager
		.get_definition(RepoSide::Head, "src/b.rs", 5, 9)
		.await
		.unwrap();

	let sent = h.transport.sent();
	assert_eq!(sent[1]["type"], "session.references");
	assert_eq!(sent[1]["payload"]["is_base_repo"], "true");
	assert_eq!(sent[1]["payload"]["location_id"], "src/a.rs#L3#C0");
	assert_eq!(sent[2]["type"], "session.definition");
	assert_eq!(sent[2]["payload"]["location_id"], "src/b.rs#L5#C9");
}

#[tokio::test]
async fn file_contents_echo_the_request() {
	let h = Harness::new();
	h.manager.create_new_session(pull()).await;
	h.transport.respond(Ok(json!("pub fn lib() {}")));

	let contents = h
		.manager
		.get_file_contents(RepoSide::Base, "src/lib.rs")
		.await
		.unwrap();

	assert_eq!(
		contents,
		FileContents {
			result: json!("pub fn lib() {}"),
			file_path: "src/lib.rs".to_string(),
			side: RepoSide::Base,
		}
	);
	assert_eq!(
		h.transport.sent()[1],
		json!({
			"type": "session.file_contents",
			"payload": {"is_base_repo": "true", "location_id": "src/lib.rs"}
		})
	);
}

#[tokio::test]
async fn query_errors_propagate() {
	let h = Harness::new();
	h.manager.create_new_session(pull()).await;
	h.transport.respond(Err(Error::remote(json!("No hover information"))));

	let err = h
		.manager
		.get_hover(RepoSide::Head, "src/lib.rs", 1, 1)
		.await
		.unwrap_err();

	assert_eq!(err.remote_message(), Some("No hover information"));
	assert!(h.manager.is_ready());
}

#[tokio::test]
async fn server_status_updates_drive_the_gate() {
	let mut h = Harness::new();
	h.manager.create_new_session(pull()).await;
	h.drain();

	h.transport
		.push_unsolicited(json!({"status_update": "error", "detail": "indexer crashed"}));
	assert_eq!(h.manager.status(), SessionStatus::Error);
	assert!(h
		.manager
		.get_hover(RepoSide::Head, "a.rs", 1, 1)
		.await
		.is_err());

	h.transport.push_unsolicited(json!({"status_update": "ready"}));
	assert!(h.manager.is_ready());

	h.transport.push_unsolicited(json!({"status_update": "rebooting"}));
	h.transport.push_unsolicited(json!({"something": "else"}));
	assert!(h.manager.is_ready());

	assert_eq!(h.drain(), vec![SessionStatus::Error, Ready]);
}

#[tokio::test(start_paused = true)]
async fn dropping_the_manager_cancels_reconnection() {
	let h = Harness::new();
	h.manager.create_new_session(pull()).await;
	h.transport.drop_connection();

	let transport = Arc::clone(&h.transport);
	drop(h);
	tokio::time::sleep(Duration::from_secs(60)).await;

	assert_eq!(transport.connects(), 1);
}
