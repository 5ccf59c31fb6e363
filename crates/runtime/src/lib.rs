//! Codelens Runtime - Session lifecycle, transport, and request correlation
//!
//! This crate keeps one client session with the language-analysis service
//! alive and exposes code-intelligence queries on top of it:
//!
//! - **Transport**: One WebSocket connection, opened with a per-connection token
//! - **Connection**: Request/response correlation by numeric `id`
//! - **Session**: Status state machine, failure classification, and
//!   randomized exponential backoff reconnection
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────┐
//! │   codelens-cli   │  Command line front end
//! └────────┬─────────┘
//!          │ create_new_session / get_*
//! ┌────────▼─────────┐
//! │ codelens-runtime │  This crate
//! │  ┌────────────┐  │
//! │  │  Session   │  │  Status, gating, reconnection
//! │  └────────────┘  │
//! │  ┌────────────┐  │
//! │  │ Transport  │  │  WebSocket, close events, listener
//! │  └────────────┘  │
//! │  ┌────────────┐  │
//! │  │ Connection │  │  id correlation
//! │  └────────────┘  │
//! └──────────────────┘
//! ```
//!
//! # Decoupling via Transport
//!
//! The [`SessionManager`] only sees the [`Transport`] trait, so the state
//! machine can be driven by an in-memory transport in tests and by
//! [`WebSocketTransport`] in production.

pub mod config;
pub mod connection;
pub mod error;
pub mod session;
pub mod transport;

// Re-export key types at crate root
pub use codelens_protocol::{RepoSide, SessionDescriptor, SessionStatus};
pub use config::{SessionConfig, session_socket_url};
pub use error::{Error, Result};
pub use session::{
	ChannelSink, ErrorReporter, FileContents, SessionManager, SessionManagerBuilder, StaticToken, StatusSink, TokenSource,
	TracingReporter, backoff_delay, classify_creation_error,
};
pub use transport::{CloseEvent, CloseHandler, MessageListener, Transport, WebSocketTransport};
