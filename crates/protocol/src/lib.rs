//! Wire types for the codelens analysis session protocol.
//!
//! Everything that crosses the socket lives here so the runtime and any
//! server-side test harness agree on field names:
//!
//! - [`SessionDescriptor`] - what kind of analysis session to create
//! - [`SessionStatus`] - caller-visible session state, also sent by the server
//!   in `status_update` notifications
//! - [`ClientRequest`] and its payloads - request envelopes sent by the client
//! - [`location_id`] - the `<path>#L<line>#C<char>` location format

pub mod descriptor;
pub mod request;
pub mod status;

pub use descriptor::{RepoSide, SessionDescriptor};
pub use request::{ClientRequest, CreateSessionPayload, Method, QueryPayload, StatusUpdate, location_id};
pub use status::{SessionStatus, UnknownStatus};
