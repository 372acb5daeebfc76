//! Collaborator seams for the synchronization core.
//!
//! The core never talks to the network directly. It sees two abstract
//! collaborators: a persistence transport for individual field writes and a
//! connector that opens change-notification streams. Production code
//! implements these over HTTP and WebSocket; tests substitute scripted
//! in-memory versions.

use std::sync::Arc;

use async_trait::async_trait;

use shared::{ApiError, SessionId};

/// Issues individual field writes against a session resource.
///
/// One call writes one named field (e.g. `"prompt"`) carrying a
/// `{"value": <string>}` payload. Calls are idempotent in intent and carry
/// no retry logic; the caller decides what a failed write means.
#[async_trait]
pub trait PersistenceTransport: Send + Sync {
    async fn write_field(
        &self,
        session_id: &SessionId,
        field: &str,
        value: &str,
    ) -> Result<(), ApiError>;
}

#[async_trait]
impl<T> PersistenceTransport for Arc<T>
where
    T: PersistenceTransport + ?Sized,
{
    async fn write_field(
        &self,
        session_id: &SessionId,
        field: &str,
        value: &str,
    ) -> Result<(), ApiError> {
        (**self).write_field(session_id, field, value).await
    }
}

/// A live change-notification stream scoped to one session.
///
/// Dropping the stream closes the underlying connection.
#[async_trait]
pub trait ChangeStream: Send {
    /// The next inbound notification, in arrival order.
    ///
    /// `None` means the stream closed. An `Err` is a transport-level
    /// failure; the monitor treats it exactly like a close.
    async fn next(&mut self) -> Option<Result<String, ApiError>>;
}

/// Opens change streams. The monitor calls `connect` once per
/// (re)connection attempt.
#[async_trait]
pub trait ChangeStreamConnector: Send + Sync + 'static {
    type Stream: ChangeStream;

    async fn connect(&self, session_id: &SessionId) -> Result<Self::Stream, ApiError>;
}
