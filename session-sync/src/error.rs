//! Error types for session-sync

use shared::{ApiError, SessionId};

/// Errors surfaced by the session controller.
///
/// Transport-level connectivity loss never appears here; the connection
/// monitor recovers from it silently and reports it as state. Dropped
/// best-effort field writes do not appear either; the queue logs and
/// discards them.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error("no session is currently open")]
    NoOpenSession,

    #[error("session {0} no longer exists on the server")]
    SessionGone(SessionId),

    #[error(transparent)]
    Api(#[from] ApiError),
}
