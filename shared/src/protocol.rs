/// Payload the server broadcasts on a session's change stream. The content
/// carries no detail; receivers refetch the session to see what changed.
pub const CHANGE_NOTIFICATION: &str = "changed";
