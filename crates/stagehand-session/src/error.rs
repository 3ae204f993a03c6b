//! Error types for the session layer.

use stagehand_protocol::CharId;

/// Errors that can occur during session management.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// The login token was rejected by the
    /// [`Authenticator`](crate::Authenticator).
    #[error("authentication failed: {0}")]
    AuthFailed(String),

    /// The character already has a live session. A character can only be
    /// logged in once.
    #[error("character {0} already has an active session")]
    AlreadyConnected(CharId),

    /// The session's outbound queue is gone; its writer task has exited.
    #[error("outbound queue closed for {0}")]
    Closed(CharId),

    /// `BackStage` with nothing to go back to.
    #[error("navigation stack is empty")]
    EmptyMoveStack,

    /// User binaries are indexed 1 through 3.
    #[error("user binary index {0} out of range")]
    InvalidBinaryIndex(u8),
}
