//! Unified error type for the Stagehand server.

use stagehand_protocol::ProtocolError;
use stagehand_session::SessionError;
use stagehand_stage::StageError;
use stagehand_store::StoreError;
use stagehand_transport::TransportError;

/// Top-level error that wraps all crate-specific errors.
///
/// The `#[from]` attribute on each variant generates the `From` impls, so
/// `?` converts sub-crate errors automatically. Most stage and store
/// errors never get this far: handlers answer them with a failure
/// acknowledgment. What reaches a connection task as a `StagehandError`
/// ends that connection.
#[derive(Debug, thiserror::Error)]
pub enum StagehandError {
    /// A transport-level error (bind, accept, send, recv).
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// The peer broke the protocol.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// A session-level error (auth, duplicate login, closed queue).
    #[error(transparent)]
    Session(#[from] SessionError),

    /// A stage-level error that could not be answered in-band.
    #[error(transparent)]
    Stage(#[from] StageError),

    /// A character store error that could not be answered in-band.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// The configuration file could not be read.
    #[error("failed to read config: {0}")]
    ConfigIo(#[from] std::io::Error),

    /// The configuration file is not valid JSON for [`ServerConfig`](crate::ServerConfig).
    #[error("invalid config: {0}")]
    ConfigParse(#[from] serde_json::Error),
}
