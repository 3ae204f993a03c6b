//! Error types for the stage layer.

use stagehand_protocol::{BinaryKey, CharId, ObjectId, StageId};

/// Errors that can occur during stage and registry operations.
///
/// All of these are recoverable: the request that caused one is answered
/// with a failure acknowledgment and the connection stays up.
#[derive(Debug, thiserror::Error)]
pub enum StageError {
    /// `create` for an identifier that is already registered.
    #[error("stage {0} already exists")]
    AlreadyExists(StageId),

    /// The stage is not in the registry.
    #[error("stage {0} not found")]
    StageNotFound(StageId),

    /// The stage was removed from the registry; it can't be joined any
    /// more.
    #[error("stage {0} is closed")]
    Closed(StageId),

    /// The supplied password doesn't match the stage's.
    #[error("wrong password for stage {0}")]
    WrongPassword(StageId),

    /// Every reservation slot is taken.
    #[error("stage {0} is full")]
    Full(StageId),

    /// All object IDs of the stage are in use.
    #[error("no free object ids in stage {0}")]
    AllocatorExhausted(StageId),

    /// No binary has been published under this key.
    #[error("no binary {key} in stage {stage}")]
    NotFound {
        /// Stage that was queried.
        stage: StageId,
        /// Key that was queried.
        key: BinaryKey,
    },

    /// No live object has this identifier.
    #[error("object {0} not found")]
    ObjectNotFound(ObjectId),

    /// Only a character holding a reservation may change the password.
    #[error("{0} is not a host of this stage")]
    NotHost(CharId),

    /// The waiting session disconnected.
    #[error("wait cancelled")]
    Cancelled,
}
