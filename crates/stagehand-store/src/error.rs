//! Error types for the persistence layer.

use stagehand_protocol::CharId;

use crate::CharacterField;

/// Errors a [`CharacterStore`](crate::CharacterStore) can report.
///
/// Handlers turn any of these into an internal-error acknowledgment; they
/// never take the connection down.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The backing store could not be reached.
    #[error("character store unavailable: {0}")]
    Unavailable(String),

    /// The character has no row in the store.
    #[error("character {0} not found")]
    UnknownCharacter(CharId),

    /// The write was refused, e.g. because the value is too large.
    #[error("rejected write of {field} for {char_id}: {reason}")]
    Rejected {
        char_id: CharId,
        field: CharacterField,
        reason: String,
    },
}
