//! Character data persistence for Stagehand.
//!
//! The server stores a handful of per-character blobs (house interior,
//! trophies, decoration presets) without interpreting them. Where they live is not the server's business: it talks to a
//! [`CharacterStore`], and this crate ships [`InMemoryStore`] for tests and
//! standalone runs.

mod error;
mod memory;

pub use error::StoreError;
pub use memory::{InMemoryStore, StoreConfig};

use std::fmt;

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use stagehand_protocol::CharId;

/// One opaque per-character value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CharacterField {
    /// House interior: furniture layout, wallpaper, floor.
    House,
    /// Trophy shelf shown by "my house" info.
    Trophy,
    /// Saved decoration presets.
    DecoMyset,
}

impl fmt::Display for CharacterField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::House => "house",
            Self::Trophy => "trophy",
            Self::DecoMyset => "decomyset",
        };
        f.write_str(name)
    }
}

/// Durable key/value storage for character blobs.
///
/// `get` returns `Ok(None)` for a field that was never written, which
/// handlers answer with a default payload.
pub trait CharacterStore: Send + Sync + 'static {
    /// Reads one field.
    fn get(
        &self,
        char_id: CharId,
        field: CharacterField,
    ) -> impl std::future::Future<Output = Result<Option<Bytes>, StoreError>> + Send;

    /// Overwrites one field.
    fn set(
        &self,
        char_id: CharId,
        field: CharacterField,
        data: Bytes,
    ) -> impl std::future::Future<Output = Result<(), StoreError>> + Send;
}
