//! Per-character user binaries.
//!
//! Each character uploads three opaque parts (name card, appearance, and
//! equipment blobs as far as the server cares, just bytes). Other clients
//! fetch them when a character is announced. The table is server-wide
//! because a character's parts outlive any one stage visit.

use std::collections::HashMap;

use bytes::Bytes;
use stagehand_protocol::CharId;
use tokio::sync::RwLock;

use crate::SessionError;

/// Lowest valid part index.
pub const FIRST_USER_BINARY: u8 = 1;
/// Highest valid part index.
pub const LAST_USER_BINARY: u8 = 3;

/// Part 2 served for a character that hasn't uploaded one.
static DEFAULT_PART_2: &[u8] = include_bytes!("../assets/default_part2.bin");
/// Part 3 served for a character that hasn't uploaded one.
static DEFAULT_PART_3: &[u8] = include_bytes!("../assets/default_part3.bin");

/// Server-wide `(character, part)` → bytes table.
#[derive(Debug, Default)]
pub struct UserBinaryStore {
    parts: RwLock<HashMap<(CharId, u8), Bytes>>,
}

impl UserBinaryStore {
    /// Creates an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores one part, replacing any previous upload.
    ///
    /// Returns `true` if all three parts are present after the write.
    ///
    /// # Errors
    /// [`SessionError::InvalidBinaryIndex`] for indices outside `1..=3`.
    pub async fn set(&self, char_id: CharId, index: u8, data: Bytes) -> Result<bool, SessionError> {
        check_index(index)?;
        let mut parts = self.parts.write().await;
        parts.insert((char_id, index), data);
        Ok((FIRST_USER_BINARY..=LAST_USER_BINARY).all(|i| parts.contains_key(&(char_id, i))))
    }

    /// Returns the stored part, if uploaded.
    pub async fn get(&self, char_id: CharId, index: u8) -> Option<Bytes> {
        self.parts.read().await.get(&(char_id, index)).cloned()
    }

    /// Returns `char_id`'s stored part or the placeholder clients expect
    /// for a character that hasn't uploaded it yet.
    ///
    /// The placeholder for part 1 is the NUL-terminated text `CID<n>`,
    /// where `n` is the *requesting* character. Parts 2 and 3 fall back to
    /// fixed blank records the client accepts; any other index yields
    /// nothing.
    pub async fn get_or_placeholder(&self, char_id: CharId, index: u8, requester: CharId) -> Bytes {
        if let Some(data) = self.get(char_id, index).await {
            return data;
        }
        match index {
            1 => Bytes::from(format!("CID{}\0", requester.0)),
            2 => Bytes::from_static(DEFAULT_PART_2),
            3 => Bytes::from_static(DEFAULT_PART_3),
            _ => Bytes::new(),
        }
    }

    /// Drops every part belonging to `char_id`.
    pub async fn remove_character(&self, char_id: CharId) {
        self.parts.write().await.retain(|(owner, _), _| *owner != char_id);
    }
}

fn check_index(index: u8) -> Result<(), SessionError> {
    if (FIRST_USER_BINARY..=LAST_USER_BINARY).contains(&index) {
        Ok(())
    } else {
        Err(SessionError::InvalidBinaryIndex(index))
    }
}
