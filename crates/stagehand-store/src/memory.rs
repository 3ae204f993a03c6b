//! In-process [`CharacterStore`].

use std::collections::HashMap;

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use stagehand_protocol::CharId;
use tokio::sync::RwLock;

use crate::{CharacterField, CharacterStore, StoreError};

/// Limits for [`InMemoryStore`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Largest value accepted by `set`, in bytes.
    pub max_value_len: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            max_value_len: 64 * 1024,
        }
    }
}

/// Keeps every field in a map. Contents are lost on restart.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    values: RwLock<HashMap<(CharId, CharacterField), Bytes>>,
    config: StoreConfig,
}

impl InMemoryStore {
    /// Creates an empty store with default limits.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an empty store with the given limits.
    pub fn with_config(config: StoreConfig) -> Self {
        Self {
            values: RwLock::default(),
            config,
        }
    }

    /// Number of stored values across all characters.
    pub async fn len(&self) -> usize {
        self.values.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.values.read().await.is_empty()
    }
}

impl CharacterStore for InMemoryStore {
    async fn get(&self, char_id: CharId, field: CharacterField) -> Result<Option<Bytes>, StoreError> {
        Ok(self.values.read().await.get(&(char_id, field)).cloned())
    }

    async fn set(&self, char_id: CharId, field: CharacterField, data: Bytes) -> Result<(), StoreError> {
        if data.len() > self.config.max_value_len {
            return Err(StoreError::Rejected {
                char_id,
                field,
                reason: format!("{} bytes exceeds limit of {}", data.len(), self.config.max_value_len),
            });
        }
        tracing::debug!(%char_id, %field, len = data.len(), "character field stored");
        self.values.write().await.insert((char_id, field), data);
        Ok(())
    }
}
