//! Per-stage binary blobs and their publish/wait rendezvous.
//!
//! Blobs are opaque bytes a host uploads for other clients to fetch back
//! verbatim. Each key has its own [`Notify`], created on first wait, so a
//! publish only wakes tasks waiting on that key.

use std::collections::HashMap;
use std::sync::Arc;

use bytes::Bytes;
use stagehand_protocol::BinaryKey;
use tokio::sync::Notify;

/// Key whose fetch is answered with a fixed payload when nothing has been
/// published. The payload is believed to carry the hunter count.
pub const HUNTER_COUNT_KEY: BinaryKey = BinaryKey::new(1, 12);

const HUNTER_COUNT_PAYLOAD: [u8; 8] = [0x04, 0, 0, 0, 0, 0, 0, 0];

/// Second tag byte of a server-generated binary that is served empty.
pub const SERVER_GENERATED_KIND: u8 = 4;

/// Key → bytes map with per-key wakeups. Last write wins.
#[derive(Debug, Default)]
pub struct BlobStore {
    blobs: HashMap<BinaryKey, Bytes>,
    notifiers: HashMap<BinaryKey, Arc<Notify>>,
}

impl BlobStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Publishes `data` under `key` and wakes every waiter on that key.
    pub fn set(&mut self, key: BinaryKey, data: Bytes) {
        self.blobs.insert(key, data);
        if let Some(notify) = self.notifiers.get(&key) {
            notify.notify_waiters();
        }
    }

    /// The published value, if any.
    pub fn get(&self, key: BinaryKey) -> Option<Bytes> {
        self.blobs.get(&key).cloned()
    }

    /// The notifier for `key`, created on first use.
    pub fn notifier(&mut self, key: BinaryKey) -> Arc<Notify> {
        Arc::clone(self.notifiers.entry(key).or_default())
    }

    pub fn len(&self) -> usize {
        self.blobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blobs.is_empty()
    }
}

/// Fixed payload served for `key` when nothing was published, if any.
pub fn canned_payload(key: BinaryKey) -> Option<Bytes> {
    if key == HUNTER_COUNT_KEY {
        Some(Bytes::from_static(&HUNTER_COUNT_PAYLOAD))
    } else if key.kind == SERVER_GENERATED_KIND {
        Some(Bytes::new())
    } else {
        None
    }
}
