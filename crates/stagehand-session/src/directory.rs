//! The session directory: every logged-in character on this server.
//!
//! Stages only know their own members. Anything that has to reach a
//! character regardless of where it stands (reservation teardown,
//! server-wide user announcements, hub introductions) goes through the
//! directory.

use std::collections::HashMap;
use std::sync::Arc;

use stagehand_protocol::{CharId, Packet};
use tokio::sync::RwLock;

use crate::{SessionError, SessionHandle, SessionId, broadcast};

/// Server-wide map from character to live session.
///
/// The lock is only held for map access; sends happen on a snapshot.
#[derive(Debug, Default)]
pub struct SessionDirectory {
    sessions: RwLock<HashMap<CharId, Arc<SessionHandle>>>,
}

impl SessionDirectory {
    /// Creates an empty directory.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a freshly logged-in session.
    ///
    /// # Errors
    /// [`SessionError::AlreadyConnected`] if the character already has a
    /// live session.
    pub async fn register(&self, session: Arc<SessionHandle>) -> Result<(), SessionError> {
        let char_id = session.char_id();
        let mut sessions = self.sessions.write().await;
        if sessions.contains_key(&char_id) {
            return Err(SessionError::AlreadyConnected(char_id));
        }
        tracing::info!(%char_id, session_id = %session.id(), "session registered");
        sessions.insert(char_id, session);
        Ok(())
    }

    /// Removes `char_id` if it is still owned by `session_id`.
    ///
    /// A stale departure must not unregister a newer login of the same
    /// character.
    pub async fn unregister(&self, char_id: CharId, session_id: SessionId) -> Option<Arc<SessionHandle>> {
        let mut sessions = self.sessions.write().await;
        match sessions.get(&char_id) {
            Some(existing) if existing.id() == session_id => {
                tracing::info!(%char_id, %session_id, "session unregistered");
                sessions.remove(&char_id)
            }
            _ => None,
        }
    }

    /// Looks up the live session for a character.
    pub async fn find(&self, char_id: CharId) -> Option<Arc<SessionHandle>> {
        self.sessions.read().await.get(&char_id).cloned()
    }

    /// Snapshot of every session except `exclude` whose user binaries are
    /// complete.
    pub async fn ready_peers(&self, exclude: CharId) -> Vec<Arc<SessionHandle>> {
        self.sessions
            .read()
            .await
            .values()
            .filter(|s| s.char_id() != exclude && s.is_binaries_done())
            .cloned()
            .collect()
    }

    /// Snapshot of every registered session.
    pub async fn snapshot(&self) -> Vec<Arc<SessionHandle>> {
        self.sessions.read().await.values().cloned().collect()
    }

    /// Sends `packet` to every registered session except `exclude`.
    pub async fn broadcast<P>(&self, packet: &P, exclude: Option<CharId>) -> usize
    where
        P: Packet + ?Sized,
    {
        let recipients = self.snapshot().await;
        broadcast::fan_out(&recipients, packet, exclude)
    }

    /// Number of registered sessions.
    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    /// Returns `true` if nobody is logged in.
    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;
    use stagehand_protocol::{ClientContext, InsertUser};
    use tokio::sync::mpsc;

    use super::*;
    use crate::SessionConfig;

    fn session(session_id: u64, char_id: u32) -> (Arc<SessionHandle>, mpsc::Receiver<Bytes>) {
        SessionHandle::channel(
            SessionId(session_id),
            CharId(char_id),
            ClientContext::default(),
            &SessionConfig::default(),
        )
    }

    #[tokio::test]
    async fn test_register_duplicate_character_fails() {
        let dir = SessionDirectory::new();
        let (first, _rx1) = session(1, 7);
        let (second, _rx2) = session(2, 7);

        dir.register(first).await.unwrap();
        let result = dir.register(second).await;

        assert!(matches!(result, Err(SessionError::AlreadyConnected(CharId(7)))));
        assert_eq!(dir.len().await, 1);
    }

    #[tokio::test]
    async fn test_unregister_stale_session_keeps_current() {
        let dir = SessionDirectory::new();
        let (current, _rx) = session(2, 7);
        dir.register(current).await.unwrap();

        assert!(dir.unregister(CharId(7), SessionId(1)).await.is_none());
        assert!(dir.find(CharId(7)).await.is_some());

        assert!(dir.unregister(CharId(7), SessionId(2)).await.is_some());
        assert!(dir.is_empty().await);
    }

    #[tokio::test]
    async fn test_ready_peers_filters_incomplete_and_self() {
        let dir = SessionDirectory::new();
        let (me, _rx1) = session(1, 1);
        let (ready, _rx2) = session(2, 2);
        let (pending, _rx3) = session(3, 3);
        me.mark_binaries_done();
        ready.mark_binaries_done();
        for s in [me, ready, pending] {
            dir.register(s).await.unwrap();
        }

        let peers = dir.ready_peers(CharId(1)).await;

        assert_eq!(peers.len(), 1);
        assert_eq!(peers[0].char_id(), CharId(2));
    }

    #[tokio::test]
    async fn test_broadcast_excludes_sender() {
        let dir = SessionDirectory::new();
        let (a, mut rx_a) = session(1, 1);
        let (b, mut rx_b) = session(2, 2);
        dir.register(a).await.unwrap();
        dir.register(b).await.unwrap();

        let delivered = dir
            .broadcast(&InsertUser { char_id: CharId(1) }, Some(CharId(1)))
            .await;

        assert_eq!(delivered, 1);
        assert!(rx_a.try_recv().is_err());
        assert!(rx_b.try_recv().is_ok());
    }
}
