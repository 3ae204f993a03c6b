//! Session types: the server's record of one logged-in connection.
//!
//! A [`SessionHandle`] is what every other layer holds when it needs to
//! talk to a client. Stages keep handles for their members, the directory
//! keeps one per character, and broadcasts render a message once per
//! handle using that handle's [`ClientContext`].
//!
//! The handle never touches the socket. Frames go into a bounded queue that
//! the connection's writer task drains, so a slow client can only ever fill
//! its own queue.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use stagehand_protocol::{CharId, ClientContext, Packet, encode};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::SessionError;

// ---------------------------------------------------------------------------
// SessionConfig
// ---------------------------------------------------------------------------

/// Configuration for per-session resources.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Frames that may wait in a session's outbound queue before
    /// broadcasts to it start being dropped.
    pub outbound_queue_capacity: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            outbound_queue_capacity: 64,
        }
    }
}

// ---------------------------------------------------------------------------
// SessionId
// ---------------------------------------------------------------------------

/// Identifies one connection's session, independent of the character.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionId(pub u64);

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sess-{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// SessionHandle
// ---------------------------------------------------------------------------

/// Shared handle to a logged-in session.
///
/// Cheap to share behind an `Arc`; all mutable state is atomic or lives in
/// the queue and cancellation token, which are already thread-safe.
#[derive(Debug)]
pub struct SessionHandle {
    id: SessionId,
    char_id: CharId,
    context: ClientContext,
    outbound: mpsc::Sender<Bytes>,
    binaries_done: AtomicBool,
    cancel: CancellationToken,
}

impl SessionHandle {
    /// Creates a handle around an existing queue and token.
    pub fn new(
        id: SessionId,
        char_id: CharId,
        context: ClientContext,
        outbound: mpsc::Sender<Bytes>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            id,
            char_id,
            context,
            outbound,
            binaries_done: AtomicBool::new(false),
            cancel,
        }
    }

    /// Creates a handle with a fresh queue sized by `config`, returning the
    /// receiving end for the writer task.
    pub fn channel(
        id: SessionId,
        char_id: CharId,
        context: ClientContext,
        config: &SessionConfig,
    ) -> (Arc<Self>, mpsc::Receiver<Bytes>) {
        let (tx, rx) = mpsc::channel(config.outbound_queue_capacity.max(1));
        let handle = Self::new(id, char_id, context, tx, CancellationToken::new());
        (Arc::new(handle), rx)
    }

    /// Returns the session identifier.
    pub fn id(&self) -> SessionId {
        self.id
    }

    /// Returns the character this session acts as.
    pub fn char_id(&self) -> CharId {
        self.char_id
    }

    /// Returns the rendering context for this session's client.
    pub fn context(&self) -> &ClientContext {
        &self.context
    }

    /// Token cancelled when the connection goes away.
    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Cancels every wait tied to this session.
    pub fn disconnect(&self) {
        self.cancel.cancel();
    }

    /// Returns `true` once [`disconnect`](Self::disconnect) has been called.
    pub fn is_disconnected(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Returns `true` once all three user binary parts have been uploaded.
    pub fn is_binaries_done(&self) -> bool {
        self.binaries_done.load(Ordering::Acquire)
    }

    /// Marks the user binaries as complete. Returns `true` only for the
    /// call that flipped the flag.
    pub fn mark_binaries_done(&self) -> bool {
        !self.binaries_done.swap(true, Ordering::AcqRel)
    }

    // -- Outbound ----------------------------------------------------------

    /// Queues a frame, waiting for room if the queue is full.
    ///
    /// Used for replies to this session's own requests, which must not be
    /// lost.
    pub async fn send(&self, frame: Bytes) -> Result<(), SessionError> {
        self.outbound
            .send(frame)
            .await
            .map_err(|_| SessionError::Closed(self.char_id))
    }

    /// Renders `packet` for this session and queues it.
    pub async fn send_packet<P: Packet + ?Sized>(&self, packet: &P) -> Result<(), SessionError> {
        self.send(encode(packet, &self.context)).await
    }

    /// Queues a frame without waiting. A full queue drops the frame.
    ///
    /// Returns `true` if the frame was queued. Used for fan-out, where one
    /// slow recipient must not stall the sender.
    pub fn try_send(&self, frame: Bytes) -> bool {
        match self.outbound.try_send(frame) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(_)) => {
                tracing::warn!(
                    session_id = %self.id,
                    char_id = %self.char_id,
                    "outbound queue full, dropping frame"
                );
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                tracing::debug!(session_id = %self.id, "outbound queue closed, dropping frame");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use stagehand_protocol::{InsertUser, StageDestruct};

    use super::*;

    fn handle_with_capacity(capacity: usize) -> (Arc<SessionHandle>, mpsc::Receiver<Bytes>) {
        SessionHandle::channel(
            SessionId(1),
            CharId(10),
            ClientContext::default(),
            &SessionConfig {
                outbound_queue_capacity: capacity,
            },
        )
    }

    #[tokio::test]
    async fn test_send_packet_renders_header_and_payload() {
        let (handle, mut rx) = handle_with_capacity(4);

        handle
            .send_packet(&InsertUser { char_id: CharId(3) })
            .await
            .unwrap();

        let frame = rx.recv().await.unwrap();
        assert_eq!(&frame[..], &[0x00, 0x40, 0, 0, 0, 3]);
    }

    #[tokio::test]
    async fn test_try_send_full_queue_drops_frame() {
        let (handle, mut rx) = handle_with_capacity(1);
        let frame = encode(&StageDestruct, handle.context());

        assert!(handle.try_send(frame.clone()));
        assert!(!handle.try_send(frame.clone()), "second frame should be dropped");

        assert_eq!(rx.recv().await.unwrap(), frame);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_send_after_receiver_dropped_returns_closed() {
        let (handle, rx) = handle_with_capacity(1);
        drop(rx);

        let result = handle.send(Bytes::new()).await;
        assert!(matches!(result, Err(SessionError::Closed(CharId(10)))));
    }

    #[test]
    fn test_mark_binaries_done_reports_first_transition_only() {
        let (handle, _rx) = handle_with_capacity(1);
        assert!(!handle.is_binaries_done());

        assert!(handle.mark_binaries_done());
        assert!(!handle.mark_binaries_done());
        assert!(handle.is_binaries_done());
    }

    #[test]
    fn test_disconnect_cancels_token() {
        let (handle, _rx) = handle_with_capacity(1);
        let token = handle.cancel_token().clone();

        handle.disconnect();

        assert!(token.is_cancelled());
        assert!(handle.is_disconnected());
    }
}
