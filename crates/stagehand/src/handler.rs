//! Per-connection handler: login, reader and writer tasks, request loop.
//!
//! Each accepted connection gets its own Tokio task running this handler.
//! The flow is:
//!   1. Receive Login → authenticate → register in the directory
//!   2. Spawn a writer draining the session's outbound queue
//!   3. Spawn a reader feeding frames into a bounded inbound queue
//!   4. Loop: decode frames → dispatch requests one at a time
//!   5. Depart: leave the stage, release the reservation, unregister
//!
//! The reader keeps watching the socket while a request is blocked in a
//! binary wait, so a disconnect is noticed and cancels the wait.

use std::sync::Arc;

use bytes::Bytes;
use stagehand_protocol::{Ack, AckHandle, ClientContext, ProtocolError, Request, encode};
use stagehand_session::{Authenticator, SessionHandle, SessionId};
use stagehand_store::CharacterStore;
use stagehand_transport::{Connection, WebSocketConnection};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio_util::sync::CancellationToken;

use crate::{ServerContext, StageSession, StagehandError, dispatch};

/// A logged-in session plus whatever followed `Login` in the first frame.
struct Accepted {
    handle: Arc<SessionHandle>,
    outbound: mpsc::Receiver<Bytes>,
    pending: Vec<Request>,
}

/// Handles a single connection from accept to close.
pub(crate) async fn handle_connection<A, S>(
    conn: WebSocketConnection,
    ctx: Arc<ServerContext<S>>,
    auth: Arc<A>,
) -> Result<(), StagehandError>
where
    A: Authenticator,
    S: CharacterStore,
{
    let conn = Arc::new(conn);
    let conn_id = conn.id();
    tracing::debug!(%conn_id, "handling new connection");

    let Accepted {
        handle,
        outbound,
        pending,
    } = match login(&conn, &ctx, auth.as_ref()).await {
        Ok(accepted) => accepted,
        Err(e) => {
            let _ = conn.close().await;
            return Err(e);
        }
    };
    let char_id = handle.char_id();
    let cancel = handle.cancel_token().clone();

    let writer = tokio::spawn(write_loop(Arc::clone(&conn), outbound, cancel.clone()));
    let (inbound_tx, mut inbound) = mpsc::channel(ctx.config().inbound_queue_capacity.max(1));
    let reader = tokio::spawn(read_loop(Arc::clone(&conn), inbound_tx, cancel));

    let mut session = StageSession::new(handle);
    let result = serve(&ctx, &mut session, pending, &mut inbound).await;
    if let Err(e) = &result {
        tracing::warn!(%conn_id, %char_id, error = %e, "closing connection");
    }

    session.depart(&ctx).await;
    reader.abort();
    let _ = writer.await;
    let _ = conn.close().await;
    tracing::debug!(%conn_id, %char_id, "connection closed");
    result
}

/// Receives and validates the `Login` request.
///
/// On success the login acknowledgment is already queued on the new
/// session's outbound queue.
async fn login<A, S>(
    conn: &WebSocketConnection,
    ctx: &ServerContext<S>,
    auth: &A,
) -> Result<Accepted, StagehandError>
where
    A: Authenticator,
    S: CharacterStore,
{
    let conn_id = conn.id();
    let frame = match tokio::time::timeout(ctx.config().login_timeout, conn.recv()).await {
        Ok(Ok(Some(frame))) => frame,
        Ok(Ok(None)) => {
            return Err(ProtocolError::InvalidMessage("connection closed before login".into()).into());
        }
        Ok(Err(e)) => return Err(e.into()),
        Err(_) => {
            return Err(ProtocolError::InvalidMessage("login timed out".into()).into());
        }
    };

    let mut requests = Request::decode_all(frame)?.into_iter();
    let (ack, revision, token) = match requests.next() {
        Some(Request::Login {
            ack,
            revision,
            token,
        }) => (ack, revision, token),
        Some(other) => {
            return Err(ProtocolError::InvalidMessage(format!(
                "first request must be Login, got {other:?}"
            ))
            .into());
        }
        None => {
            return Err(ProtocolError::InvalidMessage("empty login frame".into()).into());
        }
    };

    let char_id = match auth.authenticate(&token).await {
        Ok(char_id) => char_id,
        Err(e) => {
            reject(conn, ack).await;
            return Err(e.into());
        }
    };

    let (handle, outbound) = SessionHandle::channel(
        SessionId(conn_id.into_inner()),
        char_id,
        ClientContext::new(revision),
        &ctx.config().session,
    );
    // Queued before registering so a failed registration leaves nothing
    // to undo.
    handle.send_packet(&Ack::simple_success(ack)).await?;
    if let Err(e) = ctx.directory().register(Arc::clone(&handle)).await {
        reject(conn, ack).await;
        return Err(e.into());
    }

    tracing::info!(%conn_id, %char_id, revision, "character logged in");
    Ok(Accepted {
        handle,
        outbound,
        pending: requests.collect(),
    })
}

/// Answers a refused login directly; there is no writer yet.
async fn reject(conn: &WebSocketConnection, ack: AckHandle) {
    let frame = encode(&Ack::simple_fail(ack), &ClientContext::default());
    if let Err(e) = conn.send(frame).await {
        tracing::debug!(conn_id = %conn.id(), error = %e, "failed to send login rejection");
    }
}

/// Dispatches requests until the session is cancelled or the inbound queue
/// closes.
async fn serve<S: CharacterStore>(
    ctx: &ServerContext<S>,
    session: &mut StageSession,
    pending: Vec<Request>,
    inbound: &mut mpsc::Receiver<Bytes>,
) -> Result<(), StagehandError> {
    for request in pending {
        dispatch(ctx, session, request).await?;
    }

    let cancel = session.handle().cancel_token().clone();
    loop {
        let frame = tokio::select! {
            biased;
            () = cancel.cancelled() => return Ok(()),
            frame = inbound.recv() => match frame {
                Some(frame) => frame,
                None => return Ok(()),
            },
        };
        for request in Request::decode_all(frame)? {
            dispatch(ctx, session, request).await?;
        }
    }
}

/// Drains the outbound queue onto the socket.
async fn write_loop(
    conn: Arc<WebSocketConnection>,
    mut outbound: mpsc::Receiver<Bytes>,
    cancel: CancellationToken,
) {
    loop {
        let frame = tokio::select! {
            biased;
            frame = outbound.recv() => match frame {
                Some(frame) => frame,
                None => break,
            },
            () = cancel.cancelled() => break,
        };
        if let Err(e) = conn.send(frame).await {
            tracing::debug!(conn_id = %conn.id(), error = %e, "send failed");
            break;
        }
    }
    cancel.cancel();
}

/// Moves frames from the socket into the inbound queue.
///
/// A client that outruns its request loop by a full queue is disconnected.
async fn read_loop(
    conn: Arc<WebSocketConnection>,
    inbound: mpsc::Sender<Bytes>,
    cancel: CancellationToken,
) {
    let conn_id = conn.id();
    loop {
        let received = tokio::select! {
            () = cancel.cancelled() => return,
            received = conn.recv() => received,
        };
        match received {
            Ok(Some(frame)) => match inbound.try_send(frame) {
                Ok(()) => {}
                Err(TrySendError::Full(_)) => {
                    tracing::warn!(%conn_id, "inbound queue full, disconnecting");
                    break;
                }
                Err(TrySendError::Closed(_)) => break,
            },
            Ok(None) => {
                tracing::debug!(%conn_id, "connection closed by peer");
                break;
            }
            Err(e) => {
                tracing::debug!(%conn_id, error = %e, "recv error");
                break;
            }
        }
    }
    cancel.cancel();
}
