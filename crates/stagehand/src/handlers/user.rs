//! User binary uploads and fetches.
//!
//! A character is announced server-wide (`InsertUser`) the moment its
//! third part arrives. Later uploads only tell others which part changed.

use bytes::Bytes;
use stagehand_protocol::{Ack, AckHandle, CharId, InsertUser, NotifyUserBinary};
use stagehand_store::CharacterStore;

use crate::{ServerContext, StageSession, StagehandError};

pub(super) async fn set<S: CharacterStore>(
    ctx: &ServerContext<S>,
    session: &StageSession,
    kind: u8,
    data: Bytes,
) {
    let char_id = session.char_id();
    let complete = match ctx.user_binaries().set(char_id, kind, data).await {
        Ok(complete) => complete,
        Err(err) => {
            tracing::warn!(%char_id, %err, "user binary dropped");
            return;
        }
    };

    let handle = session.handle();
    if !handle.is_binaries_done() {
        if complete && handle.mark_binaries_done() {
            tracing::info!(%char_id, "user binaries complete");
            ctx.directory()
                .broadcast(&InsertUser { char_id }, Some(char_id))
                .await;
        }
        return;
    }
    ctx.directory()
        .broadcast(&NotifyUserBinary { char_id, kind }, Some(char_id))
        .await;
}

pub(super) async fn get<S: CharacterStore>(
    ctx: &ServerContext<S>,
    session: &StageSession,
    ack: AckHandle,
    char_id: CharId,
    kind: u8,
) -> Result<(), StagehandError> {
    let data = ctx
        .user_binaries()
        .get_or_placeholder(char_id, kind, session.char_id())
        .await;
    session.reply(Ack::buffer_success(ack, data)).await
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use stagehand_protocol::{ClientContext, Opcode};
    use stagehand_session::{SessionConfig, SessionHandle, SessionId};
    use stagehand_store::InMemoryStore;
    use tokio::sync::mpsc;

    use super::*;
    use crate::ServerConfig;

    async fn connect(
        ctx: &ServerContext<InMemoryStore>,
        id: u32,
    ) -> (StageSession, mpsc::Receiver<Bytes>) {
        let (handle, rx) = SessionHandle::channel(
            SessionId(u64::from(id)),
            CharId(id),
            ClientContext::default(),
            &SessionConfig::default(),
        );
        ctx.directory().register(Arc::clone(&handle)).await.unwrap();
        (StageSession::new(handle), rx)
    }

    fn opcode(frame: &Bytes) -> u16 {
        u16::from_be_bytes([frame[0], frame[1]])
    }

    #[tokio::test]
    async fn test_set_third_part_announces_character_once() {
        let ctx = ServerContext::new(ServerConfig::default(), InMemoryStore::new());
        let (me, _rx) = connect(&ctx, 1).await;
        let (_peer, mut peer_rx) = connect(&ctx, 2).await;

        set(&ctx, &me, 1, Bytes::from_static(b"name")).await;
        set(&ctx, &me, 2, Bytes::from_static(b"look")).await;
        assert!(peer_rx.try_recv().is_err(), "nothing until complete");

        set(&ctx, &me, 3, Bytes::from_static(b"gear")).await;
        let frame = peer_rx.try_recv().unwrap();
        assert_eq!(opcode(&frame), Opcode::InsertUser.value());
        assert!(me.handle().is_binaries_done());

        set(&ctx, &me, 2, Bytes::from_static(b"new look")).await;
        let frame = peer_rx.try_recv().unwrap();
        assert_eq!(opcode(&frame), Opcode::NotifyUserBinary.value());
        assert_eq!(&frame[2..], &[0, 0, 0, 1, 2]);
    }

    #[tokio::test]
    async fn test_set_invalid_index_is_dropped() {
        let ctx = ServerContext::new(ServerConfig::default(), InMemoryStore::new());
        let (me, _rx) = connect(&ctx, 1).await;

        set(&ctx, &me, 7, Bytes::from_static(b"x")).await;

        assert!(ctx.user_binaries().get(CharId(1), 7).await.is_none());
    }

    #[tokio::test]
    async fn test_get_unknown_character_placeholder_names_requester() {
        let ctx = ServerContext::new(ServerConfig::default(), InMemoryStore::new());
        let (me, mut rx) = connect(&ctx, 1).await;

        get(&ctx, &me, AckHandle(3), CharId(77), 1).await.unwrap();

        let frame = rx.try_recv().unwrap();
        assert_eq!(&frame[10..], b"CID1\0");
    }

    #[tokio::test]
    async fn test_get_uploaded_part_returns_owners_data() {
        let ctx = ServerContext::new(ServerConfig::default(), InMemoryStore::new());
        let (me, mut rx) = connect(&ctx, 1).await;
        ctx.user_binaries()
            .set(CharId(77), 1, Bytes::from_static(b"Hunter\0"))
            .await
            .unwrap();

        get(&ctx, &me, AckHandle(4), CharId(77), 1).await.unwrap();

        assert_eq!(&rx.try_recv().unwrap()[10..], b"Hunter\0");
    }
}
