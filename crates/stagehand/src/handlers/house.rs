//! Character data requests backed by the [`CharacterStore`].
//!
//! Store failures are answered with an internal-error acknowledgment; the
//! connection stays up and nothing else is touched.

use std::collections::BTreeMap;

use bytes::{Buf, BufMut, Bytes, BytesMut};
use stagehand_protocol::{Ack, AckHandle, CharId, Opcode, ProtocolError};
use stagehand_store::{CharacterField, CharacterStore, StoreError};

use crate::{ServerContext, StageSession, StagehandError};

/// House returned for a character that never saved one.
const EMPTY_HOUSE_LEN: usize = 20;
/// Zeroes in front of the house when viewing someone else's.
const VISITOR_HOUSE_PREFIX_LEN: usize = 219;
/// Trophy shelf returned for a character that never saved one.
const EMPTY_MYHOUSE_INFO_LEN: usize = 9;
/// Decoration preset body returned for a character that never saved one.
const EMPTY_DECO_MYSET_LEN: usize = 0x226;

/// Number of titles the client knows about.
const UNLOCKED_TITLES: u16 = 114;
/// `u16 id`, `u16 0`, `u32 acquired`, `u32 updated`.
const TITLE_RECORD_LEN: usize = 12;

/// One preset on the wire and in storage: `u16 index` + body.
const DECO_SET_BODY_LEN: usize = 76;
const DECO_SET_RECORD_LEN: usize = 2 + DECO_SET_BODY_LEN;

async fn load<S: CharacterStore>(
    ctx: &ServerContext<S>,
    char_id: CharId,
    field: CharacterField,
) -> Result<Option<Bytes>, StoreError> {
    ctx.store()
        .get(char_id, field)
        .await
        .map(|value| value.filter(|data| !data.is_empty()))
}

async fn store_failed(
    session: &StageSession,
    ack: AckHandle,
    err: StoreError,
) -> Result<(), StagehandError> {
    tracing::error!(char_id = %session.char_id(), %err, "character store failed");
    session.reply(Ack::internal_error(ack)).await
}

/// Sends the caller's own saved house. Asking on behalf of another
/// character gets a zeroed visitor header in front; the house itself is
/// always the caller's.
pub(super) async fn load_house<S: CharacterStore>(
    ctx: &ServerContext<S>,
    session: &StageSession,
    ack: AckHandle,
    visited: CharId,
) -> Result<(), StagehandError> {
    let house = match load(ctx, session.char_id(), CharacterField::House).await {
        Ok(house) => house.unwrap_or_else(|| Bytes::from(vec![0; EMPTY_HOUSE_LEN])),
        Err(err) => return store_failed(session, ack, err).await,
    };

    let body = if visited == session.char_id() {
        house
    } else {
        let mut buf = BytesMut::with_capacity(VISITOR_HOUSE_PREFIX_LEN + house.len());
        buf.put_bytes(0, VISITOR_HOUSE_PREFIX_LEN);
        buf.put_slice(&house);
        buf.freeze()
    };
    session.reply(Ack::buffer_success(ack, body)).await
}

pub(super) async fn enumerate_house<S: CharacterStore>(
    _ctx: &ServerContext<S>,
    session: &StageSession,
    ack: AckHandle,
) -> Result<(), StagehandError> {
    session.reply(Ack::simple_success(ack)).await
}

/// Lists every title as unlocked, none with acquisition times.
pub(super) async fn enumerate_title<S: CharacterStore>(
    _ctx: &ServerContext<S>,
    session: &StageSession,
    ack: AckHandle,
) -> Result<(), StagehandError> {
    let count = usize::from(UNLOCKED_TITLES);
    let mut buf = BytesMut::with_capacity(4 + count * TITLE_RECORD_LEN);
    buf.put_u16(UNLOCKED_TITLES);
    buf.put_u16(0);
    for title in 0..UNLOCKED_TITLES {
        buf.put_u16(title);
        buf.put_u16(0);
        // acquired, updated
        buf.put_u32(0);
        buf.put_u32(0);
    }
    session.reply(Ack::buffer_success(ack, buf.freeze())).await
}

pub(super) async fn update_interior<S: CharacterStore>(
    ctx: &ServerContext<S>,
    session: &StageSession,
    ack: AckHandle,
    data: Bytes,
) -> Result<(), StagehandError> {
    save(ctx, session, ack, CharacterField::House, data).await
}

pub(super) async fn get_myhouse_info<S: CharacterStore>(
    ctx: &ServerContext<S>,
    session: &StageSession,
    ack: AckHandle,
) -> Result<(), StagehandError> {
    match load(ctx, session.char_id(), CharacterField::Trophy).await {
        Ok(info) => {
            let info = info.unwrap_or_else(|| Bytes::from(vec![0; EMPTY_MYHOUSE_INFO_LEN]));
            session.reply(Ack::buffer_success(ack, info)).await
        }
        Err(err) => store_failed(session, ack, err).await,
    }
}

pub(super) async fn update_myhouse_info<S: CharacterStore>(
    ctx: &ServerContext<S>,
    session: &StageSession,
    ack: AckHandle,
    data: Bytes,
) -> Result<(), StagehandError> {
    save(ctx, session, ack, CharacterField::Trophy, data).await
}

pub(super) async fn load_deco_myset<S: CharacterStore>(
    ctx: &ServerContext<S>,
    session: &StageSession,
    ack: AckHandle,
) -> Result<(), StagehandError> {
    match load(ctx, session.char_id(), CharacterField::DecoMyset).await {
        Ok(Some(sets)) => session.reply(Ack::buffer_success(ack, sets)).await,
        Ok(None) => {
            // A leading 1 stops the client from prompting on every load.
            let mut body = vec![0; EMPTY_DECO_MYSET_LEN];
            body[0] = 1;
            session.reply(Ack::buffer_success(ack, body)).await
        }
        Err(err) => store_failed(session, ack, err).await,
    }
}

/// Merges the uploaded presets into the saved ones and stores the result.
pub(super) async fn save_deco_myset<S: CharacterStore>(
    ctx: &ServerContext<S>,
    session: &StageSession,
    ack: AckHandle,
    data: Bytes,
) -> Result<(), StagehandError> {
    let char_id = session.char_id();
    let saved = match load(ctx, char_id, CharacterField::DecoMyset).await {
        Ok(saved) => saved,
        Err(err) => return store_failed(session, ack, err).await,
    };
    let merged = match merge_deco_sets(saved.as_deref(), data) {
        Ok(merged) => merged,
        Err(err) => {
            tracing::warn!(%char_id, %err, "malformed decoration presets");
            return session.reply(Ack::simple_fail(ack)).await;
        }
    };
    save(ctx, session, ack, CharacterField::DecoMyset, merged).await
}

async fn save<S: CharacterStore>(
    ctx: &ServerContext<S>,
    session: &StageSession,
    ack: AckHandle,
    field: CharacterField,
    data: Bytes,
) -> Result<(), StagehandError> {
    match ctx.store().set(session.char_id(), field, data).await {
        Ok(()) => session.reply(Ack::simple_success(ack)).await,
        Err(err) => store_failed(session, ack, err).await,
    }
}

/// Applies an upload of decoration presets to the saved blob.
///
/// Upload: `u8` (ignored), `u8 count`, then `count` records of `u16 index`
/// + 76 bytes. Saved blob: `0x01`, `u8 count`, records sorted by index.
/// An uploaded record replaces the saved one with the same index or is
/// inserted in order.
pub(crate) fn merge_deco_sets(saved: Option<&[u8]>, mut upload: Bytes) -> Result<Bytes, ProtocolError> {
    let mut sets: BTreeMap<u16, Bytes> = BTreeMap::new();
    if let Some(saved) = saved {
        let count = saved.get(1).copied().unwrap_or(0) as usize;
        // Anything after the last whole record (e.g. a stray batch
        // terminator from an imported blob) is dropped.
        for record in saved.get(2..).unwrap_or_default().chunks_exact(DECO_SET_RECORD_LEN).take(count) {
            let index = u16::from_be_bytes([record[0], record[1]]);
            sets.insert(index, Bytes::copy_from_slice(record));
        }
    }

    let truncated = |needed: usize| ProtocolError::Truncated {
        opcode: Opcode::SaveDecoMyset.value(),
        needed,
    };
    if upload.remaining() < 2 {
        return Err(truncated(2 - upload.remaining()));
    }
    upload.advance(1);
    let count = upload.get_u8() as usize;
    for _ in 0..count {
        if upload.remaining() < DECO_SET_RECORD_LEN {
            return Err(truncated(DECO_SET_RECORD_LEN - upload.remaining()));
        }
        let record = upload.split_to(DECO_SET_RECORD_LEN);
        let index = u16::from_be_bytes([record[0], record[1]]);
        sets.insert(index, record);
    }

    let total = u8::try_from(sets.len()).map_err(|_| {
        ProtocolError::InvalidMessage(format!("{} decoration presets exceed 255", sets.len()))
    })?;
    let mut buf = BytesMut::with_capacity(2 + sets.len() * DECO_SET_RECORD_LEN);
    buf.put_u8(1);
    buf.put_u8(total);
    for record in sets.values() {
        buf.put_slice(record);
    }
    Ok(buf.freeze())
}
