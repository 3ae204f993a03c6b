//! Stage lifecycle requests that don't move the session.

use bytes::{BufMut, Bytes, BytesMut};
use stagehand_protocol::{Ack, AckHandle, StageId};
use stagehand_stage::StageInfo;
use stagehand_store::CharacterStore;

use crate::{ServerContext, StageSession, StagehandError};

/// Password-protected marker in an enumeration entry.
const LOCKED_FLAG: u8 = 3;

pub(super) async fn create<S: CharacterStore>(
    ctx: &ServerContext<S>,
    session: &StageSession,
    ack: AckHandle,
    stage_id: StageId,
    capacity: u16,
) -> Result<(), StagehandError> {
    match ctx.registry().create(&stage_id, capacity).await {
        Ok(_) => session.reply(Ack::simple_success(ack)).await,
        Err(err) => {
            tracing::debug!(char_id = %session.char_id(), %err, "create stage refused");
            session.reply(Ack::simple_fail(ack)).await
        }
    }
}

pub(super) async fn lock(session: &StageSession, ack: AckHandle) -> Result<(), StagehandError> {
    session.reply(Ack::simple_success(ack)).await
}

/// Lists the occupied quest and personal-room stages. The requested
/// prefix is not applied; every enumerable stage is returned.
pub(super) async fn enumerate<S: CharacterStore>(
    ctx: &ServerContext<S>,
    session: &StageSession,
    ack: AckHandle,
    prefix: &str,
) -> Result<(), StagehandError> {
    let stages = ctx.registry().enumerate().await;
    tracing::debug!(char_id = %session.char_id(), prefix, count = stages.len(), "enumerate stages");
    session
        .reply(Ack::buffer_success(ack, encode_stage_list(&stages)))
        .await
}

/// Encodes the enumeration reply body.
///
/// `u16 count`, then per stage: `u16 reserved`, `u16 0`, `u8 0`,
/// `u8 has_members`, `u16 capacity`, `u8 locked`, `u8 len`, id bytes.
/// Stages whose id does not fit the length byte are left out, and the list
/// stops at `u16::MAX` entries.
fn encode_stage_list(stages: &[StageInfo]) -> Bytes {
    let mut buf = BytesMut::with_capacity(2 + stages.len() * 24);
    buf.put_u16(0);
    let mut count: u16 = 0;
    for info in stages {
        if count == u16::MAX {
            tracing::warn!(skipped = stages.len() - usize::from(count), "stage list truncated");
            break;
        }
        let id = info.id.as_str().as_bytes();
        let Ok(id_len) = u8::try_from(id.len()) else {
            tracing::warn!(stage_id = %info.id, len = id.len(), "stage id too long to list");
            continue;
        };
        let reservations = u16::try_from(info.reservations).unwrap_or_else(|_| {
            tracing::warn!(stage_id = %info.id, reservations = info.reservations, "reservation count clamped");
            u16::MAX
        });
        buf.put_u16(reservations);
        buf.put_u16(0);
        buf.put_u8(0);
        buf.put_u8(u8::from(info.members > 0));
        buf.put_u16(info.capacity);
        buf.put_u8(if info.has_password { LOCKED_FLAG } else { 0 });
        buf.put_u8(id_len);
        buf.put_slice(id);
        count += 1;
    }
    buf[..2].copy_from_slice(&count.to_be_bytes());
    buf.freeze()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_stage_list_empty_is_zero_count() {
        assert_eq!(&encode_stage_list(&[])[..], &[0, 0]);
    }

    #[test]
    fn test_encode_stage_list_entry_layout() {
        let info = StageInfo {
            id: StageId::new("sl1Qs001p0a0u0"),
            reservations: 2,
            members: 1,
            capacity: 4,
            has_password: true,
        };

        let bytes = encode_stage_list(&[info]);

        assert_eq!(&bytes[0..2], &[0, 1]);
        assert_eq!(&bytes[2..4], &[0, 2], "reserved");
        assert_eq!(&bytes[4..7], &[0, 0, 0]);
        assert_eq!(bytes[7], 1, "has members");
        assert_eq!(&bytes[8..10], &[0, 4], "capacity");
        assert_eq!(bytes[10], LOCKED_FLAG);
        assert_eq!(bytes[11], 14);
        assert_eq!(&bytes[12..], b"sl1Qs001p0a0u0");
    }

    #[test]
    fn test_encode_stage_list_overlong_id_is_skipped() {
        let long = StageInfo {
            id: StageId::new("Qs".repeat(200)),
            reservations: 1,
            members: 1,
            capacity: 4,
            has_password: false,
        };
        let short = StageInfo {
            id: StageId::new("sl1Qs001p0a0u0"),
            reservations: 0,
            members: 1,
            capacity: 4,
            has_password: false,
        };

        let bytes = encode_stage_list(&[long, short]);

        assert_eq!(&bytes[0..2], &[0, 1]);
        assert_eq!(bytes[11], 14);
        assert_eq!(&bytes[12..], b"sl1Qs001p0a0u0");
    }

    #[test]
    fn test_encode_stage_list_reserved_only_stage_has_no_members_flag() {
        let info = StageInfo {
            id: StageId::new("sl2Ms001p0a0u0"),
            reservations: 1,
            members: 0,
            capacity: 4,
            has_password: false,
        };

        let bytes = encode_stage_list(&[info]);

        assert_eq!(bytes[7], 0);
        assert_eq!(bytes[10], 0);
    }
}
