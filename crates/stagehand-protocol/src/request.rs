//! Client-to-server requests.
//!
//! Inbound frames carry one or more requests back to back, optionally
//! terminated by [`Opcode::End`]. There is no per-message length, so every
//! request must be decoded field by field to find where the next begins.

use bytes::{Buf, Bytes};

use crate::frame::WireReader;
use crate::{AckHandle, BinaryKey, CharId, ObjectId, Opcode, Position, ProtocolError, StageId};

/// A decoded client request.
#[derive(Debug, Clone, PartialEq)]
pub enum Request {
    // -- Connection --
    /// First message on every connection.
    Login {
        ack: AckHandle,
        revision: u16,
        token: String,
    },

    // -- Stage lifecycle and navigation --
    CreateStage {
        ack: AckHandle,
        stage_id: StageId,
        capacity: u16,
    },
    EnterStage {
        ack: AckHandle,
        stage_id: StageId,
    },
    BackStage {
        ack: AckHandle,
    },
    MoveStage {
        ack: AckHandle,
        stage_id: StageId,
    },
    LeaveStage,
    LockStage {
        ack: AckHandle,
    },
    UnlockStage,

    // -- Reservations --
    ReserveStage {
        ack: AckHandle,
        stage_id: StageId,
        ready: u8,
    },
    UnreserveStage,
    SetStagePass {
        password: String,
    },

    // -- Stage binaries --
    SetStageBinary {
        stage_id: StageId,
        key: BinaryKey,
        data: Bytes,
    },
    GetStageBinary {
        ack: AckHandle,
        stage_id: StageId,
        key: BinaryKey,
    },
    WaitStageBinary {
        ack: AckHandle,
        stage_id: StageId,
        key: BinaryKey,
    },
    EnumerateStage {
        ack: AckHandle,
        prefix: String,
    },

    // -- Objects --
    CreateObject {
        ack: AckHandle,
        position: Position,
    },
    PositionObject {
        object_id: ObjectId,
        position: Position,
    },
    DeleteObject {
        object_id: ObjectId,
    },

    // -- User binaries --
    SetUserBinary {
        kind: u8,
        data: Bytes,
    },
    GetUserBinary {
        ack: AckHandle,
        char_id: CharId,
        kind: u8,
    },

    // -- Character data --
    LoadHouse {
        ack: AckHandle,
        char_id: CharId,
    },
    UpdateInterior {
        ack: AckHandle,
        data: Bytes,
    },
    GetMyhouseInfo {
        ack: AckHandle,
    },
    UpdateMyhouseInfo {
        ack: AckHandle,
        data: Bytes,
    },
    LoadDecoMyset {
        ack: AckHandle,
    },
    SaveDecoMyset {
        ack: AckHandle,
        data: Bytes,
    },
    EnumerateHouse {
        ack: AckHandle,
    },
    EnumerateTitle {
        ack: AckHandle,
    },
    AddAchievement {
        achievement_id: u8,
        unk1: u16,
        unk2: u16,
    },
}

impl Request {
    /// Decodes every request in an inbound frame.
    ///
    /// `End` markers are skipped wherever they appear. Decoding stops at the
    /// first error; requests before it are discarded with the rest because
    /// the connection is about to be closed anyway.
    pub fn decode_all(mut data: Bytes) -> Result<Vec<Self>, ProtocolError> {
        let mut requests = Vec::new();
        while data.remaining() >= 2 {
            let raw = data.get_u16();
            let opcode = Opcode::try_from(raw)?;
            if opcode == Opcode::End {
                continue;
            }
            requests.push(Self::decode_one(opcode, &mut data)?);
        }
        if data.has_remaining() {
            return Err(ProtocolError::InvalidMessage(format!(
                "{} trailing byte(s) after last request",
                data.remaining()
            )));
        }
        Ok(requests)
    }

    /// Returns the acknowledgment handle, for requests that expect a reply.
    pub fn ack_handle(&self) -> Option<AckHandle> {
        match self {
            Self::Login { ack, .. }
            | Self::CreateStage { ack, .. }
            | Self::EnterStage { ack, .. }
            | Self::BackStage { ack }
            | Self::MoveStage { ack, .. }
            | Self::LockStage { ack }
            | Self::ReserveStage { ack, .. }
            | Self::GetStageBinary { ack, .. }
            | Self::WaitStageBinary { ack, .. }
            | Self::EnumerateStage { ack, .. }
            | Self::CreateObject { ack, .. }
            | Self::GetUserBinary { ack, .. }
            | Self::LoadHouse { ack, .. }
            | Self::UpdateInterior { ack, .. }
            | Self::GetMyhouseInfo { ack }
            | Self::UpdateMyhouseInfo { ack, .. }
            | Self::LoadDecoMyset { ack }
            | Self::SaveDecoMyset { ack, .. }
            | Self::EnumerateHouse { ack }
            | Self::EnumerateTitle { ack } => Some(*ack),
            Self::LeaveStage
            | Self::UnlockStage
            | Self::UnreserveStage
            | Self::SetStagePass { .. }
            | Self::SetStageBinary { .. }
            | Self::PositionObject { .. }
            | Self::DeleteObject { .. }
            | Self::SetUserBinary { .. }
            | Self::AddAchievement { .. } => None,
        }
    }

    fn decode_one(opcode: Opcode, data: &mut Bytes) -> Result<Self, ProtocolError> {
        let mut r = WireReader::new(data, opcode);
        let request = match opcode {
            Opcode::Login => Self::Login {
                ack: AckHandle(r.u32()?),
                revision: r.u16()?,
                token: r.string()?,
            },
            Opcode::CreateStage => Self::CreateStage {
                ack: AckHandle(r.u32()?),
                capacity: u16::from(r.u8()?),
                stage_id: StageId::new(r.string()?),
            },
            Opcode::EnterStage => Self::EnterStage {
                ack: AckHandle(r.u32()?),
                stage_id: StageId::new(r.string()?),
            },
            Opcode::BackStage => Self::BackStage {
                ack: AckHandle(r.u32()?),
            },
            Opcode::MoveStage => Self::MoveStage {
                ack: AckHandle(r.u32()?),
                stage_id: StageId::new(r.string()?),
            },
            Opcode::LeaveStage => Self::LeaveStage,
            Opcode::LockStage => Self::LockStage {
                ack: AckHandle(r.u32()?),
            },
            Opcode::UnlockStage => Self::UnlockStage,
            Opcode::ReserveStage => Self::ReserveStage {
                ack: AckHandle(r.u32()?),
                ready: r.u8()?,
                stage_id: StageId::new(r.string()?),
            },
            Opcode::UnreserveStage => Self::UnreserveStage,
            Opcode::SetStagePass => Self::SetStagePass {
                password: r.string()?,
            },
            Opcode::SetStageBinary => Self::SetStageBinary {
                key: BinaryKey::new(r.u8()?, r.u8()?),
                stage_id: StageId::new(r.string()?),
                data: r.blob()?,
            },
            Opcode::GetStageBinary => Self::GetStageBinary {
                ack: AckHandle(r.u32()?),
                key: BinaryKey::new(r.u8()?, r.u8()?),
                stage_id: StageId::new(r.string()?),
            },
            Opcode::WaitStageBinary => Self::WaitStageBinary {
                ack: AckHandle(r.u32()?),
                key: BinaryKey::new(r.u8()?, r.u8()?),
                stage_id: StageId::new(r.string()?),
            },
            Opcode::EnumerateStage => Self::EnumerateStage {
                ack: AckHandle(r.u32()?),
                prefix: r.string()?,
            },
            Opcode::CreateObject => Self::CreateObject {
                ack: AckHandle(r.u32()?),
                position: Position::new(r.f32()?, r.f32()?, r.f32()?),
            },
            Opcode::PositionObject => Self::PositionObject {
                object_id: ObjectId(r.u32()?),
                position: Position::new(r.f32()?, r.f32()?, r.f32()?),
            },
            Opcode::DeleteObject => Self::DeleteObject {
                object_id: ObjectId(r.u32()?),
            },
            Opcode::SetUserBinary => Self::SetUserBinary {
                kind: r.u8()?,
                data: r.blob()?,
            },
            Opcode::GetUserBinary => Self::GetUserBinary {
                ack: AckHandle(r.u32()?),
                char_id: CharId(r.u32()?),
                kind: r.u8()?,
            },
            Opcode::LoadHouse => Self::LoadHouse {
                ack: AckHandle(r.u32()?),
                char_id: CharId(r.u32()?),
            },
            Opcode::UpdateInterior => Self::UpdateInterior {
                ack: AckHandle(r.u32()?),
                data: r.blob()?,
            },
            Opcode::GetMyhouseInfo => Self::GetMyhouseInfo {
                ack: AckHandle(r.u32()?),
            },
            Opcode::UpdateMyhouseInfo => Self::UpdateMyhouseInfo {
                ack: AckHandle(r.u32()?),
                data: r.blob()?,
            },
            Opcode::LoadDecoMyset => Self::LoadDecoMyset {
                ack: AckHandle(r.u32()?),
            },
            Opcode::SaveDecoMyset => Self::SaveDecoMyset {
                ack: AckHandle(r.u32()?),
                data: r.blob()?,
            },
            Opcode::EnumerateHouse => Self::EnumerateHouse {
                ack: AckHandle(r.u32()?),
            },
            Opcode::EnumerateTitle => Self::EnumerateTitle {
                ack: AckHandle(r.u32()?),
            },
            Opcode::AddAchievement => Self::AddAchievement {
                achievement_id: r.u8()?,
                unk1: r.u16()?,
                unk2: r.u16()?,
            },
            Opcode::End
            | Opcode::Ack
            | Opcode::StageDestruct
            | Opcode::DuplicateObject
            | Opcode::CleanupObject
            | Opcode::InsertUser
            | Opcode::DeleteUser
            | Opcode::NotifyUserBinary => {
                return Err(ProtocolError::UnexpectedOpcode(opcode.value()));
            }
        };
        Ok(request)
    }
}

#[cfg(test)]
mod tests {
    use bytes::{BufMut, BytesMut};

    use super::*;

    fn put_string(buf: &mut BytesMut, s: &str) {
        buf.put_u8(s.len() as u8 + 1);
        buf.put_slice(s.as_bytes());
        buf.put_u8(0);
    }

    #[test]
    fn test_decode_all_enter_stage() {
        let mut buf = BytesMut::new();
        buf.put_u16(Opcode::EnterStage.value());
        buf.put_u32(77);
        put_string(&mut buf, "sl1Ns200p0a0u0");
        buf.put_u16(Opcode::End.value());

        let requests = Request::decode_all(buf.freeze()).unwrap();

        assert_eq!(
            requests,
            vec![Request::EnterStage {
                ack: AckHandle(77),
                stage_id: StageId::new("sl1Ns200p0a0u0"),
            }]
        );
    }

    #[test]
    fn test_decode_all_multiple_requests_in_one_frame() {
        let mut buf = BytesMut::new();
        buf.put_u16(Opcode::LockStage.value());
        buf.put_u32(1);
        buf.put_u16(Opcode::UnreserveStage.value());
        buf.put_u16(Opcode::SetStageBinary.value());
        buf.put_u8(1);
        buf.put_u8(12);
        put_string(&mut buf, "sl1Qs001p0a0u0");
        buf.put_u16(3);
        buf.put_slice(&[0xAA, 0xBB, 0xCC]);

        let requests = Request::decode_all(buf.freeze()).unwrap();

        assert_eq!(requests.len(), 3);
        assert_eq!(requests[0], Request::LockStage { ack: AckHandle(1) });
        assert_eq!(requests[1], Request::UnreserveStage);
        assert!(matches!(
            &requests[2],
            Request::SetStageBinary { key, data, .. }
                if *key == BinaryKey::new(1, 12) && data.as_ref() == [0xAA, 0xBB, 0xCC]
        ));
    }

    #[test]
    fn test_decode_all_truncated_payload_returns_error() {
        let mut buf = BytesMut::new();
        buf.put_u16(Opcode::CreateObject.value());
        buf.put_u32(1);
        buf.put_f32(1.0);

        let result = Request::decode_all(buf.freeze());
        assert!(matches!(result, Err(ProtocolError::Truncated { .. })));
    }

    #[test]
    fn test_decode_all_server_only_opcode_returns_error() {
        let mut buf = BytesMut::new();
        buf.put_u16(Opcode::Ack.value());

        let result = Request::decode_all(buf.freeze());
        assert!(matches!(result, Err(ProtocolError::UnexpectedOpcode(0x0012))));
    }

    #[test]
    fn test_decode_all_add_achievement_has_no_ack() {
        let mut buf = BytesMut::new();
        buf.put_u16(Opcode::AddAchievement.value());
        buf.put_u8(3);
        buf.put_u16(10);
        buf.put_u16(20);

        let requests = Request::decode_all(buf.freeze()).unwrap();

        assert_eq!(requests[0].ack_handle(), None);
        assert_eq!(
            requests[0],
            Request::AddAchievement { achievement_id: 3, unk1: 10, unk2: 20 }
        );
    }

    #[test]
    fn test_decode_all_enumerate_title_carries_ack() {
        let mut buf = BytesMut::new();
        buf.put_u16(Opcode::EnumerateTitle.value());
        buf.put_u32(0x0A0B_0C0D);
        buf.put_u16(Opcode::EnumerateHouse.value());
        buf.put_u32(2);

        let requests = Request::decode_all(buf.freeze()).unwrap();

        assert_eq!(requests[0], Request::EnumerateTitle { ack: AckHandle(0x0A0B_0C0D) });
        assert_eq!(requests[1].ack_handle(), Some(AckHandle(2)));
    }

    #[test]
    fn test_decode_all_odd_trailing_byte_returns_error() {
        let mut buf = BytesMut::new();
        buf.put_u16(Opcode::UnlockStage.value());
        buf.put_u8(0);

        assert!(Request::decode_all(buf.freeze()).is_err());
    }
}
