//! Server-to-client messages.
//!
//! The server only needs to *build* these; it never parses them. Each one
//! knows its opcode and how to write its payload, which is everything the
//! broadcast engine needs to fan a message out.

use bytes::{BufMut, BytesMut};

use crate::{AckHandle, CharId, ClientContext, ObjectId, Opcode, Position};

/// A message that can render itself into a frame.
///
/// `build` writes the payload only; the opcode header is written by the
/// framing helpers in [`frame`](crate::frame).
pub trait Packet: Send + Sync {
    /// The opcode written in front of the payload.
    fn opcode(&self) -> Opcode;

    /// Appends the payload for a recipient with the given context.
    fn build(&self, buf: &mut BytesMut, ctx: &ClientContext);
}

// ---------------------------------------------------------------------------
// Object messages
// ---------------------------------------------------------------------------

/// Tells a client to discard every object it knows about.
#[derive(Debug, Clone, Copy, Default)]
pub struct CleanupObject;

impl Packet for CleanupObject {
    fn opcode(&self) -> Opcode {
        Opcode::CleanupObject
    }

    fn build(&self, _buf: &mut BytesMut, _ctx: &ClientContext) {}
}

/// Describes a live object so the recipient can spawn a copy of it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DuplicateObject {
    pub object_id: ObjectId,
    pub position: Position,
    pub owner: CharId,
}

impl Packet for DuplicateObject {
    fn opcode(&self) -> Opcode {
        Opcode::DuplicateObject
    }

    fn build(&self, buf: &mut BytesMut, _ctx: &ClientContext) {
        buf.put_u32(self.object_id.0);
        put_position(buf, self.position);
        buf.put_u32(0);
        buf.put_u32(self.owner.0);
    }
}

/// Removes one object.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeleteObject {
    pub object_id: ObjectId,
}

impl Packet for DeleteObject {
    fn opcode(&self) -> Opcode {
        Opcode::DeleteObject
    }

    fn build(&self, buf: &mut BytesMut, _ctx: &ClientContext) {
        buf.put_u32(self.object_id.0);
    }
}

/// Moves one object.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PositionObject {
    pub object_id: ObjectId,
    pub position: Position,
}

impl Packet for PositionObject {
    fn opcode(&self) -> Opcode {
        Opcode::PositionObject
    }

    fn build(&self, buf: &mut BytesMut, _ctx: &ClientContext) {
        buf.put_u32(self.object_id.0);
        put_position(buf, self.position);
    }
}

// ---------------------------------------------------------------------------
// Stage and user messages
// ---------------------------------------------------------------------------

/// The stage the recipient reserved no longer exists.
#[derive(Debug, Clone, Copy, Default)]
pub struct StageDestruct;

impl Packet for StageDestruct {
    fn opcode(&self) -> Opcode {
        Opcode::StageDestruct
    }

    fn build(&self, _buf: &mut BytesMut, _ctx: &ClientContext) {}
}

/// Adds a character to the recipient's roster.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InsertUser {
    pub char_id: CharId,
}

impl Packet for InsertUser {
    fn opcode(&self) -> Opcode {
        Opcode::InsertUser
    }

    fn build(&self, buf: &mut BytesMut, _ctx: &ClientContext) {
        buf.put_u32(self.char_id.0);
    }
}

/// Removes a character from the recipient's roster.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeleteUser {
    pub char_id: CharId,
}

impl Packet for DeleteUser {
    fn opcode(&self) -> Opcode {
        Opcode::DeleteUser
    }

    fn build(&self, buf: &mut BytesMut, _ctx: &ClientContext) {
        buf.put_u32(self.char_id.0);
    }
}

/// One of a character's binary parts changed; the recipient should fetch it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NotifyUserBinary {
    pub char_id: CharId,
    pub kind: u8,
}

impl Packet for NotifyUserBinary {
    fn opcode(&self) -> Opcode {
        Opcode::NotifyUserBinary
    }

    fn build(&self, buf: &mut BytesMut, _ctx: &ClientContext) {
        buf.put_u32(self.char_id.0);
        buf.put_u8(self.kind);
    }
}

// ---------------------------------------------------------------------------
// Acknowledgments
// ---------------------------------------------------------------------------

/// Outcome carried in an acknowledgment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum AckStatus {
    Success = 0,
    Fail = 1,
    /// A collaborator (e.g. the character store) failed; the request had no
    /// effect.
    InternalError = 2,
}

/// Body of an acknowledgment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AckBody {
    /// Fixed 4-byte body.
    Simple([u8; 4]),
    /// Variable-length payload.
    Buffer(bytes::Bytes),
}

/// The reply to a request that carried an [`AckHandle`].
///
/// Layout: `u32 handle`, `u8 is_buffer`, `u8 status`, then either the 4
/// simple bytes or a `u16` length (escaped as `0xFFFF` + `u32` for large
/// payloads) followed by the buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ack {
    pub handle: AckHandle,
    pub status: AckStatus,
    pub body: AckBody,
}

impl Ack {
    /// Simple-Success with a zeroed body.
    pub fn simple_success(handle: AckHandle) -> Self {
        Self {
            handle,
            status: AckStatus::Success,
            body: AckBody::Simple([0; 4]),
        }
    }

    /// Simple-Fail with a zeroed body.
    pub fn simple_fail(handle: AckHandle) -> Self {
        Self {
            handle,
            status: AckStatus::Fail,
            body: AckBody::Simple([0; 4]),
        }
    }

    /// Buffer-Success carrying `data`.
    pub fn buffer_success(handle: AckHandle, data: impl Into<bytes::Bytes>) -> Self {
        Self {
            handle,
            status: AckStatus::Success,
            body: AckBody::Buffer(data.into()),
        }
    }

    /// Internal-error reply for collaborator failures.
    pub fn internal_error(handle: AckHandle) -> Self {
        Self {
            handle,
            status: AckStatus::InternalError,
            body: AckBody::Simple([0; 4]),
        }
    }
}

/// Buffer lengths at or above this value use the extended `u32` length.
const EXTENDED_LENGTH_MARKER: u16 = 0xFFFF;

impl Packet for Ack {
    fn opcode(&self) -> Opcode {
        Opcode::Ack
    }

    fn build(&self, buf: &mut BytesMut, _ctx: &ClientContext) {
        buf.put_u32(self.handle.0);
        match &self.body {
            AckBody::Simple(body) => {
                buf.put_u8(0);
                buf.put_u8(self.status as u8);
                buf.put_slice(body);
            }
            AckBody::Buffer(data) => {
                buf.put_u8(1);
                buf.put_u8(self.status as u8);
                match u16::try_from(data.len()) {
                    Ok(len) if len < EXTENDED_LENGTH_MARKER => buf.put_u16(len),
                    _ => {
                        buf.put_u16(EXTENDED_LENGTH_MARKER);
                        buf.put_u32(data.len() as u32);
                    }
                }
                buf.put_slice(data);
            }
        }
    }
}

fn put_position(buf: &mut BytesMut, position: Position) {
    buf.put_f32(position.x);
    buf.put_f32(position.y);
    buf.put_f32(position.z);
}
