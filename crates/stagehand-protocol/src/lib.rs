//! Wire protocol for Stagehand.
//!
//! This crate defines the binary "language" that clients and the server
//! speak:
//!
//! - **Types** ([`CharId`], [`StageId`], [`ObjectId`], [`BinaryKey`], etc.):
//!   the identifiers and values that travel on the wire.
//! - **Opcodes** ([`Opcode`]): the 2-byte tag in front of every message.
//! - **Packets** ([`Packet`] trait, [`Ack`], [`DuplicateObject`], etc.):
//!   server-to-client messages that render themselves per recipient.
//! - **Requests** ([`Request`]): decoded client-to-server messages.
//! - **Framing** ([`encode`], [`Batch`]): header writing and batch
//!   termination with [`Opcode::End`].
//! - **Errors** ([`ProtocolError`]): malformed or unexpected input.
//!
//! # Architecture
//!
//! The protocol layer sits between transport (raw bytes) and the stage and
//! session layers. It doesn't know about connections or stages; it only
//! knows how to turn bytes into requests and packets into bytes.
//!
//! ```text
//! Transport (bytes) → Protocol (Request / Packet) → Server (handlers)
//! ```

// ---------------------------------------------------------------------------
// Module declarations
// ---------------------------------------------------------------------------

mod context;
mod error;
pub mod frame;
mod opcode;
mod packet;
mod request;
mod types;

// ---------------------------------------------------------------------------
// Re-exports
// ---------------------------------------------------------------------------

pub use context::ClientContext;
pub use error::ProtocolError;
pub use frame::{Batch, encode};
pub use opcode::Opcode;
pub use packet::{
    Ack, AckBody, AckStatus, CleanupObject, DeleteObject, DeleteUser, DuplicateObject,
    InsertUser, NotifyUserBinary, Packet, PositionObject, StageDestruct,
};
pub use request::Request;
pub use types::{AckHandle, BinaryKey, CharId, ObjectId, Position, StageId};
