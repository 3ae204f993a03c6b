//! Framing: opcode headers, batches, and bounds-checked field reads.
//!
//! ```text
//! single:  [opcode u16][payload]
//! batch:   [opcode u16][payload][opcode u16][payload]...[0x0010]
//! ```

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::{ClientContext, Opcode, Packet, ProtocolError};

/// Renders one message, header included, for a single recipient.
pub fn encode<P: Packet + ?Sized>(packet: &P, ctx: &ClientContext) -> Bytes {
    let mut buf = BytesMut::with_capacity(16);
    buf.put_u16(packet.opcode().value());
    packet.build(&mut buf, ctx);
    buf.freeze()
}

/// Several messages concatenated into one outbound payload.
///
/// The batch is terminated with [`Opcode::End`] by [`finish`](Self::finish),
/// which yields nothing for an empty batch; clients must never receive a
/// bare terminator.
#[derive(Debug, Default)]
pub struct Batch {
    buf: BytesMut,
    count: usize,
}

impl Batch {
    /// Creates an empty batch.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends one message rendered for `ctx`.
    pub fn push<P: Packet + ?Sized>(&mut self, packet: &P, ctx: &ClientContext) {
        self.buf.put_u16(packet.opcode().value());
        packet.build(&mut self.buf, ctx);
        self.count += 1;
    }

    /// Number of messages pushed so far.
    pub fn len(&self) -> usize {
        self.count
    }

    /// Returns `true` if nothing has been pushed.
    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Terminates the batch. Returns `None` if it is empty.
    pub fn finish(mut self) -> Option<Bytes> {
        if self.count == 0 {
            return None;
        }
        self.buf.put_u16(Opcode::End.value());
        Some(self.buf.freeze())
    }
}

/// Bounds-checked reader over one inbound payload.
///
/// `bytes::Buf` getters panic on underflow; a malformed client frame must
/// surface as [`ProtocolError::Truncated`] instead.
pub(crate) struct WireReader<'a> {
    buf: &'a mut Bytes,
    opcode: u16,
}

impl<'a> WireReader<'a> {
    pub(crate) fn new(buf: &'a mut Bytes, opcode: Opcode) -> Self {
        Self {
            buf,
            opcode: opcode.value(),
        }
    }

    fn need(&self, n: usize) -> Result<(), ProtocolError> {
        if self.buf.remaining() < n {
            return Err(ProtocolError::Truncated {
                opcode: self.opcode,
                needed: n - self.buf.remaining(),
            });
        }
        Ok(())
    }

    pub(crate) fn u8(&mut self) -> Result<u8, ProtocolError> {
        self.need(1)?;
        Ok(self.buf.get_u8())
    }

    pub(crate) fn u16(&mut self) -> Result<u16, ProtocolError> {
        self.need(2)?;
        Ok(self.buf.get_u16())
    }

    pub(crate) fn u32(&mut self) -> Result<u32, ProtocolError> {
        self.need(4)?;
        Ok(self.buf.get_u32())
    }

    pub(crate) fn f32(&mut self) -> Result<f32, ProtocolError> {
        self.need(4)?;
        Ok(self.buf.get_f32())
    }

    pub(crate) fn bytes(&mut self, len: usize) -> Result<Bytes, ProtocolError> {
        self.need(len)?;
        Ok(self.buf.split_to(len))
    }

    /// A `u16` length followed by that many bytes.
    pub(crate) fn blob(&mut self) -> Result<Bytes, ProtocolError> {
        let len = self.u16()? as usize;
        self.bytes(len)
    }

    /// A `u8` length followed by UTF-8 text; trailing NULs are dropped.
    pub(crate) fn string(&mut self) -> Result<String, ProtocolError> {
        let len = self.u8()? as usize;
        let raw = self.bytes(len)?;
        let trimmed = match raw.iter().rposition(|b| *b != 0) {
            Some(last) => &raw[..=last],
            None => &raw[..0],
        };
        std::str::from_utf8(trimmed)
            .map(str::to_owned)
            .map_err(|_| ProtocolError::InvalidString(self.opcode))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{CharId, InsertUser, StageDestruct};

    #[test]
    fn test_encode_writes_big_endian_opcode_header() {
        let bytes = encode(&InsertUser { char_id: CharId(5) }, &ClientContext::default());
        assert_eq!(&bytes[..], &[0x00, 0x40, 0, 0, 0, 5]);
    }

    #[test]
    fn test_batch_finish_appends_end_sentinel() {
        let ctx = ClientContext::default();
        let mut batch = Batch::new();
        batch.push(&StageDestruct, &ctx);
        batch.push(&StageDestruct, &ctx);

        let bytes = batch.finish().expect("non-empty batch");
        assert_eq!(&bytes[..], &[0x00, 0x21, 0x00, 0x21, 0x00, 0x10]);
    }

    #[test]
    fn test_batch_finish_empty_returns_none() {
        assert!(Batch::new().finish().is_none());
    }

    #[test]
    fn test_reader_string_strips_trailing_nul() {
        let mut data = Bytes::from_static(&[4, b'a', b'b', 0, 0]);
        let mut reader = WireReader::new(&mut data, Opcode::EnterStage);
        assert_eq!(reader.string().unwrap(), "ab");
    }

    #[test]
    fn test_reader_truncated_u32_returns_error() {
        let mut data = Bytes::from_static(&[0, 1]);
        let mut reader = WireReader::new(&mut data, Opcode::EnterStage);
        let result = reader.u32();
        assert!(matches!(
            result,
            Err(ProtocolError::Truncated { opcode: 0x0022, needed: 2 })
        ));
    }
}
