//! Error types for the protocol layer.
//!
//! Every variant here is a protocol violation: the peer sent bytes that do
//! not form a valid request. Higher layers treat these as fatal for the
//! connection and close it cleanly after logging.

/// Errors that can occur while decoding inbound frames.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// The opcode is not one this server understands.
    ///
    /// Frames carry no length prefix, so an unknown opcode makes the rest
    /// of the batch unparseable.
    #[error("unknown opcode {0:#06x}")]
    UnknownOpcode(u16),

    /// A known opcode that is only ever sent by the server arrived from
    /// the client.
    #[error("opcode {0:#06x} is not a client request")]
    UnexpectedOpcode(u16),

    /// The payload ended before all fields of the message were read.
    #[error("truncated payload for opcode {opcode:#06x}: needed {needed} more bytes")]
    Truncated {
        /// Opcode of the message being decoded.
        opcode: u16,
        /// Bytes still required by the field being read.
        needed: usize,
    },

    /// A length-prefixed string was not valid UTF-8.
    #[error("invalid string in opcode {0:#06x}")]
    InvalidString(u16),

    /// The message is well-formed but arrived at the wrong time, e.g. a
    /// stage request before the login handshake.
    #[error("invalid message: {0}")]
    InvalidMessage(String),
}
