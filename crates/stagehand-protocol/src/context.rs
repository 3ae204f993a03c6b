//! Per-connection rendering context.

/// Information about the client on the other end of a connection that a
/// message may need while rendering itself.
///
/// Every [`Packet::build`](crate::Packet::build) call receives the
/// recipient's context, so the same logical message can be encoded
/// differently for different recipients. Broadcasts therefore render once
/// per recipient rather than once per message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ClientContext {
    /// Client build revision reported at login.
    pub revision: u16,
}

impl ClientContext {
    /// Creates a context for the given client revision.
    pub fn new(revision: u16) -> Self {
        Self { revision }
    }
}
