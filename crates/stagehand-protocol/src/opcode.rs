//! The opcode table.
//!
//! Every message on the wire starts with a 2-byte big-endian opcode. The
//! values below are this server's table; `End` (`0x0010`) is fixed by the
//! client and terminates a batch of concatenated messages.

use std::fmt;

use crate::ProtocolError;

/// Declares the opcode enum together with its `u16` conversions so the
/// table only has to be written once.
macro_rules! opcodes {
    ($( $(#[$doc:meta])* $name:ident = $value:literal, )*) => {
        /// A message opcode.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        #[repr(u16)]
        pub enum Opcode {
            $( $(#[$doc])* $name = $value, )*
        }

        impl Opcode {
            /// Returns the raw wire value.
            pub fn value(self) -> u16 {
                self as u16
            }
        }

        impl TryFrom<u16> for Opcode {
            type Error = ProtocolError;

            fn try_from(raw: u16) -> Result<Self, Self::Error> {
                match raw {
                    $( $value => Ok(Self::$name), )*
                    other => Err(ProtocolError::UnknownOpcode(other)),
                }
            }
        }
    };
}

opcodes! {
    /// Batch terminator. Carries no payload.
    End = 0x0010,
    /// Login handshake (client → server).
    Login = 0x0011,
    /// Acknowledgment (server → client).
    Ack = 0x0012,

    /// Create a stage with an explicit capacity.
    CreateStage = 0x0020,
    /// The stage the client reserved was torn down (server → client).
    StageDestruct = 0x0021,
    /// Enter a stage, pushing the current one on the navigation stack.
    EnterStage = 0x0022,
    /// Return to the previous stage.
    BackStage = 0x0023,
    /// Move to a stage without the hub introduction.
    MoveStage = 0x0024,
    /// Leave notification; the server takes no action.
    LeaveStage = 0x0025,
    /// Lock the current stage (reply only).
    LockStage = 0x0026,
    /// Dissolve the held reservation stage.
    UnlockStage = 0x0027,
    /// Reserve a slot or toggle readiness.
    ReserveStage = 0x0028,
    /// Drop the held reservation.
    UnreserveStage = 0x0029,
    /// Set or stage a room password.
    SetStagePass = 0x002A,
    /// Block until a stage binary is published.
    WaitStageBinary = 0x002B,
    /// Publish a stage binary.
    SetStageBinary = 0x002C,
    /// Fetch a stage binary.
    GetStageBinary = 0x002D,
    /// List joinable quest and personal stages.
    EnumerateStage = 0x002E,

    /// Spawn an object in the current stage.
    CreateObject = 0x0030,
    /// Remove an object.
    DeleteObject = 0x0031,
    /// Move an object.
    PositionObject = 0x0032,
    /// Describe an existing object (server → client).
    DuplicateObject = 0x0033,
    /// Drop every object from the previous stage (server → client).
    CleanupObject = 0x0034,

    /// Announce a character (server → client).
    InsertUser = 0x0040,
    /// Announce a character's departure (server → client).
    DeleteUser = 0x0041,
    /// Publish one of the caller's character binary parts.
    SetUserBinary = 0x0042,
    /// Fetch a character binary part.
    GetUserBinary = 0x0043,
    /// A character binary part changed (server → client).
    NotifyUserBinary = 0x0044,

    /// Load a character's house layout.
    LoadHouse = 0x0100,
    /// Save the caller's house interior.
    UpdateInterior = 0x0101,
    /// Load the caller's trophy data.
    GetMyhouseInfo = 0x0102,
    /// Save the caller's trophy data.
    UpdateMyhouseInfo = 0x0103,
    /// Load decoration presets.
    LoadDecoMyset = 0x0104,
    /// Save decoration presets.
    SaveDecoMyset = 0x0105,
    /// List houses. Answered with an empty success.
    EnumerateHouse = 0x0106,
    /// List the caller's titles.
    EnumerateTitle = 0x0107,
    /// Achievement progress notification. Expects no reply.
    AddAchievement = 0x0110,
}

impl fmt::Display for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}({:#06x})", self, self.value())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_end_opcode_is_fixed_terminator() {
        assert_eq!(Opcode::End.value(), 0x0010);
    }

    #[test]
    fn test_try_from_known_value() {
        assert_eq!(Opcode::try_from(0x0022).unwrap(), Opcode::EnterStage);
    }

    #[test]
    fn test_try_from_unknown_value_returns_error() {
        let result = Opcode::try_from(0xBEEF);
        assert!(matches!(result, Err(ProtocolError::UnknownOpcode(0xBEEF))));
    }

    #[test]
    fn test_display_includes_hex_value() {
        assert_eq!(Opcode::Ack.to_string(), "Ack(0x0012)");
    }
}
