//! Identity and value types shared by every layer.
//!
//! These are the small newtypes that appear in messages on the wire and in
//! the server's own bookkeeping. Keeping them here means the stage and
//! session crates agree on what a character or a stage is without depending
//! on each other.

use std::fmt;

// ---------------------------------------------------------------------------
// Identity types
// ---------------------------------------------------------------------------

/// A character identifier, as resolved at login.
///
/// Newtype over the wire's `u32` so it can't be mixed up with object IDs or
/// acknowledgment handles, which share the same width.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CharId(pub u32);

impl fmt::Display for CharId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "C-{}", self.0)
    }
}

/// The opaque correlation token a request carries and its reply echoes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AckHandle(pub u32);

impl fmt::Display for AckHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ack-{:#010x}", self.0)
    }
}

/// A stage identifier such as `sl1Ns200p0a0u0`.
///
/// Characters `[3..5]` encode the stage category. Quest (`Qs`), personal
/// room (`Ms`) and guild room (`Gs`) stages are ephemeral: they disappear
/// once nobody is inside or holds a reservation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StageId(String);

impl StageId {
    /// Wraps a raw identifier.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the identifier as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns the two-character category code, if the identifier is long
    /// enough to carry one.
    pub fn category(&self) -> Option<&str> {
        self.0.get(3..5)
    }

    /// Returns `true` if the category code is one of `codes`.
    pub fn has_category(&self, codes: &[String]) -> bool {
        self.category()
            .is_some_and(|cat| codes.iter().any(|code| code == cat))
    }
}

impl fmt::Display for StageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for StageId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for StageId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// A stage object identifier as the client sees it.
///
/// The allocator hands out small slot numbers; on the wire the slot sits in
/// the second byte of a big-endian `u32` (`slot << 16`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectId(pub u32);

impl ObjectId {
    /// Builds the wire identifier for an allocator slot.
    pub fn from_slot(slot: u8) -> Self {
        Self(u32::from(slot) << 16)
    }

    /// Recovers the allocator slot from a wire identifier.
    pub fn slot(self) -> u8 {
        (self.0 >> 16) as u8
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "obj-{:#010x}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Value types
// ---------------------------------------------------------------------------

/// Two-part category tag naming a stage binary blob.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BinaryKey {
    /// First tag byte.
    pub group: u8,
    /// Second tag byte.
    pub kind: u8,
}

impl BinaryKey {
    /// Builds a key from its two tag bytes.
    pub const fn new(group: u8, kind: u8) -> Self {
        Self { group, kind }
    }
}

impl fmt::Display for BinaryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{{},{}}}", self.group, self.kind)
    }
}

/// A 3-D position.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Position {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Position {
    /// Builds a position from its components.
    pub const fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_id_category_reads_chars_three_to_five() {
        let id = StageId::new("sl1Qs123p0a0u0");
        assert_eq!(id.category(), Some("Qs"));
    }

    #[test]
    fn test_stage_id_category_short_id_is_none() {
        assert_eq!(StageId::new("sl1").category(), None);
    }

    #[test]
    fn test_stage_id_has_category_matches_list() {
        let codes = vec!["Qs".to_string(), "Ms".to_string()];
        assert!(StageId::new("sl2Ms001p0a0u0").has_category(&codes));
        assert!(!StageId::new("sl1Ns200p0a0u0").has_category(&codes));
    }

    #[test]
    fn test_object_id_from_slot_shifts_into_second_byte() {
        let id = ObjectId::from_slot(0x7f);
        assert_eq!(id.0, 0x007f_0000);
        assert_eq!(id.slot(), 0x7f);
    }

    #[test]
    fn test_char_id_display() {
        assert_eq!(CharId(42).to_string(), "C-42");
    }

    #[test]
    fn test_binary_key_display() {
        assert_eq!(BinaryKey::new(1, 12).to_string(), "{1,12}");
    }
}
