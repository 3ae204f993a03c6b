//! Per-session navigation history.

use stagehand_protocol::StageId;

use crate::SessionError;

/// Stack of stages a session came from.
///
/// `EnterStage` and `MoveStage` push the stage being left; `BackStage`
/// pops it and returns there.
#[derive(Debug, Clone, Default)]
pub struct MoveStack {
    entries: Vec<StageId>,
}

impl MoveStack {
    /// Creates an empty stack.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records the stage being left.
    pub fn push(&mut self, stage_id: StageId) {
        self.entries.push(stage_id);
    }

    /// Takes the most recent stage.
    ///
    /// # Errors
    /// [`SessionError::EmptyMoveStack`] if there is nowhere to go back to.
    pub fn pop(&mut self) -> Result<StageId, SessionError> {
        self.entries.pop().ok_or(SessionError::EmptyMoveStack)
    }

    /// The stage a `pop` would return.
    pub fn peek(&self) -> Option<&StageId> {
        self.entries.last()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pop_returns_most_recent_first() {
        let mut stack = MoveStack::new();
        stack.push(StageId::new("A"));
        stack.push(StageId::new("B"));

        assert_eq!(stack.pop().unwrap(), StageId::new("B"));
        assert_eq!(stack.pop().unwrap(), StageId::new("A"));
    }

    #[test]
    fn test_pop_empty_returns_error() {
        let mut stack = MoveStack::new();
        assert!(matches!(stack.pop(), Err(SessionError::EmptyMoveStack)));
    }
}
