//! Session state machine.

/// Lifecycle state of a console session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionState {
    /// Registered, interactive loop not started yet.
    #[default]
    Open,
    /// Reading, evaluating and responding.
    Running,
    /// Loop has exited and cleanup has run.
    Closed,
}

impl SessionState {
    /// Check if transition to target state is valid.
    ///
    /// Valid transitions:
    /// - Open -> Running
    /// - Open -> Closed (cancelled before the first read)
    /// - Running -> Closed
    pub fn can_transition_to(&self, target: SessionState) -> bool {
        use SessionState::*;
        matches!(
            (*self, target),
            (Open, Running) | (Open, Closed) | (Running, Closed)
        )
    }

    /// Move to `target` if the transition is valid. Returns whether it moved.
    pub fn advance(&mut self, target: SessionState) -> bool {
        if self.can_transition_to(target) {
            *self = target;
            true
        } else {
            false
        }
    }

    /// Check if this is a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionState::Closed)
    }
}
