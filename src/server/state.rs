//! Server lifecycle state machine.

/// Lifecycle state of a console server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ServerState {
    /// Constructed, not yet accepting.
    #[default]
    Created,
    /// Accepting connections.
    Listening,
    /// No longer accepting; open sessions have been told to stop.
    ShuttingDown,
    /// Listener released and every session has exited.
    Closed,
}

impl ServerState {
    /// Check if transition to target state is valid.
    ///
    /// Valid transitions:
    /// - Created -> Listening
    /// - Created -> ShuttingDown (closed before it was started)
    /// - Listening -> ShuttingDown
    /// - ShuttingDown -> Closed
    pub fn can_transition_to(&self, target: ServerState) -> bool {
        use ServerState::*;
        matches!(
            (*self, target),
            (Created, Listening)
                | (Created, ShuttingDown)
                | (Listening, ShuttingDown)
                | (ShuttingDown, Closed)
        )
    }

    /// Attempt to transition to a new state.
    ///
    /// Returns `Ok(())` if the transition is valid, or an error otherwise.
    pub fn transition_to(&mut self, target: ServerState) -> crate::Result<()> {
        if self.can_transition_to(target) {
            *self = target;
            Ok(())
        } else {
            Err(crate::error::ConsoleError::InvalidStateTransition {
                from: *self,
                to: target,
            })
        }
    }

    /// Check if this is a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, ServerState::Closed)
    }

    /// Check if shutdown has begun (or finished).
    pub fn is_closing(&self) -> bool {
        matches!(self, ServerState::ShuttingDown | ServerState::Closed)
    }
}
