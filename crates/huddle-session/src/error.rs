//! Session state machine errors.

use huddle_core::Phase;

/// Errors from session state transitions.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// The timer is not running.
    #[error("timer is not running")]
    TimerNotRunning,

    /// The timer is not paused.
    #[error("timer is not paused")]
    TimerNotPaused,

    /// The timer is idle; there is nothing to modify.
    #[error("timer is idle")]
    TimerIdle,

    /// The session is already in its terminal phase.
    #[error("session has ended")]
    PhaseTerminal,

    /// The target phase is not part of this session kind's sequence.
    #[error("phase {0} is not valid for this session")]
    InvalidPhase(Phase),
}

/// Result type for session transitions.
pub type SessionResult<T> = Result<T, SessionError>;
