/// Run state definitions for the ingestion pass
///
/// A run moves `Idle -> Running -> {Completed, Interrupted}` and never back.
use std::fmt;

/// Represents where a single pipeline run is in its lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RunState {
    /// Checkpoint loaded, no item handed out yet
    Idle,

    /// Workers are resolving items
    Running,

    /// The queue was exhausted and the checkpoint committed
    Completed,

    /// Cancellation stopped the run early; the checkpoint was still committed
    Interrupted,
}

impl RunState {
    /// Returns true if the run is over
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Interrupted)
    }

    /// Returns true if `next` is a legal successor of this state
    pub fn can_transition_to(&self, next: RunState) -> bool {
        matches!(
            (self, next),
            (Self::Idle, Self::Running)
                | (Self::Running, Self::Completed)
                | (Self::Running, Self::Interrupted)
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Interrupted => "interrupted",
        }
    }
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
