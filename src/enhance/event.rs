use std::time::Duration;

use super::model::EnhancementStatus;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnhancementEvent {
    Submit,
    PersistenceSettled,
    ResponseReceived,
    AttemptFailed { attempt: u32, retry_in: Duration },
    BackoffElapsed,
    RetriesExhausted,
    Discarded,
    /// The caller dropped the run before it finished.
    Cancelled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusTransition {
    pub from: EnhancementStatus,
    pub event: EnhancementEvent,
    pub to: EnhancementStatus,
}

impl StatusTransition {
    pub const fn new(from: EnhancementStatus, event: EnhancementEvent, to: EnhancementStatus) -> Self {
        Self { from, event, to }
    }

    /// Backoff delay this transition scheduled, if it was a failed attempt.
    pub fn retry_delay(&self) -> Option<Duration> {
        match self.event {
            EnhancementEvent::AttemptFailed { retry_in, .. } => Some(retry_in),
            _ => None,
        }
    }
}
