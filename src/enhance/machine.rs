use super::error::{StateError, StateResult};
use super::event::{EnhancementEvent, StatusTransition};
use super::model::EnhancementStatus;

#[derive(Debug)]
pub struct EnhancementMachine {
    status: EnhancementStatus,
    transition_history: Vec<StatusTransition>,
}

impl EnhancementMachine {
    pub fn new() -> Self {
        Self {
            status: EnhancementStatus::default(),
            transition_history: Vec::new(),
        }
    }

    pub fn status(&self) -> EnhancementStatus {
        self.status
    }

    pub fn history(&self) -> &[StatusTransition] {
        &self.transition_history
    }

    pub fn can_transition(&self, event: EnhancementEvent) -> bool {
        self.next_status(event).is_some()
    }

    pub fn next_status(&self, event: EnhancementEvent) -> Option<EnhancementStatus> {
        use EnhancementEvent::*;
        use EnhancementStatus::*;
        match (self.status, event) {
            (Idle | Succeeded | Failed, Submit) => Some(Persisting),
            (Persisting, PersistenceSettled) => Some(Invoking),
            (Invoking, ResponseReceived) => Some(Succeeded),
            (Invoking, AttemptFailed { .. }) => Some(RetryPending),
            (RetryPending, BackoffElapsed) => Some(Invoking),
            (Invoking, RetriesExhausted) => Some(Failed),
            (Invoking, Discarded) => Some(Idle),
            (Persisting | Invoking | RetryPending, Cancelled) => Some(Idle),
            _ => None,
        }
    }

    pub fn transition(&mut self, event: EnhancementEvent) -> StateResult<EnhancementStatus> {
        tracing::debug!(from = ?self.status, event = ?event, "request status transition");
        let next = self.next_status(event).ok_or_else(|| {
            let from = self.status;
            tracing::warn!(from = ?from, event = ?event, "invalid status transition requested");
            StateError::InvalidStateTransition { from, event }
        })?;

        if event == EnhancementEvent::Submit {
            self.transition_history.clear();
        }
        self.transition_history
            .push(StatusTransition::new(self.status, event, next));
        self.status = next;

        Ok(self.status)
    }
}

impl Default for EnhancementMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for EnhancementMachine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "EnhancementStatus::{:?}", self.status)
    }
}
