use thiserror::Error;

use super::event::EnhancementEvent;
use super::model::EnhancementStatus;

pub type StateResult<T> = std::result::Result<T, StateError>;

#[derive(Debug, Error)]
pub enum StateError {
    #[error("invalid state transition: from {from:?} using event {event:?}")]
    InvalidStateTransition {
        from: EnhancementStatus,
        event: EnhancementEvent,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("Please sign in before enhancing a photo.")]
    MissingIdentity,
    #[error("Please upload a photo to enhance.")]
    MissingImage,
    #[error("Please write a prompt describing the vibe you want.")]
    EmptyPrompt,
}

#[derive(Debug, Error)]
pub enum SubmitError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("an enhancement is already in progress ({status:?})")]
    Busy { status: EnhancementStatus },
    #[error(transparent)]
    State(#[from] StateError),
}
