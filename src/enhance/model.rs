use std::time::Duration;

use crate::codec::ImageAsset;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EnhancementStatus {
    #[default]
    Idle,
    Persisting,
    Invoking,
    RetryPending,
    Succeeded,
    Failed,
}

impl EnhancementStatus {
    /// A request is active; new submissions are rejected.
    pub fn is_in_flight(self) -> bool {
        matches!(self, Self::Persisting | Self::Invoking | Self::RetryPending)
    }

    pub fn accepts_submission(self) -> bool {
        matches!(self, Self::Idle | Self::Succeeded | Self::Failed)
    }
}

/// What the caller hands to [`super::EnhancementOrchestrator::submit`].
#[derive(Debug, Clone, Default)]
pub struct Submission {
    pub prompt: String,
    pub image: Option<ImageAsset>,
}

/// The single run owned by the orchestrator while it is active.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnhancementRequest {
    pub prompt: String,
    pub source_image: ImageAsset,
    pub attempt: u32,
    pub result: Option<ImageAsset>,
    pub status: EnhancementStatus,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct EnhancementSnapshot {
    pub status: EnhancementStatus,
    pub attempt: u32,
    pub max_attempts: u32,
    pub retry_delay: Option<Duration>,
    pub message: Option<String>,
    pub persistence_warning: Option<String>,
    pub result: Option<ImageAsset>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EnhancementOutcome {
    Succeeded {
        image: ImageAsset,
        attempts: u32,
        persistence_warning: Option<String>,
    },
    Failed {
        attempts: u32,
        message: String,
        persistence_warning: Option<String>,
    },
    /// The identity changed while the request was in flight; nothing was applied.
    Discarded,
}
