use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::watch;

use super::error::{StateResult, SubmitError, ValidationError};
use super::event::{EnhancementEvent, StatusTransition};
use super::machine::EnhancementMachine;
use super::model::{
    EnhancementOutcome, EnhancementRequest, EnhancementSnapshot, EnhancementStatus, Submission,
};
use super::policy::RetryPolicy;
use crate::codec::ImageAsset;
use crate::generation::{GenerationService, InvocationResult};
use crate::identity::Identity;
use crate::prompt::PromptStore;

const SUBMITTED_MESSAGE: &str = "Enhancing photo...";
const SUCCESS_MESSAGE: &str = "Photo enhanced successfully!";
const FAILURE_MESSAGE: &str = "Failed to enhance photo. Check the logs for details.";

struct Inner {
    machine: EnhancementMachine,
    request: Option<EnhancementRequest>,
    snapshot: EnhancementSnapshot,
}

impl Inner {
    fn apply(&mut self, event: EnhancementEvent) -> StateResult<EnhancementStatus> {
        let status = self.machine.transition(event)?;
        self.snapshot.status = status;
        if let Some(request) = self.request.as_mut() {
            request.status = status;
        }
        Ok(status)
    }
}

/// Runs one enhancement at a time: validate, save the prompt once, then call
/// the generation service with bounded exponential backoff.
///
/// State lives behind a mutex that is never held across an await, so the
/// busy check and the `Submit` transition complete before the first
/// suspension point of [`EnhancementOrchestrator::submit`].
pub struct EnhancementOrchestrator {
    generator: Arc<dyn GenerationService>,
    prompts: PromptStore,
    identity: watch::Receiver<Option<Identity>>,
    policy: RetryPolicy,
    inner: Mutex<Inner>,
    snapshots: watch::Sender<EnhancementSnapshot>,
}

impl EnhancementOrchestrator {
    pub fn new(
        generator: Arc<dyn GenerationService>,
        prompts: PromptStore,
        identity: watch::Receiver<Option<Identity>>,
        policy: RetryPolicy,
    ) -> Self {
        let snapshot = EnhancementSnapshot {
            max_attempts: policy.max_attempts(),
            ..EnhancementSnapshot::default()
        };
        let (snapshots, _) = watch::channel(snapshot.clone());
        Self {
            generator,
            prompts,
            identity,
            policy,
            inner: Mutex::new(Inner {
                machine: EnhancementMachine::new(),
                request: None,
                snapshot,
            }),
            snapshots,
        }
    }

    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }

    pub fn subscribe(&self) -> watch::Receiver<EnhancementSnapshot> {
        self.snapshots.subscribe()
    }

    pub fn snapshot(&self) -> EnhancementSnapshot {
        self.lock().snapshot.clone()
    }

    pub fn status(&self) -> EnhancementStatus {
        self.lock().machine.status()
    }

    pub fn current_request(&self) -> Option<EnhancementRequest> {
        self.lock().request.clone()
    }

    /// Transitions of the active run, or of the last one once it has ended.
    pub fn transitions(&self) -> Vec<StatusTransition> {
        self.lock().machine.history().to_vec()
    }

    /// Forgets the last result and message. Refused while a request is in
    /// flight; that request is dealt with when it completes.
    pub fn clear_result(&self) -> bool {
        let mut inner = self.lock();
        if inner.machine.status().is_in_flight() {
            return false;
        }
        inner.machine = EnhancementMachine::new();
        inner.request = None;
        inner.snapshot = EnhancementSnapshot {
            max_attempts: self.policy.max_attempts(),
            ..EnhancementSnapshot::default()
        };
        self.publish(&inner);
        true
    }

    pub async fn submit(&self, submission: Submission) -> Result<EnhancementOutcome, SubmitError> {
        let (owner_id, prompt, image) = self.begin(submission)?;
        let in_flight = InFlight {
            orchestrator: self,
            settled: false,
        };

        let persistence_warning = match self.prompts.persist(&owner_id, &prompt).await {
            Ok(()) => None,
            Err(err) => {
                tracing::warn!(?err, owner_id = %owner_id, "continuing without saved prompt");
                Some(format!("Your vibe could not be saved: {err}"))
            }
        };

        self.update(|inner| {
            inner.snapshot.persistence_warning = persistence_warning.clone();
            inner.snapshot.attempt = 1;
            if let Some(request) = inner.request.as_mut() {
                request.attempt = 1;
            }
            inner.apply(EnhancementEvent::PersistenceSettled).map(|_| ())
        })?;

        let (attempts, result) = self.invoke_with_retry(&prompt, &image).await?;
        let outcome = self.deliver(&owner_id, attempts, result, persistence_warning)?;
        in_flight.settle();
        Ok(outcome)
    }

    fn begin(&self, submission: Submission) -> Result<(String, String, ImageAsset), SubmitError> {
        let mut inner = self.lock();
        let status = inner.machine.status();
        if !status.accepts_submission() {
            tracing::debug!(?status, "rejecting submission while a request is in flight");
            return Err(SubmitError::Busy { status });
        }

        let owner_id = self.identity.borrow().as_ref().map(|identity| identity.id.clone());
        let (owner_id, image) = match validate(owner_id, submission.image, &submission.prompt) {
            Ok(validated) => validated,
            Err(err) => {
                tracing::info!(%err, "submission failed validation");
                inner.snapshot.message = Some(err.to_string());
                self.publish(&inner);
                return Err(err.into());
            }
        };

        inner.request = Some(EnhancementRequest {
            prompt: submission.prompt.clone(),
            source_image: image.clone(),
            attempt: 0,
            result: None,
            status,
        });
        let status = inner.apply(EnhancementEvent::Submit)?;
        inner.snapshot = EnhancementSnapshot {
            status,
            attempt: 0,
            max_attempts: self.policy.max_attempts(),
            retry_delay: None,
            message: Some(SUBMITTED_MESSAGE.to_string()),
            persistence_warning: None,
            result: None,
        };
        self.publish(&inner);
        tracing::info!(owner_id = %owner_id, "enhancement submitted");

        Ok((owner_id, submission.prompt, image))
    }

    async fn invoke_with_retry(
        &self,
        prompt: &str,
        image: &ImageAsset,
    ) -> Result<(u32, InvocationResult<ImageAsset>), SubmitError> {
        let max_attempts = self.policy.max_attempts();
        let mut attempt = 1;
        loop {
            let err = match self.generator.generate(prompt, image).await {
                Ok(asset) => return Ok((attempt, Ok(asset))),
                Err(err) => err,
            };
            tracing::warn!(attempt, max_attempts, %err, "enhancement attempt failed");

            let Some(delay) = self.policy.delay_before_retry(attempt) else {
                return Ok((attempt, Err(err)));
            };
            self.update(|inner| {
                inner.snapshot.retry_delay = Some(delay);
                inner
                    .apply(EnhancementEvent::AttemptFailed {
                        attempt,
                        retry_in: delay,
                    })
                    .map(|_| ())
            })?;

            tokio::time::sleep(delay).await;

            attempt += 1;
            self.update(|inner| {
                inner.snapshot.retry_delay = None;
                inner.snapshot.attempt = attempt;
                if let Some(request) = inner.request.as_mut() {
                    request.attempt = attempt;
                }
                inner.apply(EnhancementEvent::BackoffElapsed).map(|_| ())
            })?;
        }
    }

    fn deliver(
        &self,
        owner_id: &str,
        attempts: u32,
        result: InvocationResult<ImageAsset>,
        persistence_warning: Option<String>,
    ) -> StateResult<EnhancementOutcome> {
        let mut inner = self.lock();

        let still_current = self
            .identity
            .borrow()
            .as_ref()
            .is_some_and(|identity| identity.id == owner_id);
        if !still_current {
            tracing::info!(owner_id, attempts, "identity changed; discarding enhancement result");
            inner.apply(EnhancementEvent::Discarded)?;
            inner.request = None;
            inner.snapshot = EnhancementSnapshot {
                max_attempts: self.policy.max_attempts(),
                ..EnhancementSnapshot::default()
            };
            self.publish(&inner);
            return Ok(EnhancementOutcome::Discarded);
        }

        let outcome = match result {
            Ok(image) => {
                inner.apply(EnhancementEvent::ResponseReceived)?;
                if let Some(request) = inner.request.as_mut() {
                    request.result = Some(image.clone());
                }
                inner.snapshot.result = Some(image.clone());
                inner.snapshot.message = Some(SUCCESS_MESSAGE.to_string());
                tracing::info!(owner_id, attempts, "enhancement succeeded");
                EnhancementOutcome::Succeeded {
                    image,
                    attempts,
                    persistence_warning,
                }
            }
            Err(err) => {
                inner.apply(EnhancementEvent::RetriesExhausted)?;
                inner.snapshot.message = Some(FAILURE_MESSAGE.to_string());
                tracing::error!(owner_id, attempts, %err, "enhancement failed after all retries");
                EnhancementOutcome::Failed {
                    attempts,
                    message: FAILURE_MESSAGE.to_string(),
                    persistence_warning,
                }
            }
        };
        self.publish(&inner);
        Ok(outcome)
    }

    /// Returns an abandoned run to `Idle` so the next submission is accepted.
    fn cancel_in_flight(&self) {
        let mut inner = self.lock();
        let status = inner.machine.status();
        if !status.is_in_flight() {
            return;
        }
        tracing::warn!(?status, "enhancement dropped before completion; returning to idle");
        if let Err(err) = inner.apply(EnhancementEvent::Cancelled) {
            tracing::error!(?err, "failed to cancel abandoned enhancement");
            return;
        }
        inner.request = None;
        inner.snapshot = EnhancementSnapshot {
            max_attempts: self.policy.max_attempts(),
            ..EnhancementSnapshot::default()
        };
        self.publish(&inner);
    }

    fn update<F>(&self, change: F) -> StateResult<()>
    where
        F: FnOnce(&mut Inner) -> StateResult<()>,
    {
        let mut inner = self.lock();
        let result = change(&mut inner);
        self.publish(&inner);
        result
    }

    fn publish(&self, inner: &Inner) {
        self.snapshots.send_replace(inner.snapshot.clone());
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Lives for one accepted `submit`. Dropped unsettled (the future was
/// cancelled or bailed out early), it cancels the run.
struct InFlight<'a> {
    orchestrator: &'a EnhancementOrchestrator,
    settled: bool,
}

impl InFlight<'_> {
    fn settle(mut self) {
        self.settled = true;
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        if !self.settled {
            self.orchestrator.cancel_in_flight();
        }
    }
}

fn validate(
    owner_id: Option<String>,
    image: Option<ImageAsset>,
    prompt: &str,
) -> Result<(String, ImageAsset), ValidationError> {
    let owner_id = owner_id.ok_or(ValidationError::MissingIdentity)?;
    let image = image.ok_or(ValidationError::MissingImage)?;
    if prompt.trim().is_empty() {
        return Err(ValidationError::EmptyPrompt);
    }
    Ok((owner_id, image))
}
