use std::path::Path;
use std::sync::Arc;

use futures::StreamExt;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

use crate::codec::{self, CodecResult, ImageAsset};
use crate::enhance::{EnhancementOrchestrator, EnhancementOutcome, Submission, SubmitError};
use crate::identity::{AuthResult, Identity, IdentityChannel, IdentityListener};
use crate::projection::{self, ProjectionInput, UiState};
use crate::prompt::{PromptStore, PromptStream};

const SIGN_IN_ERROR: &str = "Error signing in. Check the logs for details.";
const SIGN_OUT_ERROR: &str = "Error signing out. Check the logs for details.";
const SIGNED_OUT: &str = "Successfully signed out.";
const IMAGE_UPLOADED: &str = "Image uploaded. Now add a prompt and enhance!";

/// What the user is working with right now.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionState {
    /// Identity whose prompt subscription is active.
    pub owner_id: Option<String>,
    pub prompt_text: String,
    pub prompt_loaded: bool,
    pub image: Option<ImageAsset>,
    pub notice: Option<String>,
}

struct AbortOnDrop(JoinHandle<()>);

impl Drop for AbortOnDrop {
    fn drop(&mut self) {
        self.0.abort();
    }
}

/// Ties identity changes to prompt subscriptions and holds the photo and
/// prompt the next enhancement will use.
///
/// Must be created inside a tokio runtime; the identity driver runs as a
/// spawned task for as long as the session lives.
pub struct VibeSession {
    identity: Arc<IdentityChannel>,
    orchestrator: Arc<EnhancementOrchestrator>,
    state: Arc<watch::Sender<SessionState>>,
    _listener: IdentityListener,
    _driver: AbortOnDrop,
}

impl VibeSession {
    pub fn new(
        identity: Arc<IdentityChannel>,
        prompts: PromptStore,
        orchestrator: Arc<EnhancementOrchestrator>,
    ) -> Self {
        let (state, _) = watch::channel(SessionState::default());
        let state = Arc::new(state);

        let (changes, rx) = mpsc::unbounded_channel();
        if let Some(current) = identity.current() {
            let _ = changes.send(Some(current));
        }
        let listener = identity.on_identity_changed(move |next| {
            let _ = changes.send(next.cloned());
        });
        let driver = tokio::spawn(drive_identity(
            rx,
            prompts,
            Arc::clone(&state),
            Arc::clone(&orchestrator),
        ));

        Self {
            identity,
            orchestrator,
            state,
            _listener: listener,
            _driver: AbortOnDrop(driver),
        }
    }

    /// Signs in with the bootstrap token, or anonymously without one.
    pub async fn start(&self, token: Option<&str>) -> AuthResult<Identity> {
        self.identity.sign_in(token).await.inspect_err(|_| {
            self.set_notice(SIGN_IN_ERROR);
        })
    }

    pub async fn sign_out(&self) -> AuthResult<()> {
        if let Err(err) = self.identity.sign_out().await {
            self.set_notice(SIGN_OUT_ERROR);
            return Err(err);
        }
        self.state.send_modify(|state| {
            state.image = None;
            state.notice = Some(SIGNED_OUT.to_string());
        });
        self.orchestrator.clear_result();
        Ok(())
    }

    pub fn identity(&self) -> Option<Identity> {
        self.identity.current()
    }

    pub fn upload_image_file(&self, path: &Path) -> CodecResult<()> {
        let asset = codec::read_image_file(path)?;
        tracing::info!(path = %path.display(), mime_type = asset.mime_type(), "image uploaded");
        self.upload_image(asset);
        Ok(())
    }

    pub fn upload_image(&self, asset: ImageAsset) {
        self.state.send_modify(|state| {
            state.image = Some(asset);
            state.notice = Some(IMAGE_UPLOADED.to_string());
        });
    }

    pub fn set_prompt(&self, text: impl Into<String>) {
        let text = text.into();
        self.state.send_modify(|state| state.prompt_text = text);
    }

    pub fn prompt(&self) -> String {
        self.state.borrow().prompt_text.clone()
    }

    pub fn image(&self) -> Option<ImageAsset> {
        self.state.borrow().image.clone()
    }

    pub fn state(&self) -> SessionState {
        self.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.state.subscribe()
    }

    pub fn orchestrator(&self) -> &Arc<EnhancementOrchestrator> {
        &self.orchestrator
    }

    /// Resolves once the saved prompt of the current identity has been
    /// delivered (or failed to load). Returns at once when signed out.
    pub async fn wait_for_prompt_load(&self) {
        let Some(identity) = self.identity.current() else {
            return;
        };
        let mut state = self.state.subscribe();
        let _ = state
            .wait_for(|state| {
                state.prompt_loaded && state.owner_id.as_deref() == Some(identity.id.as_str())
            })
            .await;
    }

    /// Submits the current prompt and photo. The notice is cleared so the
    /// status line follows the enhancement from here on.
    pub async fn enhance(&self) -> Result<EnhancementOutcome, SubmitError> {
        let submission = {
            let state = self.state.borrow();
            Submission {
                prompt: state.prompt_text.clone(),
                image: state.image.clone(),
            }
        };
        if self.orchestrator.status().accepts_submission() {
            self.state.send_modify(|state| state.notice = None);
        }
        self.orchestrator.submit(submission).await
    }

    pub fn view(&self) -> UiState {
        let snapshot = self.orchestrator.snapshot();
        let state = self.state.borrow();
        let mut input = ProjectionInput::from_snapshot(&snapshot).with_presence(
            self.identity.current().is_some(),
            state.image.is_some(),
            !state.prompt_text.trim().is_empty(),
        );
        if !input.status.is_in_flight() {
            if let Some(notice) = state.notice.as_deref() {
                input.message = Some(notice);
                input.persistence_warning = None;
            }
        }
        projection::project(&input)
    }

    fn set_notice(&self, notice: &str) {
        self.state
            .send_modify(|state| state.notice = Some(notice.to_string()));
    }
}

async fn drive_identity(
    mut changes: mpsc::UnboundedReceiver<Option<Identity>>,
    prompts: PromptStore,
    state: Arc<watch::Sender<SessionState>>,
    orchestrator: Arc<EnhancementOrchestrator>,
) {
    let mut subscription: Option<AbortOnDrop> = None;
    while let Some(next) = changes.recv().await {
        subscription = None;
        orchestrator.clear_result();
        match next {
            Some(identity) => {
                tracing::debug!(owner_id = %identity.id, "following saved prompt");
                state.send_modify(|state| {
                    state.owner_id = Some(identity.id.clone());
                    state.prompt_text.clear();
                    state.prompt_loaded = false;
                });
                let stream = prompts.load(&identity.id);
                subscription = Some(AbortOnDrop(tokio::spawn(follow_prompt(
                    stream,
                    identity.id,
                    Arc::clone(&state),
                ))));
            }
            None => {
                state.send_modify(|state| {
                    state.owner_id = None;
                    state.prompt_text.clear();
                    state.prompt_loaded = false;
                    state.image = None;
                });
            }
        }
    }
    drop(subscription);
}

async fn follow_prompt(
    mut stream: PromptStream,
    owner_id: String,
    state: Arc<watch::Sender<SessionState>>,
) {
    while let Some(item) = stream.next().await {
        state.send_if_modified(|state| {
            if state.owner_id.as_deref() != Some(owner_id.as_str()) {
                return false;
            }
            match &item {
                Ok(prompt) => {
                    state.prompt_text = prompt
                        .as_ref()
                        .map(|prompt| prompt.text.clone())
                        .unwrap_or_default();
                }
                Err(err) => {
                    tracing::warn!(?err, owner_id = %owner_id, "saved prompt could not be loaded");
                    state.notice = Some(format!("Your saved vibe could not be loaded: {err}"));
                }
            }
            state.prompt_loaded = true;
            true
        });
    }
}
