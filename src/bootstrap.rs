use std::sync::Arc;

use crate::config::{AppConfig, EnvOverrides};
use crate::enhance::EnhancementOrchestrator;
use crate::error::AppResult;
use crate::generation::GenerationClient;
use crate::identity::{IdentityChannel, LocalIdentityProvider};
use crate::prompt::PromptStore;
use crate::session::VibeSession;
use crate::store::LocalDocumentStore;

/// Long-lived services built once from the loaded configuration.
pub struct AppRuntime {
    pub config: AppConfig,
    pub identity: Arc<IdentityChannel>,
    pub prompts: PromptStore,
    pub orchestrator: Arc<EnhancementOrchestrator>,
    initial_token: Option<String>,
}

impl AppRuntime {
    /// Token from the environment, used when the command line gives none.
    pub fn initial_token(&self) -> Option<&str> {
        self.initial_token.as_deref()
    }

    pub fn session(&self) -> VibeSession {
        VibeSession::new(
            Arc::clone(&self.identity),
            self.prompts.clone(),
            Arc::clone(&self.orchestrator),
        )
    }
}

pub fn bootstrap_app_runtime(config: AppConfig, env: &EnvOverrides) -> AppResult<AppRuntime> {
    let identity_config = config.identity_config(env)?;
    let store_config = config.store_config(env)?;
    let generation_config = config.generation_config(env);
    let policy = config.retry_policy();
    tracing::info!(
        app_id = %store_config.app_id,
        data_dir = %store_config.data_dir.display(),
        model = %generation_config.model,
        max_retries = policy.max_retries(),
        "loaded app config"
    );
    if generation_config.api_key.is_empty() {
        tracing::warn!("no generation API key configured; requests will likely be rejected");
    }

    let identity = Arc::new(IdentityChannel::new(Arc::new(LocalIdentityProvider::new(
        &identity_config,
    ))));
    let prompts = PromptStore::new(
        Arc::new(LocalDocumentStore::with_root(&store_config.data_dir)),
        &store_config,
    );
    let generator = Arc::new(GenerationClient::from_config(&generation_config)?);
    let orchestrator = Arc::new(EnhancementOrchestrator::new(
        generator,
        prompts.clone(),
        identity.watch(),
        policy,
    ));

    Ok(AppRuntime {
        config,
        identity,
        prompts,
        orchestrator,
        initial_token: identity_config.initial_token,
    })
}
