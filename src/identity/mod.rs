use std::io;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::watch;

mod local;

pub use local::LocalIdentityProvider;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub id: String,
    pub anonymous: bool,
}

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("sign-in token rejected: {reason}")]
    InvalidToken { reason: String },
    #[error("identity provider rejected the request: {message}")]
    Rejected { message: String },
    #[error("failed to access session file {path}: {source}")]
    Session {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

pub type AuthResult<T> = std::result::Result<T, AuthError>;

#[async_trait]
pub trait IdentityProvider: Send + Sync {
    async fn sign_in_with_token(&self, token: &str) -> AuthResult<Identity>;
    async fn sign_in_anonymously(&self) -> AuthResult<Identity>;
    async fn sign_out(&self) -> AuthResult<()>;
}

type Listener = Arc<dyn Fn(Option<&Identity>) + Send + Sync>;

#[derive(Default)]
struct ListenerRegistry {
    next_id: u64,
    entries: Vec<(u64, Listener)>,
}

/// Owns the current identity and tells listeners about each transition.
///
/// A notification fires once per actual change (none to some, some to none,
/// or one identity to another) and never for a no-op.
pub struct IdentityChannel {
    provider: Arc<dyn IdentityProvider>,
    current: watch::Sender<Option<Identity>>,
    listeners: Arc<Mutex<ListenerRegistry>>,
}

impl IdentityChannel {
    pub fn new(provider: Arc<dyn IdentityProvider>) -> Self {
        let (current, _) = watch::channel(None);
        Self {
            provider,
            current,
            listeners: Arc::new(Mutex::new(ListenerRegistry::default())),
        }
    }

    pub fn current(&self) -> Option<Identity> {
        self.current.borrow().clone()
    }

    pub fn watch(&self) -> watch::Receiver<Option<Identity>> {
        self.current.subscribe()
    }

    /// Signs in with the bootstrap token when one is given, anonymously otherwise.
    pub async fn sign_in(&self, token: Option<&str>) -> AuthResult<Identity> {
        let result = match token {
            Some(token) => self.provider.sign_in_with_token(token).await,
            None => self.provider.sign_in_anonymously().await,
        };

        match result {
            Ok(identity) => {
                tracing::info!(
                    user_id = %identity.id,
                    anonymous = identity.anonymous,
                    "user signed in"
                );
                self.apply(Some(identity.clone()));
                Ok(identity)
            }
            Err(err) => {
                tracing::error!(?err, "sign-in failed");
                Err(err)
            }
        }
    }

    pub async fn sign_out(&self) -> AuthResult<()> {
        if let Err(err) = self.provider.sign_out().await {
            tracing::error!(?err, "sign-out failed");
            return Err(err);
        }
        tracing::info!("user signed out");
        self.apply(None);
        Ok(())
    }

    pub fn on_identity_changed<F>(&self, listener: F) -> IdentityListener
    where
        F: Fn(Option<&Identity>) + Send + Sync + 'static,
    {
        let mut registry = lock_registry(&self.listeners);
        let id = registry.next_id;
        registry.next_id += 1;
        registry.entries.push((id, Arc::new(listener)));

        IdentityListener {
            id,
            registry: Arc::downgrade(&self.listeners),
        }
    }

    fn apply(&self, next: Option<Identity>) {
        let changed = self.current.send_if_modified(|current| {
            if *current == next {
                return false;
            }
            *current = next.clone();
            true
        });
        if !changed {
            tracing::debug!("identity unchanged; skipping notification");
            return;
        }

        let listeners: Vec<Listener> = lock_registry(&self.listeners)
            .entries
            .iter()
            .map(|(_, listener)| Arc::clone(listener))
            .collect();
        for listener in listeners {
            listener(next.as_ref());
        }
    }
}

fn lock_registry(registry: &Mutex<ListenerRegistry>) -> std::sync::MutexGuard<'_, ListenerRegistry> {
    registry
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Handle returned by [`IdentityChannel::on_identity_changed`]. Dropping it
/// unsubscribes as well.
pub struct IdentityListener {
    id: u64,
    registry: std::sync::Weak<Mutex<ListenerRegistry>>,
}

impl IdentityListener {
    pub fn unsubscribe(self) {
        drop(self);
    }
}

impl Drop for IdentityListener {
    fn drop(&mut self) {
        if let Some(registry) = self.registry.upgrade() {
            lock_registry(&registry)
                .entries
                .retain(|(id, _)| *id != self.id);
        }
    }
}
