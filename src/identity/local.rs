use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{AuthError, AuthResult, Identity, IdentityProvider};
use crate::config::IdentityConfig;

#[derive(Debug, Serialize, Deserialize)]
struct SessionRecord {
    user_id: String,
    anonymous: bool,
}

/// Identity provider backed by a session file.
///
/// A bootstrap token is taken as the user id. Anonymous identities are
/// reused across runs for as long as the session file exists.
#[derive(Debug)]
pub struct LocalIdentityProvider {
    session_file: Option<PathBuf>,
    session: Mutex<Option<Identity>>,
}

impl LocalIdentityProvider {
    pub fn new(config: &IdentityConfig) -> Self {
        Self {
            session_file: Some(config.session_file.clone()),
            session: Mutex::new(None),
        }
    }

    pub fn in_memory() -> Self {
        Self {
            session_file: None,
            session: Mutex::new(None),
        }
    }

    fn remember(&self, identity: &Identity) -> AuthResult<()> {
        *self
            .session
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(identity.clone());

        let Some(path) = &self.session_file else {
            return Ok(());
        };
        let record = SessionRecord {
            user_id: identity.id.clone(),
            anonymous: identity.anonymous,
        };
        let contents = serde_json::to_string_pretty(&record).map_err(|err| AuthError::Session {
            path: path.clone(),
            source: io::Error::new(io::ErrorKind::InvalidData, err),
        })?;
        write_session(path, &contents)
    }

    fn restore_anonymous(&self) -> AuthResult<Option<Identity>> {
        let remembered = self
            .session
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone();
        if let Some(identity) = remembered.filter(|identity| identity.anonymous) {
            return Ok(Some(identity));
        }

        let Some(path) = &self.session_file else {
            return Ok(None);
        };
        let contents = match fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(source) => {
                return Err(AuthError::Session {
                    path: path.clone(),
                    source,
                })
            }
        };
        match serde_json::from_str::<SessionRecord>(&contents) {
            Ok(record) if record.anonymous => Ok(Some(Identity {
                id: record.user_id,
                anonymous: true,
            })),
            Ok(_) => Ok(None),
            Err(err) => {
                tracing::warn!(?err, path = %path.display(), "ignoring unreadable session file");
                Ok(None)
            }
        }
    }
}

#[async_trait]
impl IdentityProvider for LocalIdentityProvider {
    async fn sign_in_with_token(&self, token: &str) -> AuthResult<Identity> {
        let user_id = validate_token(token)?;
        let identity = Identity {
            id: user_id.to_string(),
            anonymous: false,
        };
        self.remember(&identity)?;
        Ok(identity)
    }

    async fn sign_in_anonymously(&self) -> AuthResult<Identity> {
        let identity = match self.restore_anonymous()? {
            Some(identity) => identity,
            None => Identity {
                id: Uuid::new_v4().simple().to_string(),
                anonymous: true,
            },
        };
        self.remember(&identity)?;
        Ok(identity)
    }

    async fn sign_out(&self) -> AuthResult<()> {
        *self
            .session
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = None;

        let Some(path) = &self.session_file else {
            return Ok(());
        };
        match fs::remove_file(path) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(source) => Err(AuthError::Session {
                path: path.clone(),
                source,
            }),
        }
    }
}

fn validate_token(token: &str) -> AuthResult<&str> {
    let token = token.trim();
    if token.is_empty() {
        return Err(AuthError::InvalidToken {
            reason: "token is empty".to_string(),
        });
    }
    if token.contains(['/', '\\']) || token.chars().any(char::is_whitespace) {
        return Err(AuthError::InvalidToken {
            reason: "token contains path separators or whitespace".to_string(),
        });
    }
    Ok(token)
}

fn write_session(path: &Path, contents: &str) -> AuthResult<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|source| AuthError::Session {
            path: path.to_path_buf(),
            source,
        })?;
    }
    fs::write(path, contents).map_err(|source| AuthError::Session {
        path: path.to_path_buf(),
        source,
    })
}
