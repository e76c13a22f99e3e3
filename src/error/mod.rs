use crate::codec::CodecError;
use crate::config::ConfigError;
use crate::enhance::SubmitError;
use crate::generation::RemoteInvocationError;
use crate::identity::AuthError;
use crate::prompt::PersistenceError;
use thiserror::Error;

/// Errors surfaced by the binary. Store and state errors arrive wrapped in
/// `Persistence` and `Submit`.
pub type AppResult<T> = std::result::Result<T, AppError>;

#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Auth(#[from] AuthError),
    #[error(transparent)]
    Persistence(#[from] PersistenceError),
    #[error(transparent)]
    Codec(#[from] CodecError),
    #[error(transparent)]
    RemoteInvocation(#[from] RemoteInvocationError),
    #[error(transparent)]
    Submit(#[from] SubmitError),
    #[error(transparent)]
    Config(#[from] ConfigError),
}
