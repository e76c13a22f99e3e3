use std::fmt;
use std::io;
use std::path::PathBuf;

use async_trait::async_trait;
use futures::stream::BoxStream;
use serde_json::{Map, Value};
use thiserror::Error;

mod local;

pub use local::LocalDocumentStore;

/// A document is a flat JSON object; merges replace top-level fields only.
pub type Document = Map<String, Value>;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("io error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to parse document {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("invalid document path {path}")]
    InvalidPath { path: String },
    #[error("document {path} is not a JSON object")]
    NotAnObject { path: String },
    #[error("document store unavailable: {message}")]
    Unavailable { message: String },
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Slash-separated document address, e.g. `artifacts/app/users/u1/vibeData/current`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DocumentPath(Vec<String>);

impl DocumentPath {
    pub fn new<I, S>(segments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(segments.into_iter().map(Into::into).collect())
    }

    pub fn vibe_prompt(app_id: &str, user_id: &str) -> Self {
        Self::new(["artifacts", app_id, "users", user_id, "vibeData", "current"])
    }

    pub fn segments(&self) -> &[String] {
        &self.0
    }
}

impl fmt::Display for DocumentPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "/{}", self.0.join("/"))
    }
}

/// Stream of document states: the current value first, then one item per change.
pub type DocumentStream = BoxStream<'static, StoreResult<Option<Document>>>;

#[async_trait]
pub trait DocumentStore: Send + Sync {
    fn subscribe(&self, path: &DocumentPath) -> DocumentStream;
    async fn merge(&self, path: &DocumentPath, fields: Document) -> StoreResult<()>;
}
