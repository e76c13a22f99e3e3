use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, SecondsFormat, Utc};
use futures::stream::{BoxStream, StreamExt};
use serde_json::{json, Value};
use thiserror::Error;

use crate::config::StoreConfig;
use crate::store::{Document, DocumentPath, DocumentStore, StoreError};

const FIELD_TEXT: &str = "text";
const FIELD_LAST_UPDATED: &str = "lastUpdated";

#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("malformed vibe document for {owner_id}: {message}")]
    MalformedDocument { owner_id: String, message: String },
}

pub type PersistenceResult<T> = std::result::Result<T, PersistenceError>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VibePrompt {
    pub owner_id: String,
    pub text: String,
    pub last_updated: Option<DateTime<Utc>>,
}

pub type PromptStream = BoxStream<'static, PersistenceResult<Option<VibePrompt>>>;

/// Reads and writes each user's vibe prompt document.
#[derive(Clone)]
pub struct PromptStore {
    store: Arc<dyn DocumentStore>,
    app_id: String,
    last_written: Arc<Mutex<HashMap<String, DateTime<Utc>>>>,
}

impl PromptStore {
    pub fn new(store: Arc<dyn DocumentStore>, config: &StoreConfig) -> Self {
        Self {
            store,
            app_id: config.app_id.clone(),
            last_written: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    fn path_for(&self, owner_id: &str) -> DocumentPath {
        DocumentPath::vibe_prompt(&self.app_id, owner_id)
    }

    /// Subscribes to the owner's prompt. Never ends on its own; drop the
    /// stream to stop listening.
    pub fn load(&self, owner_id: &str) -> PromptStream {
        let owner = owner_id.to_string();
        let last_written = Arc::clone(&self.last_written);
        self.store
            .subscribe(&self.path_for(owner_id))
            .map(move |item| -> PersistenceResult<Option<VibePrompt>> {
                let document = item?;
                let prompt = document
                    .map(|document| prompt_from_document(&owner, &document))
                    .transpose()?;
                if let Some(stamp) = prompt.as_ref().and_then(|prompt| prompt.last_updated) {
                    observe_timestamp(&last_written, &owner, stamp);
                }
                Ok(prompt)
            })
            .boxed()
    }

    pub async fn persist(&self, owner_id: &str, text: &str) -> PersistenceResult<()> {
        self.persist_at(owner_id, text, Utc::now()).await
    }

    async fn persist_at(
        &self,
        owner_id: &str,
        text: &str,
        now: DateTime<Utc>,
    ) -> PersistenceResult<()> {
        let stamp = {
            let written = lock_timestamps(&self.last_written);
            written
                .get(owner_id)
                .map_or(now, |previous| (*previous).max(now))
        };

        let mut fields = Document::new();
        fields.insert(FIELD_TEXT.to_string(), json!(text));
        fields.insert(
            FIELD_LAST_UPDATED.to_string(),
            json!(stamp.to_rfc3339_opts(SecondsFormat::Millis, true)),
        );

        if let Err(err) = self.store.merge(&self.path_for(owner_id), fields).await {
            tracing::warn!(?err, owner_id, "failed to save vibe prompt");
            return Err(err.into());
        }
        observe_timestamp(&self.last_written, owner_id, stamp);
        tracing::debug!(owner_id, last_updated = %stamp, "saved vibe prompt");
        Ok(())
    }
}

fn lock_timestamps(
    timestamps: &Mutex<HashMap<String, DateTime<Utc>>>,
) -> std::sync::MutexGuard<'_, HashMap<String, DateTime<Utc>>> {
    timestamps
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn observe_timestamp(
    timestamps: &Mutex<HashMap<String, DateTime<Utc>>>,
    owner_id: &str,
    stamp: DateTime<Utc>,
) {
    let mut written = lock_timestamps(timestamps);
    let entry = written.entry(owner_id.to_string()).or_insert(stamp);
    if stamp > *entry {
        *entry = stamp;
    }
}

fn prompt_from_document(owner_id: &str, document: &Document) -> PersistenceResult<VibePrompt> {
    let malformed = |message: String| PersistenceError::MalformedDocument {
        owner_id: owner_id.to_string(),
        message,
    };

    let text = match document.get(FIELD_TEXT) {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(text)) => text.clone(),
        Some(other) => return Err(malformed(format!("`text` is not a string: {other}"))),
    };
    let last_updated = match document.get(FIELD_LAST_UPDATED) {
        None | Some(Value::Null) => None,
        Some(Value::String(raw)) => Some(
            DateTime::parse_from_rfc3339(raw)
                .map_err(|err| malformed(format!("`lastUpdated` is not RFC 3339: {err}")))?
                .with_timezone(&Utc),
        ),
        Some(other) => {
            return Err(malformed(format!("`lastUpdated` is not a string: {other}")));
        }
    };

    Ok(VibePrompt {
        owner_id: owner_id.to_string(),
        text,
        last_updated,
    })
}
