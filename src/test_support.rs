use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use serde_json::{json, Value};
use tokio::sync::Notify;

use crate::config::GenerationConfig;
use crate::generation::{GenerationTransport, HttpReply, InvocationResult};
use crate::store::{
    Document, DocumentPath, DocumentStore, DocumentStream, LocalDocumentStore, StoreError,
    StoreResult,
};

#[derive(Debug, Clone)]
pub(crate) struct RecordedCall {
    pub url: String,
    pub api_key: String,
    pub body: Value,
}

/// Transport that answers from a fixed script and records every request.
#[derive(Clone, Default)]
pub(crate) struct ScriptedTransport {
    replies: Arc<Mutex<VecDeque<InvocationResult<HttpReply>>>>,
    calls: Arc<Mutex<Vec<RecordedCall>>>,
    gate: Option<Arc<Notify>>,
}

impl ScriptedTransport {
    pub fn new(replies: Vec<InvocationResult<HttpReply>>) -> Self {
        Self {
            replies: Arc::new(Mutex::new(replies.into())),
            ..Self::default()
        }
    }

    /// Each request waits for one `notify_one` on the gate before answering.
    pub fn gated(replies: Vec<InvocationResult<HttpReply>>, gate: Arc<Notify>) -> Self {
        Self {
            gate: Some(gate),
            ..Self::new(replies)
        }
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().expect("calls lock").clone()
    }
}

#[async_trait]
impl GenerationTransport for ScriptedTransport {
    async fn post_json(&self, url: &str, api_key: &str, body: &Value) -> InvocationResult<HttpReply> {
        self.calls.lock().expect("calls lock").push(RecordedCall {
            url: url.to_string(),
            api_key: api_key.to_string(),
            body: body.clone(),
        });
        if let Some(gate) = &self.gate {
            gate.notified().await;
        }
        self.replies
            .lock()
            .expect("replies lock")
            .pop_front()
            .unwrap_or_else(|| status_reply(599))
    }
}

pub(crate) fn generation_config() -> GenerationConfig {
    GenerationConfig {
        endpoint: "https://generation.test/v1beta".to_string(),
        model: "test-model".to_string(),
        api_key: "test-key".to_string(),
        timeout: None,
    }
}

pub(crate) fn image_reply(data: &str, mime_type: &str) -> InvocationResult<HttpReply> {
    Ok(HttpReply {
        status: 200,
        body: json!({
            "candidates": [{
                "content": {
                    "parts": [
                        { "text": "done" },
                        { "inlineData": { "mimeType": mime_type, "data": data } }
                    ]
                }
            }]
        })
        .to_string(),
    })
}

pub(crate) fn status_reply(status: u16) -> InvocationResult<HttpReply> {
    Ok(HttpReply {
        status,
        body: json!({ "error": { "code": status } }).to_string(),
    })
}

pub(crate) fn text_only_reply() -> InvocationResult<HttpReply> {
    Ok(HttpReply {
        status: 200,
        body: json!({ "candidates": [{ "content": { "parts": [{ "text": "no image" }] } }] })
            .to_string(),
    })
}

/// Document store whose writes always fail and whose subscriptions
/// report a single error.
#[derive(Debug, Default)]
pub(crate) struct FailingStore;

#[async_trait]
impl DocumentStore for FailingStore {
    fn subscribe(&self, _path: &DocumentPath) -> DocumentStream {
        stream::once(async {
            Err(StoreError::Unavailable {
                message: "network unreachable".to_string(),
            })
        })
        .chain(stream::pending())
        .boxed()
    }

    async fn merge(&self, _path: &DocumentPath, _fields: Document) -> StoreResult<()> {
        Err(StoreError::Unavailable {
            message: "network unreachable".to_string(),
        })
    }
}

/// In-memory store that counts merge calls.
pub(crate) struct CountingStore {
    inner: LocalDocumentStore,
    merges: AtomicUsize,
}

impl CountingStore {
    pub fn new() -> Self {
        Self {
            inner: LocalDocumentStore::in_memory(),
            merges: AtomicUsize::new(0),
        }
    }

    pub fn merges(&self) -> usize {
        self.merges.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DocumentStore for CountingStore {
    fn subscribe(&self, path: &DocumentPath) -> DocumentStream {
        self.inner.subscribe(path)
    }

    async fn merge(&self, path: &DocumentPath, fields: Document) -> StoreResult<()> {
        self.merges.fetch_add(1, Ordering::SeqCst);
        self.inner.merge(path, fields).await
    }
}
