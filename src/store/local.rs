use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use serde_json::Value;
use tokio::sync::watch;
use tokio_stream::wrappers::WatchStream;

use super::{Document, DocumentPath, DocumentStore, DocumentStream, StoreError, StoreResult};

const DOCUMENTS_SUBDIR: &str = "documents";
const DOCUMENT_EXTENSION: &str = "json";

/// Document store kept as JSON files under a data directory, or in memory only.
///
/// Every known document has a watch channel; subscribers receive the value
/// current at subscription time and each later merge.
pub struct LocalDocumentStore {
    root: Option<PathBuf>,
    documents: Mutex<HashMap<DocumentPath, watch::Sender<Option<Document>>>>,
}

impl LocalDocumentStore {
    pub fn with_root(data_dir: &Path) -> Self {
        Self {
            root: Some(data_dir.join(DOCUMENTS_SUBDIR)),
            documents: Mutex::new(HashMap::new()),
        }
    }

    pub fn in_memory() -> Self {
        Self {
            root: None,
            documents: Mutex::new(HashMap::new()),
        }
    }

    fn documents(&self) -> MutexGuard<'_, HashMap<DocumentPath, watch::Sender<Option<Document>>>> {
        self.documents
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn file_path(&self, path: &DocumentPath) -> StoreResult<Option<PathBuf>> {
        let Some(root) = &self.root else {
            return Ok(None);
        };
        let segments = path.segments();
        let valid = !segments.is_empty()
            && segments.iter().all(|segment| {
                !segment.is_empty()
                    && segment != "."
                    && segment != ".."
                    && !segment.contains(['/', '\\'])
            });
        if !valid {
            return Err(StoreError::InvalidPath {
                path: path.to_string(),
            });
        }

        let mut file = root.clone();
        for segment in segments {
            file.push(segment);
        }
        file.set_extension(DOCUMENT_EXTENSION);
        Ok(Some(file))
    }

    fn read_document(&self, path: &DocumentPath) -> StoreResult<Option<Document>> {
        let Some(file) = self.file_path(path)? else {
            return Ok(None);
        };
        let contents = match fs::read_to_string(&file) {
            Ok(contents) => contents,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(source) => return Err(StoreError::Io { path: file, source }),
        };
        match serde_json::from_str::<Value>(&contents) {
            Ok(Value::Object(document)) => Ok(Some(document)),
            Ok(_) => Err(StoreError::NotAnObject {
                path: path.to_string(),
            }),
            Err(source) => Err(StoreError::Parse { path: file, source }),
        }
    }

    fn write_document(&self, path: &DocumentPath, document: &Document) -> StoreResult<()> {
        let Some(file) = self.file_path(path)? else {
            return Ok(());
        };
        let io_error = |source| StoreError::Io {
            path: file.clone(),
            source,
        };
        if let Some(parent) = file.parent() {
            fs::create_dir_all(parent).map_err(io_error)?;
        }
        let contents = serde_json::to_string_pretty(document).map_err(|source| StoreError::Parse {
            path: file.clone(),
            source,
        })?;

        let staging = file.with_extension("json.tmp");
        fs::write(&staging, contents).map_err(io_error)?;
        fs::rename(&staging, &file).map_err(io_error)
    }
}

#[async_trait]
impl DocumentStore for LocalDocumentStore {
    fn subscribe(&self, path: &DocumentPath) -> DocumentStream {
        let mut documents = self.documents();
        if let Some(sender) = documents.get(path) {
            return WatchStream::new(sender.subscribe()).map(Ok).boxed();
        }

        match self.read_document(path) {
            Ok(initial) => {
                let (sender, receiver) = watch::channel(initial);
                documents.insert(path.clone(), sender);
                WatchStream::new(receiver).map(Ok).boxed()
            }
            Err(err) => {
                tracing::warn!(?err, %path, "failed to load document for subscription");
                let (sender, receiver) = watch::channel(None);
                documents.insert(path.clone(), sender);
                stream::once(async move { Err(err) })
                    .chain(WatchStream::from_changes(receiver).map(Ok))
                    .boxed()
            }
        }
    }

    async fn merge(&self, path: &DocumentPath, fields: Document) -> StoreResult<()> {
        let mut documents = self.documents();
        let current = match documents.get(path) {
            Some(sender) => sender.borrow().clone(),
            None => self.read_document(path)?,
        };

        let mut merged = current.unwrap_or_default();
        merged.extend(fields);
        self.write_document(path, &merged)?;
        tracing::debug!(%path, fields = merged.len(), "merged document");

        documents
            .entry(path.clone())
            .or_insert_with(|| watch::channel(None).0)
            .send_replace(Some(merged));
        Ok(())
    }
}
