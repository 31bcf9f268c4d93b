//! Document store backing the model registry
//!
//! [`JsonDocumentStore`] keeps named collections of JSON documents with
//! integer ids and persists them as one JSON file laid out as
//! `{"<collection>": {"<id>": {...}, ...}, ...}`.

use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use thiserror::Error;
use tracing::{debug, info};

/// Document identifier, unique within a collection
pub type DocId = u64;

/// JSON object document
pub type Document = Map<String, Value>;

type Collections = BTreeMap<String, BTreeMap<DocId, Document>>;

/// Document store errors
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("failed to read document store {path:?}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to write document store {path:?}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("document store {path:?} is corrupt: {source}")]
    Corrupt {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("failed to serialize document store: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("invalid document in `{collection}`: {reason}")]
    InvalidDocument { collection: String, reason: String },

    #[error("document store lock poisoned")]
    Poisoned,
}

/// Storage seam of the model registry
pub trait DocumentStore: Send + Sync {
    /// First document of `collection` whose `field` equals `value`
    fn find(
        &self,
        collection: &str,
        field: &str,
        value: &Value,
    ) -> Result<Option<(DocId, Document)>, StoreError>;

    /// Insert a document, returning its new id
    fn insert(&self, collection: &str, document: Document) -> Result<DocId, StoreError>;

    /// Merge `fields` into every document whose `field` equals `value`,
    /// returning the ids of the updated documents
    fn update(
        &self,
        collection: &str,
        field: &str,
        value: &Value,
        fields: Document,
    ) -> Result<Vec<DocId>, StoreError>;
}

/// JSON-file document store
///
/// Every write is persisted atomically before it becomes visible to
/// readers; a failed write leaves both the file and the in-memory state
/// untouched.
pub struct JsonDocumentStore {
    path: Option<PathBuf>,
    state: Mutex<Collections>,
}

impl JsonDocumentStore {
    /// Open (or lazily create) the store file at `path`
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        let state = load_from_disk(&path)?;
        info!(
            path = %path.display(),
            collections = state.len(),
            "Document store opened"
        );
        Ok(Self {
            path: Some(path),
            state: Mutex::new(state),
        })
    }

    /// Store that never touches disk
    pub fn in_memory() -> Self {
        Self {
            path: None,
            state: Mutex::new(Collections::new()),
        }
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Number of documents in `collection`
    pub fn count(&self, collection: &str) -> Result<usize, StoreError> {
        let state = self.state.lock().map_err(|_| StoreError::Poisoned)?;
        Ok(state.get(collection).map(BTreeMap::len).unwrap_or(0))
    }

    /// Apply `mutate` to a copy of the state, persist it, then publish it.
    fn commit<R>(
        &self,
        mutate: impl FnOnce(&mut Collections) -> Result<R, StoreError>,
    ) -> Result<R, StoreError> {
        let mut state = self.state.lock().map_err(|_| StoreError::Poisoned)?;
        let mut next = state.clone();
        let result = mutate(&mut next)?;
        if let Some(path) = &self.path {
            save_to_disk(path, &next)?;
        }
        *state = next;
        Ok(result)
    }
}

impl DocumentStore for JsonDocumentStore {
    fn find(
        &self,
        collection: &str,
        field: &str,
        value: &Value,
    ) -> Result<Option<(DocId, Document)>, StoreError> {
        let state = self.state.lock().map_err(|_| StoreError::Poisoned)?;
        let found = state.get(collection).and_then(|documents| {
            documents
                .iter()
                .find(|(_, doc)| doc.get(field) == Some(value))
                .map(|(id, doc)| (*id, doc.clone()))
        });
        Ok(found)
    }

    fn insert(&self, collection: &str, document: Document) -> Result<DocId, StoreError> {
        let id = self.commit(|state| {
            let documents = state.entry(collection.to_string()).or_default();
            let id = documents.keys().next_back().map_or(1, |last| last + 1);
            documents.insert(id, document);
            Ok(id)
        })?;
        debug!(collection, id, "Document inserted");
        Ok(id)
    }

    fn update(
        &self,
        collection: &str,
        field: &str,
        value: &Value,
        fields: Document,
    ) -> Result<Vec<DocId>, StoreError> {
        let matches = {
            let state = self.state.lock().map_err(|_| StoreError::Poisoned)?;
            state
                .get(collection)
                .map(|documents| {
                    documents
                        .iter()
                        .filter(|(_, doc)| doc.get(field) == Some(value))
                        .count()
                })
                .unwrap_or(0)
        };
        if matches == 0 {
            return Ok(Vec::new());
        }

        let ids = self.commit(|state| {
            let mut ids = Vec::new();
            if let Some(documents) = state.get_mut(collection) {
                for (id, doc) in documents.iter_mut() {
                    if doc.get(field) == Some(value) {
                        for (key, v) in &fields {
                            doc.insert(key.clone(), v.clone());
                        }
                        ids.push(*id);
                    }
                }
            }
            Ok(ids)
        })?;
        debug!(collection, ids = ?ids, "Documents updated");
        Ok(ids)
    }
}

fn load_from_disk(path: &Path) -> Result<Collections, StoreError> {
    let data = match std::fs::read(path) {
        Ok(data) => data,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Collections::new()),
        Err(source) => {
            return Err(StoreError::Read {
                path: path.to_path_buf(),
                source,
            })
        }
    };
    if data.iter().all(u8::is_ascii_whitespace) {
        return Ok(Collections::new());
    }
    serde_json::from_slice(&data).map_err(|source| StoreError::Corrupt {
        path: path.to_path_buf(),
        source,
    })
}

fn save_to_disk(path: &Path, state: &Collections) -> Result<(), StoreError> {
    let write_error = |source| StoreError::Write {
        path: path.to_path_buf(),
        source,
    };

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(write_error)?;
    }

    let json = serde_json::to_vec(state)?;

    // Write atomically using temp file
    let temp_path = path.with_extension("tmp");
    let mut file = OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .open(&temp_path)
        .map_err(write_error)?;
    file.write_all(&json).map_err(write_error)?;
    file.sync_all().map_err(write_error)?;

    std::fs::rename(&temp_path, path).map_err(write_error)?;
    Ok(())
}
