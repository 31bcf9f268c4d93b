//! Model configuration registry
//!
//! Model configurations are JSON objects identified by their `name` field,
//! stored in the `predictor` collection of a [`DocumentStore`].

mod store;

pub use store::{DocId, Document, DocumentStore, JsonDocumentStore, StoreError};

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::{Arc, Mutex};
use thiserror::Error;

/// Collection holding model configurations
pub const COLLECTION: &str = "predictor";

/// Field identifying a model configuration
pub const NAME_FIELD: &str = "name";

/// Invalid model configuration
#[derive(Debug, Error)]
pub enum ConfigurationError {
    #[error("model configuration is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("model configuration must be a JSON object")]
    NotAnObject,

    #[error("model configuration has no string `name`")]
    MissingName,
}

/// Model configuration: a JSON object with at least a string `name`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Value", into = "Value")]
pub struct ModelConfiguration(Document);

impl ModelConfiguration {
    /// Parse a configuration from JSON text
    pub fn from_json(text: &str) -> Result<Self, ConfigurationError> {
        let value: Value = serde_json::from_str(text)?;
        Self::try_from(value)
    }

    pub fn from_document(document: Document) -> Result<Self, ConfigurationError> {
        match document.get(NAME_FIELD) {
            Some(Value::String(_)) => Ok(Self(document)),
            _ => Err(ConfigurationError::MissingName),
        }
    }

    pub fn name(&self) -> &str {
        self.0
            .get(NAME_FIELD)
            .and_then(Value::as_str)
            .unwrap_or_default()
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn as_document(&self) -> &Document {
        &self.0
    }

    pub fn into_document(self) -> Document {
        self.0
    }

    /// Compact JSON text of the configuration
    pub fn to_json(&self) -> String {
        Value::Object(self.0.clone()).to_string()
    }
}

impl TryFrom<Value> for ModelConfiguration {
    type Error = ConfigurationError;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        match value {
            Value::Object(document) => Self::from_document(document),
            _ => Err(ConfigurationError::NotAnObject),
        }
    }
}

impl From<ModelConfiguration> for Value {
    fn from(configuration: ModelConfiguration) -> Self {
        Value::Object(configuration.0)
    }
}

/// Outcome of [`ModelRegistry::set`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SetOutcome {
    Created(DocId),
    Updated(Vec<DocId>),
}

/// Name-keyed access to model configurations
pub struct ModelRegistry {
    store: Arc<dyn DocumentStore>,
    locks: DashMap<String, Arc<Mutex<()>>>,
}

impl ModelRegistry {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self {
            store,
            locks: DashMap::new(),
        }
    }

    /// Configuration stored under `name`
    pub fn get(&self, name: &str) -> Result<Option<ModelConfiguration>, StoreError> {
        let Some((id, document)) = self
            .store
            .find(COLLECTION, NAME_FIELD, &Value::from(name))?
        else {
            return Ok(None);
        };
        ModelConfiguration::from_document(document)
            .map(Some)
            .map_err(|e| StoreError::InvalidDocument {
                collection: COLLECTION.to_string(),
                reason: format!("document {}: {}", id, e),
            })
    }

    /// Insert a new configuration
    pub fn create(&self, configuration: &ModelConfiguration) -> Result<DocId, StoreError> {
        self.store
            .insert(COLLECTION, configuration.as_document().clone())
    }

    /// Merge a configuration into the stored one(s) with the same name
    pub fn update(&self, configuration: &ModelConfiguration) -> Result<Vec<DocId>, StoreError> {
        self.store.update(
            COLLECTION,
            NAME_FIELD,
            &Value::from(configuration.name()),
            configuration.as_document().clone(),
        )
    }

    /// Update when a configuration with the same name exists, create otherwise
    pub fn set(&self, configuration: &ModelConfiguration) -> Result<SetOutcome, StoreError> {
        if self.get(configuration.name())?.is_some() {
            self.update(configuration).map(SetOutcome::Updated)
        } else {
            self.create(configuration).map(SetOutcome::Created)
        }
    }

    /// Lock serializing check-then-write sequences on one model name
    pub fn lock_name(&self, name: &str) -> Arc<Mutex<()>> {
        self.locks
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Run `f` holding the lock of `name`, then drop the lock entry unless
    /// another caller still holds or awaits it.
    pub fn with_name_lock<T>(&self, name: &str, f: impl FnOnce() -> T) -> T {
        let lock = self.lock_name(name);
        let result = {
            let _guard = lock.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
            f()
        };
        drop(lock);
        // Clones are taken under the shard lock, so a count of one is final
        self.locks
            .remove_if(name, |_, lock| Arc::strong_count(lock) == 1);
        result
    }

    /// Number of names with a live lock entry
    pub fn locked_names(&self) -> usize {
        self.locks.len()
    }
}
