//! `/model`: create, update and read model configurations

use super::{CodedError, ErrorClass};
use crate::models::{ModelArgs, ModelReadResponse, ModelWriteResponse, RecordIds};
use crate::registry::{ConfigurationError, ModelConfiguration, ModelRegistry, StoreError};
use std::sync::Arc;
use thiserror::Error;
use tracing::error;

#[derive(Debug, Error)]
pub enum ModelError {
    #[error("Invalid `model` argument: {0}")]
    InvalidArgs(String),

    #[error("Model `{0}` already exists")]
    AlreadyExists(String),

    #[error("Model `{0}` does not exist")]
    NotFound(String),

    #[error("Model registry operation failed")]
    StoreFailed(StoreError),
}

impl CodedError for ModelError {
    fn code(&self) -> u16 {
        match self {
            ModelError::InvalidArgs(_) => 400,
            ModelError::AlreadyExists(_) => 401,
            ModelError::NotFound(_) => 402,
            ModelError::StoreFailed(_) => 403,
        }
    }

    fn class(&self) -> ErrorClass {
        match self {
            ModelError::InvalidArgs(_) => ErrorClass::ClientInput,
            ModelError::AlreadyExists(_) => ErrorClass::Conflict,
            ModelError::NotFound(_) => ErrorClass::NotFound,
            ModelError::StoreFailed(_) => ErrorClass::Store,
        }
    }
}

impl From<ConfigurationError> for ModelError {
    fn from(err: ConfigurationError) -> Self {
        ModelError::InvalidArgs(err.to_string())
    }
}

fn store_failed<'a>(
    operation: &'static str,
    model: &'a str,
) -> impl FnOnce(StoreError) -> ModelError + 'a {
    move |e| {
        error!(model = %model, operation = %operation, error = %e, "Model registry operation failed");
        ModelError::StoreFailed(e)
    }
}

/// Model configuration resource
pub struct ModelResource {
    registry: Arc<ModelRegistry>,
}

impl ModelResource {
    pub fn new(registry: Arc<ModelRegistry>) -> Self {
        Self { registry }
    }

    fn model_arg(args: &ModelArgs) -> Result<&str, ModelError> {
        args.model
            .as_deref()
            .ok_or_else(|| ModelError::InvalidArgs("`model` is required".to_string()))
    }

    /// `POST`: store a configuration whose name is not taken yet
    pub fn create(&self, args: &ModelArgs) -> Result<ModelWriteResponse, ModelError> {
        let text = Self::model_arg(args)?;
        let configuration = ModelConfiguration::from_json(text)?;
        let name = configuration.name();

        let id = self.registry.with_name_lock(name, || {
            if self
                .registry
                .get(name)
                .map_err(store_failed("get", name))?
                .is_some()
            {
                return Err(ModelError::AlreadyExists(name.to_string()));
            }
            self.registry
                .create(&configuration)
                .map_err(store_failed("create", name))
        })?;

        Ok(ModelWriteResponse {
            id: RecordIds::One(id),
            model: text.to_string(),
        })
    }

    /// `PUT`: merge into an existing configuration
    pub fn update(&self, args: &ModelArgs) -> Result<ModelWriteResponse, ModelError> {
        let text = Self::model_arg(args)?;
        let configuration = ModelConfiguration::from_json(text)?;
        let name = configuration.name();

        let ids = self.registry.with_name_lock(name, || {
            if self
                .registry
                .get(name)
                .map_err(store_failed("get", name))?
                .is_none()
            {
                return Err(ModelError::NotFound(name.to_string()));
            }
            self.registry
                .update(&configuration)
                .map_err(store_failed("update", name))
        })?;

        Ok(ModelWriteResponse {
            id: RecordIds::Many(ids),
            model: text.to_string(),
        })
    }

    /// `GET`: read a configuration
    ///
    /// `model` is either a bare name or a configuration whose `name` is used.
    pub fn read(&self, args: &ModelArgs) -> Result<ModelReadResponse, ModelError> {
        let text = Self::model_arg(args)?;
        let name = match ModelConfiguration::from_json(text) {
            Ok(configuration) => configuration.name().to_string(),
            Err(ConfigurationError::Json(_) | ConfigurationError::NotAnObject) => {
                text.to_string()
            }
            Err(e) => return Err(e.into()),
        };

        let configuration = self
            .registry
            .get(&name)
            .map_err(store_failed("get", &name))?
            .ok_or_else(|| ModelError::NotFound(name.clone()))?;

        Ok(ModelReadResponse {
            record: configuration.to_json(),
            model: text.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::JsonDocumentStore;
    use serde_json::{json, Value};

    fn resource() -> ModelResource {
        ModelResource::new(Arc::new(ModelRegistry::new(Arc::new(
            JsonDocumentStore::in_memory(),
        ))))
    }

    fn args(model: Value) -> ModelArgs {
        ModelArgs {
            model: Some(model.to_string()),
        }
    }

    #[test]
    fn test_create_is_exclusive() {
        let resource = resource();
        let sent = r#"{"v": 1, "name": "m1"}"#;
        let created = resource
            .create(&ModelArgs {
                model: Some(sent.to_string()),
            })
            .unwrap();
        assert_eq!(created.id, RecordIds::One(1));
        assert_eq!(created.model, sent);

        let err = resource
            .create(&args(json!({"name": "m1", "v": 2})))
            .unwrap_err();
        assert_eq!(err.code(), 401);
        assert_eq!(err.class(), ErrorClass::Conflict);

        let updated = resource.update(&args(json!({"name": "m1", "v": 3}))).unwrap();
        assert_eq!(updated.id, RecordIds::Many(vec![1]));
        assert_eq!(updated.model, json!({"name": "m1", "v": 3}).to_string());

        let read = resource.read(&args(json!({"name": "m1"}))).unwrap();
        let record: Value = serde_json::from_str(&read.record).unwrap();
        assert_eq!(record, json!({"name": "m1", "v": 3}));
    }

    #[test]
    fn test_update_missing_model() {
        let err = resource()
            .update(&args(json!({"name": "never-created"})))
            .unwrap_err();
        assert_eq!(err.code(), 402);
    }

    #[test]
    fn test_read_by_bare_name() {
        let resource = resource();
        resource.create(&args(json!({"name": "m"}))).unwrap();

        let read = resource
            .read(&ModelArgs {
                model: Some("m".to_string()),
            })
            .unwrap();
        assert_eq!(read.model, "m");
        assert_eq!(resource.read(&ModelArgs { model: Some("x".into()) }).unwrap_err().code(), 402);
    }

    #[test]
    fn test_invalid_args() {
        let resource = resource();
        assert_eq!(resource.create(&ModelArgs::default()).unwrap_err().code(), 400);
        assert_eq!(resource.create(&args(json!({"no_name": 1}))).unwrap_err().code(), 400);
        assert_eq!(
            resource
                .update(&ModelArgs {
                    model: Some("{oops".into())
                })
                .unwrap_err()
                .code(),
            400
        );
        assert_eq!(resource.read(&args(json!({"no_name": 1}))).unwrap_err().code(), 400);
    }

    #[test]
    fn test_concurrent_creates_single_winner() {
        let resource = Arc::new(resource());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let resource = resource.clone();
                std::thread::spawn(move || resource.create(&args(json!({"name": "race"}))).is_ok())
            })
            .collect();
        let winners = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|ok| *ok)
            .count();
        assert_eq!(winners, 1);
    }

    #[test]
    fn test_name_locks_pruned_after_writes() {
        let registry = Arc::new(ModelRegistry::new(Arc::new(JsonDocumentStore::in_memory())));
        let resource = ModelResource::new(registry.clone());

        for i in 0..5 {
            resource.create(&args(json!({"name": format!("m{}", i)}))).unwrap();
        }
        resource.update(&args(json!({"name": "m0", "v": 2}))).unwrap();
        assert!(resource.create(&args(json!({"name": "m1"}))).is_err());
        assert!(resource.update(&args(json!({"name": "ghost"}))).is_err());

        assert_eq!(registry.locked_names(), 0);
    }
}
