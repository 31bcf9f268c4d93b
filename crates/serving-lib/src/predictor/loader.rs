//! Artifact discovery and predictor loading

use super::{ArtifactFormat, ArtifactStamp, Predictor, PredictorCache, PredictorError};
use crate::guarded;
use crate::registry::ModelConfiguration;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Result of a successful load
pub struct LoadedPredictor {
    pub predictor: Arc<dyn Predictor>,
    /// SHA-256 of the artifact bytes; `None` when served from the cache
    pub fingerprint: Option<String>,
    pub from_cache: bool,
}

/// Loads predictors for model configurations from the models directory
pub struct PredictorLoader {
    models_dir: PathBuf,
    format: Arc<dyn ArtifactFormat>,
    cache: Option<PredictorCache>,
}

impl PredictorLoader {
    pub fn new(models_dir: impl Into<PathBuf>, format: Arc<dyn ArtifactFormat>) -> Self {
        Self {
            models_dir: models_dir.into(),
            format,
            cache: None,
        }
    }

    /// Keep deserialized predictors in memory between requests
    pub fn with_cache(mut self, cache: PredictorCache) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn models_dir(&self) -> &Path {
        &self.models_dir
    }

    pub fn extension(&self) -> &str {
        self.format.extension()
    }

    /// Path of the artifact for `name`
    pub fn artifact_path(&self, name: &str) -> PathBuf {
        self.models_dir
            .join(format!("{}.{}", name, self.format.extension()))
    }

    /// Names of the artifacts directly inside the models directory
    pub fn available_models(&self) -> Vec<String> {
        let entries = match std::fs::read_dir(&self.models_dir) {
            Ok(entries) => entries,
            Err(e) => {
                if e.kind() != std::io::ErrorKind::NotFound {
                    warn!(dir = ?self.models_dir, error = %e, "Failed to scan models directory");
                }
                return Vec::new();
            }
        };

        let extension = self.format.extension();
        let mut names: Vec<String> = entries
            .filter_map(Result::ok)
            .map(|entry| entry.path())
            .filter(|path| path.is_file())
            .filter(|path| path.extension().and_then(|e| e.to_str()) == Some(extension))
            .filter_map(|path| {
                path.file_stem()
                    .and_then(|s| s.to_str())
                    .map(str::to_string)
            })
            .collect();
        names.sort();
        names
    }

    /// Load the predictor named by `configuration`
    pub fn load(
        &self,
        configuration: &ModelConfiguration,
    ) -> Result<LoadedPredictor, PredictorError> {
        let name = configuration.name();
        if !self.available_models().iter().any(|m| m == name) {
            return Err(PredictorError::NoLoadablePredictor(name.to_string()));
        }

        let path = self.artifact_path(name);
        let io_error = |source| PredictorError::Io {
            path: path.clone(),
            source,
        };
        let stamp = ArtifactStamp::of(&path).map_err(io_error)?;

        if let Some(cache) = &self.cache {
            if let Some(predictor) = cache.get(name, stamp) {
                debug!(model = name, "Predictor served from cache");
                return Ok(LoadedPredictor {
                    predictor,
                    fingerprint: None,
                    from_cache: true,
                });
            }
        }

        let bytes = std::fs::read(&path).map_err(io_error)?;
        let fingerprint = hex::encode(Sha256::digest(&bytes));

        let predictor: Arc<dyn Predictor> = guarded(|| self.format.deserialize(&bytes))
            .map(Arc::from)
            .map_err(|detail| PredictorError::Deserialize {
                model: name.to_string(),
                detail,
            })?;

        info!(
            model = name,
            fingerprint = %fingerprint,
            size_bytes = bytes.len(),
            "Predictor loaded"
        );

        if let Some(cache) = &self.cache {
            cache.insert(name, stamp, predictor.clone());
        }

        Ok(LoadedPredictor {
            predictor,
            fingerprint: Some(fingerprint),
            from_cache: false,
        })
    }
}
