//! Backend registration and resolution

use super::{
    elementwise, summary, Backend, Capability, ExtractorFactory, StaticBackend,
    FEATURES_EXTRACTOR, PREDICTOR,
};
use crate::guarded;
use crate::predictor::{ArtifactFormat, LinearFormat, OnnxFormat};
use std::collections::BTreeMap;
use std::sync::Arc;
use thiserror::Error;
use tracing::{error, info};

/// Constructs a backend on resolution
pub type BackendLoader = Box<dyn Fn() -> anyhow::Result<Arc<dyn Backend>> + Send + Sync>;

/// Capability lookup errors
#[derive(Debug, Error)]
pub enum PluginError {
    #[error("backend `{backend}` exposes no `{symbol}` capability")]
    NoCapabilityFound { backend: String, symbol: String },
}

/// Named backend loaders
pub struct BackendRegistry {
    loaders: BTreeMap<String, BackendLoader>,
}

impl BackendRegistry {
    /// Registry without any backend
    pub fn empty() -> Self {
        Self {
            loaders: BTreeMap::new(),
        }
    }

    /// Registry with the bundled backends
    pub fn with_builtins() -> Self {
        let mut registry = Self::empty();
        registry.register(summary::BACKEND_NAME, || Ok(summary::backend()));
        registry.register(elementwise::BACKEND_NAME, || Ok(elementwise::backend()));
        registry.register("onnx", || {
            Ok(Arc::new(StaticBackend::new("onnx").with_capability(
                PREDICTOR,
                Capability::Predictor(Arc::new(OnnxFormat)),
            )))
        });
        registry.register("linear", || {
            Ok(Arc::new(StaticBackend::new("linear").with_capability(
                PREDICTOR,
                Capability::Predictor(Arc::new(LinearFormat)),
            )))
        });
        registry
    }

    pub fn register<F>(&mut self, name: impl Into<String>, loader: F)
    where
        F: Fn() -> anyhow::Result<Arc<dyn Backend>> + Send + Sync + 'static,
    {
        self.loaders.insert(name.into(), Box::new(loader));
    }

    /// Registered backend names
    pub fn names(&self) -> Vec<&str> {
        self.loaders.keys().map(String::as_str).collect()
    }

    /// Resolve the backend registered under `name`
    ///
    /// Never fails: an absent name, an unknown backend or a loader that
    /// errors or panics is logged and yields `None`.
    pub fn resolve_backend(&self, name: Option<&str>) -> Option<Arc<dyn Backend>> {
        let Some(name) = name.map(str::trim).filter(|n| !n.is_empty()) else {
            error!("Backend library not specified");
            return None;
        };

        let Some(loader) = self.loaders.get(name) else {
            error!(
                backend = name,
                available = ?self.names(),
                "Backend library not found"
            );
            return None;
        };

        match guarded(|| loader()) {
            Ok(backend) => {
                info!(backend = name, "Backend library resolved");
                Some(backend)
            }
            Err(e) => {
                error!(backend = name, error = %format!("{:#}", e), "Backend library failed to load");
                None
            }
        }
    }
}

impl Default for BackendRegistry {
    fn default() -> Self {
        Self::with_builtins()
    }
}

/// Capability of `handle` exposed under `symbol`
pub fn extract_capability(handle: &dyn Backend, symbol: &str) -> Result<Capability, PluginError> {
    handle
        .capability(symbol)
        .ok_or_else(|| not_found(handle, symbol))
}

/// Features extractor factory of `handle`
pub fn extract_extractor_factory(
    handle: &dyn Backend,
) -> Result<Arc<dyn ExtractorFactory>, PluginError> {
    match extract_capability(handle, FEATURES_EXTRACTOR)? {
        Capability::FeaturesExtractor(factory) => Ok(factory),
        _ => Err(not_found(handle, FEATURES_EXTRACTOR)),
    }
}

/// Artifact format of `handle`
pub fn extract_artifact_format(
    handle: &dyn Backend,
) -> Result<Arc<dyn ArtifactFormat>, PluginError> {
    match extract_capability(handle, PREDICTOR)? {
        Capability::Predictor(format) => Ok(format),
        _ => Err(not_found(handle, PREDICTOR)),
    }
}

fn not_found(handle: &dyn Backend, symbol: &str) -> PluginError {
    PluginError::NoCapabilityFound {
        backend: handle.name().to_string(),
        symbol: symbol.to_string(),
    }
}
