//! Pluggable computation backends
//!
//! A backend is selected by name at service start and exposes capabilities
//! under well-known symbols: [`FEATURES_EXTRACTOR`] for a features extractor
//! factory and [`PREDICTOR`] for a model artifact format. Backends are
//! registered in a [`BackendRegistry`]; resolution happens once and its
//! failures leave the service running without a backend.

pub mod elementwise;
mod resolver;
pub mod summary;

pub use resolver::{
    extract_artifact_format, extract_capability, extract_extractor_factory, BackendLoader,
    BackendRegistry, PluginError,
};

use crate::predictor::ArtifactFormat;
use crate::table::Table;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Symbol of the features extractor capability
pub const FEATURES_EXTRACTOR: &str = "FeaturesExtractor";

/// Symbol of the predictor artifact format capability
pub const PREDICTOR: &str = "Predictor";

/// Request metadata passed through to extractors
pub type Meta = Map<String, Value>;

/// Configured features extractor
pub trait FeaturesExtractor: Send + Sync {
    /// Compute a features table from raw data
    fn compute(&self, data: &Table, meta: &Meta) -> anyhow::Result<Table>;
}

/// Builds extractors from the request's configuration string
pub trait ExtractorFactory: Send + Sync {
    fn create(&self, configuration: &str) -> anyhow::Result<Box<dyn FeaturesExtractor>>;
}

/// Capability exposed by a backend
#[derive(Clone)]
pub enum Capability {
    FeaturesExtractor(Arc<dyn ExtractorFactory>),
    Predictor(Arc<dyn ArtifactFormat>),
}

impl fmt::Debug for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Capability::FeaturesExtractor(_) => f.write_str("Capability::FeaturesExtractor"),
            Capability::Predictor(format) => {
                write!(f, "Capability::Predictor({})", format.extension())
            }
        }
    }
}

/// Resolved backend handle
pub trait Backend: Send + Sync {
    fn name(&self) -> &str;

    /// Capability exposed under `symbol`, if any
    fn capability(&self, symbol: &str) -> Option<Capability>;
}

/// Backend with a fixed set of capabilities
pub struct StaticBackend {
    name: String,
    capabilities: HashMap<String, Capability>,
}

impl StaticBackend {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            capabilities: HashMap::new(),
        }
    }

    pub fn with_capability(mut self, symbol: impl Into<String>, capability: Capability) -> Self {
        self.capabilities.insert(symbol.into(), capability);
        self
    }
}

impl Backend for StaticBackend {
    fn name(&self) -> &str {
        &self.name
    }

    fn capability(&self, symbol: &str) -> Option<Capability> {
        self.capabilities.get(symbol).cloned()
    }
}
