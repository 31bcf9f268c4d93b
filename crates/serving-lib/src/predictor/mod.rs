//! Model predictors
//!
//! A predictor is a deserialized model artifact exposing `predict` and
//! `predict_proba` over a [`Table`]. Artifacts are files named
//! `<model-name>.<extension>` in the models directory; the
//! [`ArtifactFormat`] chosen at service start decides the extension and how
//! the bytes turn into a predictor.

mod cache;
mod linear;
mod loader;
mod onnx;

pub use cache::{ArtifactStamp, PredictorCache};
pub use linear::{LinearFormat, LinearModel, LinearPredictor};
pub use loader::{LoadedPredictor, PredictorLoader};
pub use onnx::{OnnxFormat, OnnxPredictor};

use crate::table::Table;
use anyhow::Result;
use std::path::PathBuf;
use thiserror::Error;

/// Trait for prediction implementations
pub trait Predictor: Send + Sync {
    /// Predict the target value(s) or class(es) for every row
    fn predict(&self, features: &Table) -> Result<Table>;

    /// Predict the per-class probabilities for every row
    fn predict_proba(&self, features: &Table) -> Result<Table>;
}

/// Serialized artifact format
pub trait ArtifactFormat: Send + Sync {
    /// File extension (without the dot) of artifacts in this format
    fn extension(&self) -> &str;

    /// Deserialize artifact bytes into a predictor
    fn deserialize(&self, bytes: &[u8]) -> Result<Box<dyn Predictor>>;
}

/// Predictor loading errors
#[derive(Debug, Error)]
pub enum PredictorError {
    #[error("no loadable predictor found for model `{0}`")]
    NoLoadablePredictor(String),

    #[error("failed to read artifact {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to deserialize artifact for model `{model}`")]
    Deserialize { model: String, detail: anyhow::Error },
}
