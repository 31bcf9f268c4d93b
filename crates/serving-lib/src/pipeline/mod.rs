//! Request pipelines
//!
//! Each pipeline validates its arguments, runs its stages in a fixed order
//! and stops at the first failure with a stage-specific status code. The
//! pipelines are synchronous; the HTTP layer runs them on blocking threads.

mod featurize;
mod model;
mod predict;

pub use featurize::{FeaturizeError, FeaturizePipeline};
pub use model::{ModelError, ModelResource};
pub use predict::{PredictError, PredictPipeline, PredictionStats};

/// Broad kind of a request failure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Missing, malformed or unsupported request input
    ClientInput,
    /// Referenced configuration or artifact does not exist
    NotFound,
    /// Write would overwrite an existing configuration
    Conflict,
    /// Backend or registry unavailable
    Unavailable,
    /// Extractor, preprocessor or predictor failed
    Computation,
    /// Registry write failed
    Store,
}

/// Request failure with a stage-specific status code
pub trait CodedError: std::error::Error {
    fn code(&self) -> u16;

    fn class(&self) -> ErrorClass;
}
