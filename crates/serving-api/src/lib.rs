//! HTTP front of the featurizer and predictor services
//!
//! - `featurizer`: `POST /featurize` over the configured extraction backend
//! - `predictor`: `POST /predict` and `/model` over the model registry
//!
//! Both expose `/healthz`, `/readyz` and `/metrics`.

pub mod api;
pub mod args;
pub mod config;
pub mod error;
pub mod telemetry;

pub use api::{
    featurizer_router, predictor_router, serve, FeaturizerState, PredictorState, ServiceContext,
};
pub use config::{FeaturizerConfig, PredictorConfig};
pub use error::ApiError;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
