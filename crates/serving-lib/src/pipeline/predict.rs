//! `/predict`: features table and model name in, predictions table out

use super::{CodedError, ErrorClass};
use crate::guarded;
use crate::models::{PredictArgs, PredictResponse};
use crate::predictor::{LoadedPredictor, PredictorError, PredictorLoader};
use crate::preprocessing::{PreprocessError, PreprocessingPipeline};
use crate::registry::{ModelRegistry, StoreError};
use crate::table::{CodecError, TableCodec};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, error};

/// Wire key of the features table
pub const FEATURES_CODEC: TableCodec = TableCodec::new("features");

/// Wire key of the predictions table
pub const PREDICTIONS_CODEC: TableCodec = TableCodec::new("predictions");

#[derive(Debug, Error)]
pub enum PredictError {
    #[error("Incomplete request args: `features` and `model` are required")]
    IncompleteArgs,

    #[error("No configuration found for model `{0}`")]
    NoConfiguration(String),

    #[error("No loadable predictor found for model `{0}`")]
    NoLoadablePredictor(String),

    #[error("Unsupported features type: {0}")]
    UnsupportedFeaturesType(CodecError),

    #[error("No features present: {0}")]
    NoFeatures(CodecError),

    #[error("Features conversion failed: {0}")]
    FeaturesConversion(CodecError),

    #[error("Features preprocessing failed")]
    PreprocessingFailed(PreprocessError),

    #[error("Predictor failed")]
    PredictorFailed(anyhow::Error),

    #[error("Model registry unavailable")]
    RegistryUnavailable(StoreError),
}

impl CodedError for PredictError {
    fn code(&self) -> u16 {
        match self {
            PredictError::IncompleteArgs => 401,
            PredictError::NoConfiguration(_) => 402,
            PredictError::NoLoadablePredictor(_) => 403,
            PredictError::UnsupportedFeaturesType(_) => 404,
            PredictError::NoFeatures(_) => 405,
            PredictError::FeaturesConversion(_) => 406,
            PredictError::PreprocessingFailed(_) => 407,
            PredictError::PredictorFailed(_) => 408,
            PredictError::RegistryUnavailable(_) => 409,
        }
    }

    fn class(&self) -> ErrorClass {
        match self {
            PredictError::NoConfiguration(_) | PredictError::NoLoadablePredictor(_) => {
                ErrorClass::NotFound
            }
            PredictError::PreprocessingFailed(_) | PredictError::PredictorFailed(_) => {
                ErrorClass::Computation
            }
            PredictError::RegistryUnavailable(_) => ErrorClass::Unavailable,
            _ => ErrorClass::ClientInput,
        }
    }
}

impl From<CodecError> for PredictError {
    fn from(err: CodecError) -> Self {
        match err {
            CodecError::UnsupportedType(_) => PredictError::UnsupportedFeaturesType(err),
            CodecError::MissingField(_) => PredictError::NoFeatures(err),
            _ => PredictError::FeaturesConversion(err),
        }
    }
}

/// Outcome of a served prediction, for metrics
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PredictionStats {
    pub rows: usize,
    pub proba: bool,
    pub from_cache: bool,
}

/// Prediction over registered model configurations and their artifacts
pub struct PredictPipeline {
    registry: Arc<ModelRegistry>,
    loader: Arc<PredictorLoader>,
}

impl PredictPipeline {
    pub fn new(registry: Arc<ModelRegistry>, loader: Arc<PredictorLoader>) -> Self {
        Self { registry, loader }
    }

    pub fn loader(&self) -> &PredictorLoader {
        &self.loader
    }

    pub fn run(&self, args: &PredictArgs) -> Result<PredictResponse, PredictError> {
        self.run_with_stats(args).map(|(response, _)| response)
    }

    pub fn run_with_stats(
        &self,
        args: &PredictArgs,
    ) -> Result<(PredictResponse, PredictionStats), PredictError> {
        let (Some(features), Some(model)) = (&args.features, &args.model) else {
            return Err(PredictError::IncompleteArgs);
        };

        let configuration = self
            .registry
            .get(model)
            .map_err(|e| {
                error!(model = %model, error = %e, "Model registry lookup failed");
                PredictError::RegistryUnavailable(e)
            })?
            .ok_or_else(|| PredictError::NoConfiguration(model.clone()))?;

        let LoadedPredictor {
            predictor,
            from_cache,
            ..
        } = self.loader.load(&configuration).map_err(|e| match e {
            PredictorError::NoLoadablePredictor(name) => PredictError::NoLoadablePredictor(name),
            other => {
                error!(model = %model, error = %other, "Predictor artifact failed to load");
                PredictError::PredictorFailed(other.into())
            }
        })?;

        let table = FEATURES_CODEC.decode(features)?;

        let prepared = PreprocessingPipeline::transform(&table, &configuration).map_err(|e| {
            error!(model = %model, error = %e, "Features preprocessing failed");
            PredictError::PreprocessingFailed(e)
        })?;

        let proba = args.wants_proba();
        debug!(model = %model, rows = prepared.nrows(), proba, "Running predictor");

        let mut predictions = guarded(|| {
            if proba {
                predictor.predict_proba(&prepared)
            } else {
                predictor.predict(&prepared)
            }
        })
        .map_err(|e| {
            error!(model = %model, error = %format!("{:#}", e), "Predictor failed");
            PredictError::PredictorFailed(e)
        })?;

        if predictions.nrows() == table.nrows() {
            if let Ok(relabeled) = predictions.with_rows(table.rows().to_vec()) {
                predictions = relabeled;
            }
        }

        let stats = PredictionStats {
            rows: predictions.nrows(),
            proba,
            from_cache,
        };
        let response = PredictResponse {
            model: model.clone(),
            features: features.clone(),
            predictions: PREDICTIONS_CODEC.encode(&predictions),
        };
        Ok((response, stats))
    }
}
