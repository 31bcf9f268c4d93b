//! ONNX artifacts executed with tract
//!
//! The artifact is parsed once at load time; the input shape is only known
//! per request, so each call pins the input fact to `[rows, columns]`,
//! optimizes and runs the plan. Output 0 holds the predictions, output 1 (for
//! classifiers exported with probabilities) the per-class probabilities.

use super::{ArtifactFormat, Predictor};
use crate::table::Table;
use anyhow::{bail, Context, Result};
use std::time::Instant;
use tract_onnx::prelude::*;
use tracing::{debug, warn};

/// File extension of ONNX artifacts
pub const EXTENSION: &str = "onnx";

/// Inference latency above which a warning is logged
const SLOW_INFERENCE_MS: u128 = 250;

const PREDICTIONS_OUTPUT: usize = 0;
const PROBABILITIES_OUTPUT: usize = 1;

type TractModel = SimplePlan<TypedFact, Box<dyn TypedOp>, Graph<TypedFact, Box<dyn TypedOp>>>;

/// ONNX artifact format
#[derive(Debug, Default, Clone, Copy)]
pub struct OnnxFormat;

impl ArtifactFormat for OnnxFormat {
    fn extension(&self) -> &str {
        EXTENSION
    }

    fn deserialize(&self, bytes: &[u8]) -> Result<Box<dyn Predictor>> {
        Ok(Box::new(OnnxPredictor::new(bytes)?))
    }
}

/// ONNX-based predictor using tract for inference
pub struct OnnxPredictor {
    model: InferenceModel,
}

impl OnnxPredictor {
    /// Parse an ONNX model from bytes
    pub fn new(model_bytes: &[u8]) -> Result<Self> {
        let model = tract_onnx::onnx()
            .model_for_read(&mut std::io::Cursor::new(model_bytes))
            .context("Failed to parse ONNX model")?;
        Ok(Self { model })
    }

    /// Optimized plan for an input of `rows x cols`
    fn plan(&self, rows: usize, cols: usize) -> Result<TractModel> {
        let plan = self
            .model
            .clone()
            .with_input_fact(0, f32::fact([rows, cols]).into())
            .context("Failed to set input shape")?
            .into_optimized()
            .context("Failed to optimize model")?
            .into_runnable()
            .context("Failed to create runnable model")?;
        Ok(plan)
    }

    fn features_to_tensor(features: &Table) -> Result<Tensor> {
        let data: Vec<f32> = features
            .values()
            .to_f64()
            .iter()
            .map(|v| *v as f32)
            .collect();
        let array = tract_ndarray::Array2::from_shape_vec(features.shape(), data)
            .context("Failed to shape input tensor")?;
        Ok(array.into())
    }

    fn run(&self, features: &Table, output: usize) -> Result<Table> {
        let start = Instant::now();
        let (rows, cols) = features.shape();

        let plan = self.plan(rows, cols)?;
        let input = Self::features_to_tensor(features)?;
        let result = plan.run(tvec!(input.into()))?;
        let tensor = result
            .get(output)
            .with_context(|| format!("Model has no output #{}", output))?;

        let elapsed = start.elapsed();
        if elapsed.as_millis() > SLOW_INFERENCE_MS {
            warn!(elapsed_ms = elapsed.as_millis(), rows, "Inference exceeded {}ms", SLOW_INFERENCE_MS);
        } else {
            debug!(elapsed_us = elapsed.as_micros(), rows, "Inference completed");
        }

        tensor_to_table(tensor)
    }
}

impl Predictor for OnnxPredictor {
    fn predict(&self, features: &Table) -> Result<Table> {
        self.run(features, PREDICTIONS_OUTPUT)
    }

    fn predict_proba(&self, features: &Table) -> Result<Table> {
        self.run(features, PROBABILITIES_OUTPUT)
    }
}

/// Convert an output tensor into a table; 1-D outputs become one column.
fn tensor_to_table(output: &Tensor) -> Result<Table> {
    let (rows, cols) = match output.shape() {
        [] => (1, 1),
        [n] => (*n, 1),
        [n, m] => (*n, *m),
        other => bail!("Unsupported model output rank {}", other.len()),
    };

    if output.datum_type().is_integer() {
        let cast = output.cast_to::<i64>()?;
        let data = cast.as_slice::<i64>()?.to_vec();
        Ok(Table::from_ints(::ndarray::Array2::from_shape_vec((rows, cols), data)?))
    } else {
        let cast = output.cast_to::<f64>()?;
        let data = cast.as_slice::<f64>()?.to_vec();
        Ok(Table::from_floats(::ndarray::Array2::from_shape_vec((rows, cols), data)?))
    }
}
