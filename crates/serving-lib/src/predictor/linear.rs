//! JSON linear/logistic model artifacts
//!
//! ```json
//! {
//!   "coefficients": [[0.5, -1.0]],
//!   "intercept": [0.1],
//!   "classes": [0, 1],
//!   "feature_names": ["f0", "f1"]
//! }
//! ```
//!
//! Without `classes` the model is a regressor with one output per
//! coefficient row. With `classes` it is a classifier: one coefficient row
//! and two classes is a binary logistic model, otherwise one row per class
//! with a softmax over the scores.

use super::{ArtifactFormat, Predictor};
use crate::table::{Label, Table};
use anyhow::{bail, Context, Result};
use ndarray::{Array1, Array2, Axis};
use serde::{Deserialize, Serialize};

/// File extension of linear model artifacts
pub const EXTENSION: &str = "linear";

/// Linear model artifact format
#[derive(Debug, Default, Clone, Copy)]
pub struct LinearFormat;

impl ArtifactFormat for LinearFormat {
    fn extension(&self) -> &str {
        EXTENSION
    }

    fn deserialize(&self, bytes: &[u8]) -> Result<Box<dyn Predictor>> {
        let model: LinearModel =
            serde_json::from_slice(bytes).context("Failed to parse linear model")?;
        Ok(Box::new(LinearPredictor::new(model)?))
    }
}

/// Serialized linear model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinearModel {
    pub coefficients: Vec<Vec<f64>>,
    pub intercept: Vec<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub classes: Option<Vec<i64>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub feature_names: Option<Vec<Label>>,
}

/// Linear predictor built from a validated [`LinearModel`]
#[derive(Debug, Clone)]
pub struct LinearPredictor {
    /// `outputs x features`
    weights: Array2<f64>,
    intercept: Array1<f64>,
    classes: Option<Vec<i64>>,
    feature_names: Option<Vec<Label>>,
}

impl LinearPredictor {
    pub fn new(model: LinearModel) -> Result<Self> {
        let outputs = model.coefficients.len();
        if outputs == 0 {
            bail!("Linear model has no coefficients");
        }
        let width = model.coefficients[0].len();
        if model.coefficients.iter().any(|row| row.len() != width) {
            bail!("Linear model coefficient rows differ in length");
        }
        if model.intercept.len() != outputs {
            bail!(
                "Linear model has {} intercepts for {} coefficient rows",
                model.intercept.len(),
                outputs
            );
        }
        if let Some(names) = &model.feature_names {
            if names.len() != width {
                bail!("Linear model names {} features, coefficients have {}", names.len(), width);
            }
        }
        if let Some(classes) = &model.classes {
            let binary = outputs == 1 && classes.len() == 2;
            if !binary && classes.len() != outputs {
                bail!(
                    "Linear classifier has {} classes for {} coefficient rows",
                    classes.len(),
                    outputs
                );
            }
        }

        let weights = Array2::from_shape_vec(
            (outputs, width),
            model.coefficients.into_iter().flatten().collect(),
        )?;

        Ok(Self {
            weights,
            intercept: Array1::from(model.intercept),
            classes: model.classes,
            feature_names: model.feature_names,
        })
    }

    pub fn is_classifier(&self) -> bool {
        self.classes.is_some()
    }

    /// Feature matrix in coefficient order
    fn design_matrix(&self, features: &Table) -> Result<Array2<f64>> {
        let values = features.values().to_f64();
        match &self.feature_names {
            Some(names) => {
                let indices = names
                    .iter()
                    .map(|name| {
                        features
                            .column_index(name)
                            .with_context(|| format!("Missing feature column `{}`", name))
                    })
                    .collect::<Result<Vec<_>>>()?;
                Ok(values.select(Axis(1), &indices))
            }
            None => {
                if features.ncols() != self.weights.ncols() {
                    bail!(
                        "Model expects {} features, got {}",
                        self.weights.ncols(),
                        features.ncols()
                    );
                }
                Ok(values)
            }
        }
    }

    /// Raw scores `rows x outputs`
    fn scores(&self, features: &Table) -> Result<Array2<f64>> {
        let x = self.design_matrix(features)?;
        Ok(x.dot(&self.weights.t()) + &self.intercept)
    }

    fn probabilities(&self, scores: &Array2<f64>) -> Array2<f64> {
        if scores.ncols() == 1 {
            let rows = scores.nrows();
            Array2::from_shape_fn((rows, 2), |(r, c)| {
                let p = sigmoid(scores[[r, 0]]);
                if c == 1 {
                    p
                } else {
                    1.0 - p
                }
            })
        } else {
            let mut probabilities = scores.clone();
            for mut row in probabilities.rows_mut() {
                let max = row.fold(f64::NEG_INFINITY, |m, v| m.max(*v));
                row.mapv_inplace(|v| (v - max).exp());
                let sum = row.sum();
                row.mapv_inplace(|v| v / sum);
            }
            probabilities
        }
    }
}

impl Predictor for LinearPredictor {
    fn predict(&self, features: &Table) -> Result<Table> {
        let scores = self.scores(features)?;
        let Some(classes) = &self.classes else {
            return Ok(Table::from_floats(scores));
        };

        let probabilities = self.probabilities(&scores);
        let predicted: Vec<i64> = probabilities
            .rows()
            .into_iter()
            .map(|row| classes[argmax(row.iter().copied())])
            .collect();
        let rows = predicted.len();
        Ok(Table::from_ints(Array2::from_shape_vec((rows, 1), predicted)?))
    }

    fn predict_proba(&self, features: &Table) -> Result<Table> {
        let Some(classes) = &self.classes else {
            bail!("Regression model has no predict_proba");
        };
        let probabilities = self.probabilities(&self.scores(features)?);
        let cols = classes.iter().copied().map(Label::Int).collect();
        Ok(Table::from_floats(probabilities).with_cols(cols)?)
    }
}

fn sigmoid(x: f64) -> f64 {
    1.0 / (1.0 + (-x).exp())
}

/// Index of the largest value; first one wins on ties.
fn argmax(values: impl Iterator<Item = f64>) -> usize {
    let mut best = (0, f64::NEG_INFINITY);
    for (i, v) in values.enumerate() {
        if v > best.1 {
            best = (i, v);
        }
    }
    best.0
}
