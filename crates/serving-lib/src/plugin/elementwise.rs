//! Element-wise transformation backend
//!
//! The configuration string names one transform applied to every cell
//! (`identity`, `abs`, `log1p`, `square`, `sqrt`) or per column
//! (`zscore`, `minmax`). Output keeps the raw data's row and column labels.

use super::{Backend, Capability, ExtractorFactory, FeaturesExtractor, Meta, StaticBackend};
use crate::table::{Table, Values};
use anyhow::{anyhow, Result};
use ndarray::Axis;
use std::str::FromStr;
use std::sync::Arc;

/// Registered name of this backend
pub const BACKEND_NAME: &str = "elementwise";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transform {
    Identity,
    Abs,
    Log1p,
    Square,
    Sqrt,
    /// `(x - mean) / std` per column
    ZScore,
    /// `(x - min) / (max - min)` per column
    MinMax,
}

impl FromStr for Transform {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "identity" => Ok(Transform::Identity),
            "abs" => Ok(Transform::Abs),
            "log1p" => Ok(Transform::Log1p),
            "square" => Ok(Transform::Square),
            "sqrt" => Ok(Transform::Sqrt),
            "zscore" => Ok(Transform::ZScore),
            "minmax" => Ok(Transform::MinMax),
            other => Err(anyhow!("Unknown transform `{}`", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ElementwiseExtractor {
    transform: Transform,
}

impl ElementwiseExtractor {
    pub fn new(transform: Transform) -> Self {
        Self { transform }
    }
}

impl FeaturesExtractor for ElementwiseExtractor {
    fn compute(&self, data: &Table, _meta: &Meta) -> Result<Table> {
        if self.transform == Transform::Identity {
            return Ok(data.clone());
        }

        let mut values = data.values().to_f64();
        match self.transform {
            Transform::Identity => {}
            Transform::Abs => values.mapv_inplace(f64::abs),
            Transform::Log1p => values.mapv_inplace(f64::ln_1p),
            Transform::Square => values.mapv_inplace(|v| v * v),
            Transform::Sqrt => values.mapv_inplace(f64::sqrt),
            Transform::ZScore => {
                for mut column in values.axis_iter_mut(Axis(1)) {
                    let present: Vec<f64> =
                        column.iter().copied().filter(|v| !v.is_nan()).collect();
                    let n = present.len() as f64;
                    let mean = present.iter().sum::<f64>() / n;
                    let std = if present.len() < 2 {
                        0.0
                    } else {
                        (present.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (n - 1.0))
                            .sqrt()
                    };
                    column.mapv_inplace(|v| if std > 0.0 { (v - mean) / std } else { v - mean });
                }
            }
            Transform::MinMax => {
                for mut column in values.axis_iter_mut(Axis(1)) {
                    let min = column.iter().copied().fold(f64::INFINITY, f64::min);
                    let max = column.iter().copied().fold(f64::NEG_INFINITY, f64::max);
                    let range = max - min;
                    column.mapv_inplace(|v| if range > 0.0 { (v - min) / range } else { 0.0 });
                }
            }
        }

        Ok(Table::new(
            Values::Float(values),
            Some(data.rows().to_vec()),
            Some(data.cols().to_vec()),
        )?)
    }
}

/// Factory for [`ElementwiseExtractor`]
#[derive(Debug, Default, Clone, Copy)]
pub struct ElementwiseFactory;

impl ExtractorFactory for ElementwiseFactory {
    fn create(&self, configuration: &str) -> Result<Box<dyn FeaturesExtractor>> {
        Ok(Box::new(ElementwiseExtractor::new(configuration.parse()?)))
    }
}

/// Backend handle exposing [`ElementwiseFactory`]
pub fn backend() -> Arc<dyn Backend> {
    Arc::new(StaticBackend::new(BACKEND_NAME).with_capability(
        super::FEATURES_EXTRACTOR,
        Capability::FeaturesExtractor(Arc::new(ElementwiseFactory)),
    ))
}
