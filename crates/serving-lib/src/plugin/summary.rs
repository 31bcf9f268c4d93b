//! Column summary statistics backend
//!
//! Turns each raw data column into one features column holding the
//! requested statistics (one row per statistic). The configuration string is
//! a comma separated list (`"mean,p95,slope"`) or a JSON list of statistic
//! names; `"all"` selects every statistic. The optional `window` meta entry
//! restricts the computation to the last `window` rows.

use super::{Backend, Capability, ExtractorFactory, FeaturesExtractor, Meta, StaticBackend};
use crate::table::{Label, Table};
use anyhow::{anyhow, bail, Result};
use ndarray::{Array2, ArrayView1};
use std::str::FromStr;
use std::sync::Arc;

/// Registered name of this backend
pub const BACKEND_NAME: &str = "summary";

/// Meta key limiting the rows considered
pub const WINDOW_META: &str = "window";

/// Column statistic
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Statistic {
    Mean,
    Std,
    Min,
    Max,
    P50,
    P95,
    P99,
    /// Least-squares slope over the row order
    Slope,
}

impl Statistic {
    pub const ALL: [Statistic; 8] = [
        Statistic::Mean,
        Statistic::Std,
        Statistic::Min,
        Statistic::Max,
        Statistic::P50,
        Statistic::P95,
        Statistic::P99,
        Statistic::Slope,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Statistic::Mean => "mean",
            Statistic::Std => "std",
            Statistic::Min => "min",
            Statistic::Max => "max",
            Statistic::P50 => "p50",
            Statistic::P95 => "p95",
            Statistic::P99 => "p99",
            Statistic::Slope => "slope",
        }
    }

    /// Statistic over the non-NaN values of a column; NaN when undefined.
    fn compute(&self, values: &[f64]) -> f64 {
        if values.is_empty() {
            return f64::NAN;
        }
        match self {
            Statistic::Mean => mean(values),
            Statistic::Std => variance(values).sqrt(),
            Statistic::Min => values.iter().copied().fold(f64::INFINITY, f64::min),
            Statistic::Max => values.iter().copied().fold(f64::NEG_INFINITY, f64::max),
            Statistic::P50 => percentile(values, 50.0),
            Statistic::P95 => percentile(values, 95.0),
            Statistic::P99 => percentile(values, 99.0),
            Statistic::Slope => linear_regression_slope(values),
        }
    }
}

impl FromStr for Statistic {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        Statistic::ALL
            .iter()
            .copied()
            .find(|stat| stat.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| anyhow!("Unknown statistic `{}`", s))
    }
}

/// Computes summary statistics per column
#[derive(Debug, Clone, PartialEq)]
pub struct SummaryExtractor {
    statistics: Vec<Statistic>,
}

impl SummaryExtractor {
    pub fn new(statistics: Vec<Statistic>) -> Self {
        Self { statistics }
    }

    /// Parse the request configuration string
    pub fn from_configuration(configuration: &str) -> Result<Self> {
        let configuration = configuration.trim();
        let names: Vec<String> = if configuration.starts_with('[') {
            serde_json::from_str(configuration)
                .map_err(|e| anyhow!("Invalid statistics list: {}", e))?
        } else {
            configuration
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect()
        };

        if names.len() == 1 && names[0].eq_ignore_ascii_case("all") {
            return Ok(Self::new(Statistic::ALL.to_vec()));
        }
        if names.is_empty() {
            bail!("No statistics configured");
        }
        let statistics = names
            .iter()
            .map(|name| name.parse())
            .collect::<Result<Vec<Statistic>>>()?;
        Ok(Self::new(statistics))
    }

    pub fn statistics(&self) -> &[Statistic] {
        &self.statistics
    }
}

impl FeaturesExtractor for SummaryExtractor {
    fn compute(&self, data: &Table, meta: &Meta) -> Result<Table> {
        let window = match meta.get(WINDOW_META) {
            None => data.nrows(),
            Some(value) => value
                .as_u64()
                .filter(|w| *w > 0)
                .ok_or_else(|| anyhow!("`{}` must be a positive integer", WINDOW_META))?
                as usize,
        };

        let values = data.values().to_f64();
        let start = values.nrows().saturating_sub(window);

        let columns: Vec<Vec<f64>> = values
            .columns()
            .into_iter()
            .map(|column| {
                let samples = present_values(column.slice(ndarray::s![start..]));
                self.statistics
                    .iter()
                    .map(|stat| stat.compute(&samples))
                    .collect()
            })
            .collect();

        let shape = (self.statistics.len(), data.ncols());
        let features = Array2::from_shape_fn(shape, |(r, c)| columns[c][r]);
        let rows = self
            .statistics
            .iter()
            .map(|stat| Label::from(stat.as_str()))
            .collect();

        Ok(Table::from_floats(features)
            .with_rows(rows)?
            .with_cols(data.cols().to_vec())?)
    }
}

/// Factory for [`SummaryExtractor`]
#[derive(Debug, Default, Clone, Copy)]
pub struct SummaryFactory;

impl ExtractorFactory for SummaryFactory {
    fn create(&self, configuration: &str) -> Result<Box<dyn FeaturesExtractor>> {
        Ok(Box::new(SummaryExtractor::from_configuration(configuration)?))
    }
}

/// Backend handle exposing [`SummaryFactory`]
pub fn backend() -> Arc<dyn Backend> {
    Arc::new(StaticBackend::new(BACKEND_NAME).with_capability(
        super::FEATURES_EXTRACTOR,
        Capability::FeaturesExtractor(Arc::new(SummaryFactory)),
    ))
}

/// Column values without NaN cells
fn present_values(column: ArrayView1<f64>) -> Vec<f64> {
    column.iter().copied().filter(|v| !v.is_nan()).collect()
}

fn mean(values: &[f64]) -> f64 {
    values.iter().sum::<f64>() / values.len() as f64
}

fn percentile(values: &[f64], p: f64) -> f64 {
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let idx = ((p / 100.0) * (sorted.len() - 1) as f64).round() as usize;
    sorted[idx.min(sorted.len() - 1)]
}

/// Sample variance; zero for fewer than two values
fn variance(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let mean = mean(values);
    let sum_sq: f64 = values.iter().map(|v| (v - mean).powi(2)).sum();
    sum_sq / (values.len() - 1) as f64
}

fn linear_regression_slope(values: &[f64]) -> f64 {
    let n = values.len() as f64;
    if n < 2.0 {
        return 0.0;
    }
    let sum_x: f64 = (0..values.len()).map(|i| i as f64).sum();
    let sum_y: f64 = values.iter().sum();
    let sum_xy: f64 = values.iter().enumerate().map(|(i, y)| i as f64 * y).sum();
    let sum_xx: f64 = (0..values.len()).map(|i| (i as f64).powi(2)).sum();
    let denominator = n * sum_xx - sum_x * sum_x;
    if denominator.abs() < f64::EPSILON {
        return 0.0;
    }
    (n * sum_xy - sum_x * sum_y) / denominator
}
