//! Labeled 2-D numeric tables
//!
//! A [`Table`] is the unit exchanged between the pipeline stages: raw data
//! going into a features extractor, features going into a predictor and the
//! predictions coming back out. It carries an `int64` or `float64` matrix plus
//! one label per row and per column.

mod codec;

pub use codec::{CodecError, TableCodec, WireTable};

use ndarray::Array2;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Row or column label
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Label {
    Int(i64),
    Str(String),
}

impl Label {
    /// Key form used to match labels against JSON object keys
    pub fn key(&self) -> String {
        self.to_string()
    }

    /// Default labels `0..n`
    pub fn range(n: usize) -> Vec<Label> {
        (0..n as i64).map(Label::Int).collect()
    }
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Label::Int(i) => write!(f, "{}", i),
            Label::Str(s) => f.write_str(s),
        }
    }
}

impl From<&str> for Label {
    fn from(value: &str) -> Self {
        Label::Str(value.to_string())
    }
}

impl From<String> for Label {
    fn from(value: String) -> Self {
        Label::Str(value)
    }
}

impl From<i64> for Label {
    fn from(value: i64) -> Self {
        Label::Int(value)
    }
}

/// Element type of a table
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dtype {
    Int64,
    Float64,
}

impl Dtype {
    pub fn as_str(&self) -> &'static str {
        match self {
            Dtype::Int64 => "int64",
            Dtype::Float64 => "float64",
        }
    }
}

/// Numeric payload of a table
#[derive(Debug, Clone)]
pub enum Values {
    Int(Array2<i64>),
    Float(Array2<f64>),
}

impl Values {
    pub fn dim(&self) -> (usize, usize) {
        match self {
            Values::Int(a) => a.dim(),
            Values::Float(a) => a.dim(),
        }
    }

    pub fn dtype(&self) -> Dtype {
        match self {
            Values::Int(_) => Dtype::Int64,
            Values::Float(_) => Dtype::Float64,
        }
    }

    /// Values widened to `f64`
    pub fn to_f64(&self) -> Array2<f64> {
        match self {
            Values::Int(a) => a.mapv(|v| v as f64),
            Values::Float(a) => a.clone(),
        }
    }
}

impl PartialEq for Values {
    /// NaN cells compare equal to NaN cells so decoded tables can be compared.
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Values::Int(a), Values::Int(b)) => a == b,
            (Values::Float(a), Values::Float(b)) => {
                a.dim() == b.dim()
                    && a.iter()
                        .zip(b.iter())
                        .all(|(x, y)| x == y || (x.is_nan() && y.is_nan()))
            }
            _ => false,
        }
    }
}

/// Table construction errors
#[derive(Debug, Error, PartialEq)]
pub enum TableError {
    #[error("{axis} labels have length {labels}, data has {expected}")]
    LabelCount {
        axis: &'static str,
        labels: usize,
        expected: usize,
    },
}

/// Labeled 2-D numeric array
#[derive(Debug, Clone, PartialEq)]
pub struct Table {
    values: Values,
    rows: Vec<Label>,
    cols: Vec<Label>,
}

impl Table {
    /// Build a table; absent or empty labels default to `0..n` per axis.
    pub fn new(
        values: Values,
        rows: Option<Vec<Label>>,
        cols: Option<Vec<Label>>,
    ) -> Result<Self, TableError> {
        let (nrows, ncols) = values.dim();
        let rows = default_labels(rows, nrows);
        let cols = default_labels(cols, ncols);

        if rows.len() != nrows {
            return Err(TableError::LabelCount {
                axis: "row",
                labels: rows.len(),
                expected: nrows,
            });
        }
        if cols.len() != ncols {
            return Err(TableError::LabelCount {
                axis: "column",
                labels: cols.len(),
                expected: ncols,
            });
        }

        Ok(Self { values, rows, cols })
    }

    pub fn from_floats(values: Array2<f64>) -> Self {
        let (nrows, ncols) = values.dim();
        Self {
            values: Values::Float(values),
            rows: Label::range(nrows),
            cols: Label::range(ncols),
        }
    }

    pub fn from_ints(values: Array2<i64>) -> Self {
        let (nrows, ncols) = values.dim();
        Self {
            values: Values::Int(values),
            rows: Label::range(nrows),
            cols: Label::range(ncols),
        }
    }

    pub fn values(&self) -> &Values {
        &self.values
    }

    pub fn into_values(self) -> Values {
        self.values
    }

    pub fn rows(&self) -> &[Label] {
        &self.rows
    }

    pub fn cols(&self) -> &[Label] {
        &self.cols
    }

    pub fn dtype(&self) -> Dtype {
        self.values.dtype()
    }

    /// `(rows, columns)`
    pub fn shape(&self) -> (usize, usize) {
        self.values.dim()
    }

    pub fn nrows(&self) -> usize {
        self.rows.len()
    }

    pub fn ncols(&self) -> usize {
        self.cols.len()
    }

    /// Position of the first column carrying `label`
    pub fn column_index(&self, label: &Label) -> Option<usize> {
        self.cols.iter().position(|c| c == label)
    }

    /// Copy of the table with new column labels
    pub fn with_cols(&self, cols: Vec<Label>) -> Result<Self, TableError> {
        Self::new(self.values.clone(), Some(self.rows.clone()), Some(cols))
    }

    /// Copy of the table with new row labels
    pub fn with_rows(&self, rows: Vec<Label>) -> Result<Self, TableError> {
        Self::new(self.values.clone(), Some(rows), Some(self.cols.clone()))
    }

    /// Copy of the table with values widened to `f64`
    pub fn to_float(&self) -> Self {
        Self {
            values: Values::Float(self.values.to_f64()),
            rows: self.rows.clone(),
            cols: self.cols.clone(),
        }
    }

    /// Row-major nested vectors of `f64`, for display and client output
    pub fn to_rows_f64(&self) -> Vec<Vec<f64>> {
        self.values
            .to_f64()
            .outer_iter()
            .map(|row| row.to_vec())
            .collect()
    }
}

fn default_labels(labels: Option<Vec<Label>>, n: usize) -> Vec<Label> {
    match labels {
        Some(labels) if !labels.is_empty() => labels,
        _ => Label::range(n),
    }
}
