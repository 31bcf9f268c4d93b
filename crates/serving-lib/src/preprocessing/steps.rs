//! Column transformations applied before prediction

use super::PreprocessError;
use crate::table::{Label, Table, Values};
use ndarray::Array2;
use serde_json::Value;
use std::collections::HashMap;

/// Rename columns through a mapping; unmapped columns keep their label.
#[derive(Debug, Clone, PartialEq)]
pub struct RenameColumns {
    mapping: HashMap<String, Label>,
}

impl RenameColumns {
    pub const NAME: &'static str = "rename_features";
    pub const PARAMETERS: &'static str = "feature_mask";

    pub fn from_parameters(value: &Value) -> Result<Self, PreprocessError> {
        let object = value
            .as_object()
            .ok_or_else(|| invalid(Self::PARAMETERS, "expected an object of old to new names"))?;

        let mapping = object
            .iter()
            .map(|(old, new)| {
                label_from_json(new)
                    .map(|label| (old.clone(), label))
                    .ok_or_else(|| {
                        invalid(
                            Self::PARAMETERS,
                            format!("new name for `{}` must be a string or integer", old),
                        )
                    })
            })
            .collect::<Result<_, _>>()?;
        Ok(Self { mapping })
    }

    pub fn apply(&self, table: &Table) -> Result<Table, PreprocessError> {
        let cols = table
            .cols()
            .iter()
            .map(|col| self.mapping.get(&col.key()).cloned().unwrap_or_else(|| col.clone()))
            .collect();
        Ok(table.with_cols(cols)?)
    }
}

/// Reindex columns to exactly the listed labels, filling new ones with NaN.
#[derive(Debug, Clone, PartialEq)]
pub struct AddMissingColumns {
    columns: Vec<Label>,
}

impl AddMissingColumns {
    pub const NAME: &'static str = "add_missing_features";
    pub const PARAMETERS: &'static str = "feature_names";

    pub fn from_parameters(value: &Value) -> Result<Self, PreprocessError> {
        let items = value
            .as_array()
            .ok_or_else(|| invalid(Self::PARAMETERS, "expected a list of column names"))?;
        let columns = items
            .iter()
            .map(|item| {
                label_from_json(item).ok_or_else(|| {
                    invalid(Self::PARAMETERS, "column names must be strings or integers")
                })
            })
            .collect::<Result<_, _>>()?;
        Ok(Self { columns })
    }

    pub fn apply(&self, table: &Table) -> Result<Table, PreprocessError> {
        let sources: Vec<Option<usize>> = self
            .columns
            .iter()
            .map(|label| table.column_index(label))
            .collect();
        let shape = (table.nrows(), sources.len());

        let values = match (table.values(), sources.iter().all(Option::is_some)) {
            (Values::Int(data), true) => {
                Values::Int(Array2::from_shape_fn(shape, |(r, c)| {
                    sources[c].map_or(0, |i| data[[r, i]])
                }))
            }
            (values, _) => {
                let data = values.to_f64();
                Values::Float(Array2::from_shape_fn(shape, |(r, c)| {
                    sources[c].map_or(f64::NAN, |i| data[[r, i]])
                }))
            }
        };

        Ok(Table::new(
            values,
            Some(table.rows().to_vec()),
            Some(self.columns.clone()),
        )?)
    }
}

/// Default used for missing cells
#[derive(Debug, Clone, PartialEq)]
pub enum FillValue {
    /// Same default for every column
    Scalar(f64),
    /// Default per column label; other columns are left as they are
    PerColumn(HashMap<String, f64>),
}

/// Replace NaN cells with defaults.
#[derive(Debug, Clone, PartialEq)]
pub struct FillMissingValues {
    fill: FillValue,
}

impl FillMissingValues {
    pub const NAME: &'static str = "input_missing_values";
    pub const PARAMETERS: &'static str = "feature_defaults";

    pub fn from_parameters(value: &Value) -> Result<Self, PreprocessError> {
        let fill = match value {
            Value::Number(n) => FillValue::Scalar(n.as_f64().unwrap_or(f64::NAN)),
            Value::Object(object) => {
                let mut defaults = HashMap::with_capacity(object.len());
                for (column, default) in object {
                    let default = default.as_f64().ok_or_else(|| {
                        invalid(
                            Self::PARAMETERS,
                            format!("default for `{}` must be a number", column),
                        )
                    })?;
                    defaults.insert(column.clone(), default);
                }
                FillValue::PerColumn(defaults)
            }
            _ => {
                return Err(invalid(
                    Self::PARAMETERS,
                    "expected a number or an object of column defaults",
                ))
            }
        };
        Ok(Self { fill })
    }

    pub fn apply(&self, table: &Table) -> Result<Table, PreprocessError> {
        // Integer tables have no missing cells
        let Values::Float(data) = table.values() else {
            return Ok(table.clone());
        };

        let defaults: Vec<Option<f64>> = table
            .cols()
            .iter()
            .map(|col| match &self.fill {
                FillValue::Scalar(v) => Some(*v),
                FillValue::PerColumn(map) => map.get(&col.key()).copied(),
            })
            .collect();

        let mut filled = data.clone();
        for mut row in filled.rows_mut() {
            for (cell, default) in row.iter_mut().zip(&defaults) {
                if let (true, Some(default)) = (cell.is_nan(), default) {
                    *cell = *default;
                }
            }
        }

        Ok(Table::new(
            Values::Float(filled),
            Some(table.rows().to_vec()),
            Some(table.cols().to_vec()),
        )?)
    }
}

fn label_from_json(value: &Value) -> Option<Label> {
    match value {
        Value::String(s) => Some(Label::Str(s.clone())),
        Value::Number(n) => n.as_i64().map(Label::Int),
        _ => None,
    }
}

fn invalid(key: &'static str, reason: impl Into<String>) -> PreprocessError {
    PreprocessError::InvalidParameters {
        key,
        reason: reason.into(),
    }
}
