//! Feature preprocessing driven by the model configuration
//!
//! The configuration's `preprocessing` list names the steps to run, in
//! order. Each step reads its parameters from another configuration key;
//! a step whose key is absent passes the table through unchanged, and
//! unknown step names are ignored.

mod steps;

pub use steps::{AddMissingColumns, FillMissingValues, FillValue, RenameColumns};

use crate::registry::ModelConfiguration;
use crate::table::{Table, TableError};
use serde_json::Value;
use thiserror::Error;
use tracing::debug;

/// Configuration key listing the preprocessing steps
pub const PREPROCESSING_FIELD: &str = "preprocessing";

/// Preprocessing errors
#[derive(Debug, Error)]
pub enum PreprocessError {
    #[error("`preprocessing` must be a list of step names")]
    InvalidStepList,

    #[error("invalid `{key}` parameters: {reason}")]
    InvalidParameters { key: &'static str, reason: String },

    #[error(transparent)]
    Table(#[from] TableError),
}

/// One configured preprocessing step; `None` when its parameters are absent
#[derive(Debug, Clone, PartialEq)]
pub enum Step {
    RenameFeatures(Option<RenameColumns>),
    AddMissingFeatures(Option<AddMissingColumns>),
    InputMissingValues(Option<FillMissingValues>),
}

/// Configuration value, treating `null` as absent
fn present<'a>(configuration: &'a ModelConfiguration, key: &str) -> Option<&'a Value> {
    configuration.get(key).filter(|v| !v.is_null())
}

impl Step {
    pub fn name(&self) -> &'static str {
        match self {
            Step::RenameFeatures(_) => RenameColumns::NAME,
            Step::AddMissingFeatures(_) => AddMissingColumns::NAME,
            Step::InputMissingValues(_) => FillMissingValues::NAME,
        }
    }

    fn from_configuration(
        name: &str,
        configuration: &ModelConfiguration,
    ) -> Result<Option<Self>, PreprocessError> {
        let step = match name {
            RenameColumns::NAME => Step::RenameFeatures(
                present(configuration, RenameColumns::PARAMETERS)
                    .map(RenameColumns::from_parameters)
                    .transpose()?,
            ),
            AddMissingColumns::NAME => Step::AddMissingFeatures(
                present(configuration, AddMissingColumns::PARAMETERS)
                    .map(AddMissingColumns::from_parameters)
                    .transpose()?,
            ),
            FillMissingValues::NAME => Step::InputMissingValues(
                present(configuration, FillMissingValues::PARAMETERS)
                    .map(FillMissingValues::from_parameters)
                    .transpose()?,
            ),
            unknown => {
                debug!(step = unknown, "Skipping unknown preprocessing step");
                return Ok(None);
            }
        };
        Ok(Some(step))
    }

    fn apply(&self, table: Table) -> Result<Table, PreprocessError> {
        match self {
            Step::RenameFeatures(Some(step)) => step.apply(&table),
            Step::AddMissingFeatures(Some(step)) => step.apply(&table),
            Step::InputMissingValues(Some(step)) => step.apply(&table),
            _ => Ok(table),
        }
    }
}

/// Ordered preprocessing steps of one model configuration
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PreprocessingPipeline {
    steps: Vec<Step>,
}

impl PreprocessingPipeline {
    pub fn from_configuration(
        configuration: &ModelConfiguration,
    ) -> Result<Self, PreprocessError> {
        let Some(list) = present(configuration, PREPROCESSING_FIELD) else {
            return Ok(Self::default());
        };
        let names = list.as_array().ok_or(PreprocessError::InvalidStepList)?;

        let mut steps = Vec::with_capacity(names.len());
        for name in names {
            let name = name.as_str().ok_or(PreprocessError::InvalidStepList)?;
            if let Some(step) = Step::from_configuration(name, configuration)? {
                steps.push(step);
            }
        }
        Ok(Self { steps })
    }

    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn apply(&self, table: &Table) -> Result<Table, PreprocessError> {
        self.steps
            .iter()
            .try_fold(table.clone(), |table, step| step.apply(table))
    }

    /// Build the pipeline for `configuration` and apply it to `table`
    pub fn transform(
        table: &Table,
        configuration: &ModelConfiguration,
    ) -> Result<Table, PreprocessError> {
        Self::from_configuration(configuration)?.apply(table)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::{Label, Values};
    use ndarray::array;
    use serde_json::{json, Value};

    fn configuration(value: Value) -> ModelConfiguration {
        ModelConfiguration::try_from(value).unwrap()
    }

    fn features() -> Table {
        Table::new(
            Values::Float(array![[1.0, f64::NAN], [3.0, 4.0]]),
            None,
            Some(vec!["a".into(), "b".into()]),
        )
        .unwrap()
    }

    #[test]
    fn test_no_preprocessing_is_identity() {
        let config = configuration(json!({"name": "m"}));
        let out = PreprocessingPipeline::transform(&features(), &config).unwrap();
        assert_eq!(out, features());
    }

    #[test]
    fn test_null_entries_are_absent() {
        let config = configuration(json!({"name": "m", "preprocessing": null}));
        let out = PreprocessingPipeline::transform(&features(), &config).unwrap();
        assert_eq!(out, features());

        let config = configuration(json!({
            "name": "m",
            "preprocessing": ["input_missing_values", "rename_features"],
            "feature_defaults": null,
            "feature_mask": null
        }));
        let pipeline = PreprocessingPipeline::from_configuration(&config).unwrap();
        assert_eq!(
            pipeline.steps(),
            &[Step::InputMissingValues(None), Step::RenameFeatures(None)]
        );
        let out = pipeline.apply(&features()).unwrap();
        assert_eq!(out.cols(), features().cols());
        assert!(out.to_rows_f64()[0][1].is_nan());
    }

    #[test]
    fn test_steps_run_in_listed_order() {
        let config = configuration(json!({
            "name": "m",
            "preprocessing": ["rename_features", "add_missing_features", "input_missing_values"],
            "feature_mask": {"a": "alpha"},
            "feature_names": ["alpha", "b", "c"],
            "feature_defaults": 0
        }));
        let out = PreprocessingPipeline::transform(&features(), &config).unwrap();

        assert_eq!(
            out.cols(),
            &[Label::from("alpha"), Label::from("b"), Label::from("c")]
        );
        assert_eq!(
            out.to_rows_f64(),
            vec![vec![1.0, 0.0, 0.0], vec![3.0, 4.0, 0.0]]
        );
    }

    #[test]
    fn test_order_changes_result() {
        // Filling first leaves the added column as NaN
        let config = configuration(json!({
            "name": "m",
            "preprocessing": ["input_missing_values", "add_missing_features"],
            "feature_names": ["a", "z"],
            "feature_defaults": -1
        }));
        let out = PreprocessingPipeline::transform(&features(), &config).unwrap();
        let rows = out.to_rows_f64();
        assert_eq!(rows[0][0], 1.0);
        assert!(rows[0][1].is_nan());
    }

    #[test]
    fn test_rename_and_add_missing_order_diverge() {
        let params = json!({
            "name": "m",
            "feature_mask": {"a": "x"},
            "feature_names": ["x", "b"]
        });
        let with_steps = |steps: Value| {
            let mut value = params.clone();
            value["preprocessing"] = steps;
            PreprocessingPipeline::transform(&features(), &configuration(value)).unwrap()
        };

        let rename_first = with_steps(json!(["rename_features", "add_missing_features"]));
        let add_first = with_steps(json!(["add_missing_features", "rename_features"]));

        assert_eq!(rename_first.to_rows_f64()[1], vec![3.0, 4.0]);
        // `a` was dropped before it could be renamed
        assert!(add_first.to_rows_f64()[1][0].is_nan());
        assert_ne!(rename_first, add_first);
    }

    #[test]
    fn test_unknown_and_unparameterized_steps_skipped() {
        let config = configuration(json!({
            "name": "m",
            "preprocessing": ["scale_everything", "rename_features", "input_missing_values"]
        }));
        let pipeline = PreprocessingPipeline::from_configuration(&config).unwrap();
        assert_eq!(pipeline.steps().len(), 2);
        assert_eq!(pipeline.steps()[0].name(), "rename_features");
        assert_eq!(pipeline.apply(&features()).unwrap(), features());
    }

    #[test]
    fn test_invalid_configuration() {
        let not_a_list = configuration(json!({"name": "m", "preprocessing": "rename_features"}));
        assert!(matches!(
            PreprocessingPipeline::from_configuration(&not_a_list),
            Err(PreprocessError::InvalidStepList)
        ));

        let bad_params = configuration(json!({
            "name": "m",
            "preprocessing": ["add_missing_features"],
            "feature_names": "a"
        }));
        assert!(matches!(
            PreprocessingPipeline::from_configuration(&bad_params),
            Err(PreprocessError::InvalidParameters { key: "feature_names", .. })
        ));
    }
}
