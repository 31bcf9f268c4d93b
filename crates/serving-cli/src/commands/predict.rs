//! `servectl predict`

use anyhow::{Context, Result};
use colored::Colorize;
use serving_lib::{PredictResponse, TableCodec};
use std::path::Path;

use super::read_table;
use crate::client::ApiClient;
use crate::output::{print_json, print_table, OutputFormat};

const FEATURES: TableCodec = TableCodec::new("features");
const PREDICTIONS: TableCodec = TableCodec::new("predictions");

/// Predict with `model` over the table in `features`
pub async fn predict(
    client: &ApiClient,
    features: &Path,
    model: &str,
    proba: bool,
    format: OutputFormat,
) -> Result<()> {
    let table = read_table(features, FEATURES)?;
    let features = FEATURES.encode(&table);

    let mut args = vec![("features", features.as_str()), ("model", model)];
    if proba {
        args.push(("proba", "true"));
    }

    let response: PredictResponse = client.post_form("predict", &args).await?;

    match format {
        OutputFormat::Json => print_json(&response)?,
        OutputFormat::Table => {
            let predictions = PREDICTIONS
                .decode(&response.predictions)
                .context("Invalid predictions in response")?;
            println!("Model: {}", response.model.cyan());
            print_table(
                if proba { "Probabilities" } else { "Predictions" },
                &predictions,
            );
        }
    }

    Ok(())
}
