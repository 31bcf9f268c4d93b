//! `servectl featurize`

use anyhow::{Context, Result};
use colored::Colorize;
use serving_lib::{FeaturizeResponse, TableCodec};
use std::path::Path;

use super::{read_argument, read_table};
use crate::client::ApiClient;
use crate::output::{print_json, print_table, OutputFormat};

const DATA: TableCodec = TableCodec::new("data");
const FEATURES: TableCodec = TableCodec::new("features");

/// Compute features of the table in `data`
pub async fn featurize(
    client: &ApiClient,
    data: &Path,
    configuration: &str,
    meta: Option<&str>,
    format: OutputFormat,
) -> Result<()> {
    let table = read_table(data, DATA)?;
    let data = DATA.encode(&table);
    let meta = meta.map(read_argument).transpose()?;

    let mut args = vec![("data", data.as_str()), ("configuration", configuration)];
    if let Some(meta) = &meta {
        args.push(("meta", meta.as_str()));
    }

    let response: FeaturizeResponse = client.post_form("featurize", &args).await?;

    match format {
        OutputFormat::Json => print_json(&response)?,
        OutputFormat::Table => {
            let features = FEATURES
                .decode(&response.features)
                .context("Invalid features in response")?;
            println!("Configuration: {}", response.configuration.cyan());
            print_table("Features", &features);
        }
    }

    Ok(())
}
