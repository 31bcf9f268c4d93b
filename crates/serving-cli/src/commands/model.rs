//! `servectl model`: read and write model configurations

use anyhow::Result;
use colored::Colorize;
use serde_json::Value;
use serving_lib::{ModelReadResponse, ModelWriteResponse};

use super::read_argument;
use crate::client::ApiClient;
use crate::output::{print_json, print_success, OutputFormat};

fn pretty(text: &str) -> String {
    serde_json::from_str::<Value>(text)
        .ok()
        .and_then(|v| serde_json::to_string_pretty(&v).ok())
        .unwrap_or_else(|| text.to_string())
}

fn ids(response: &ModelWriteResponse) -> String {
    response
        .id
        .to_vec()
        .iter()
        .map(|id| id.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Show the configuration stored for `name`
pub async fn get_model(client: &ApiClient, name: &str, format: OutputFormat) -> Result<()> {
    let response: ModelReadResponse = client.get_query("model", &[("model", name)]).await?;

    match format {
        OutputFormat::Json => print_json(&response)?,
        OutputFormat::Table => {
            println!("{} {}", "Model:".bold(), name.cyan());
            println!("{}", pretty(&response.record));
        }
    }
    Ok(())
}

/// Register a new configuration
pub async fn create_model(client: &ApiClient, model: &str, format: OutputFormat) -> Result<()> {
    let model = read_argument(model)?;
    let response: ModelWriteResponse = client.post_form("model", &[("model", model.as_str())]).await?;

    match format {
        OutputFormat::Json => print_json(&response)?,
        OutputFormat::Table => print_success(&format!("Model created (id {})", ids(&response))),
    }
    Ok(())
}

/// Merge into an existing configuration
pub async fn update_model(client: &ApiClient, model: &str, format: OutputFormat) -> Result<()> {
    let model = read_argument(model)?;
    let response: ModelWriteResponse = client.put_form("model", &[("model", model.as_str())]).await?;

    match format {
        OutputFormat::Json => print_json(&response)?,
        OutputFormat::Table => print_success(&format!("Model updated (ids {})", ids(&response))),
    }
    Ok(())
}
