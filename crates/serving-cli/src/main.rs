//! Featurizer and predictor CLI
//!
//! A command-line client for computing features, running predictions and
//! managing model configurations.

mod client;
mod commands;
mod config;
mod output;

use anyhow::Result;
use clap::{Parser, Subcommand};
use commands::{featurize, model, predict};
use output::OutputFormat;
use std::path::PathBuf;

/// Featurizer and predictor CLI
#[derive(Parser)]
#[command(name = "servectl")]
#[command(author, version, about = "CLI for the featurizer and predictor services", long_about = None)]
pub struct Cli {
    /// Featurizer URL
    #[arg(long, env = "SERVECTL_FEATURIZER_URL")]
    pub featurizer_url: Option<String>,

    /// Predictor URL
    #[arg(long, env = "SERVECTL_PREDICTOR_URL")]
    pub predictor_url: Option<String>,

    /// Output format
    #[arg(long, short)]
    pub format: Option<OutputFormat>,

    /// Enable verbose output
    #[arg(long, short)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Compute features of a data table
    Featurize {
        /// JSON table file
        #[arg(long, short)]
        data: PathBuf,

        /// Features extraction configuration
        #[arg(long, short)]
        configuration: String,

        /// Extractor metadata as a JSON object, or @file
        #[arg(long, short)]
        meta: Option<String>,
    },

    /// Predict with a registered model
    Predict {
        /// JSON features table file
        #[arg(long, short = 'i')]
        features: PathBuf,

        /// Model name
        #[arg(long, short)]
        model: String,

        /// Return class probabilities
        #[arg(long)]
        proba: bool,
    },

    /// Manage model configurations
    #[command(subcommand)]
    Model(ModelCommands),
}

#[derive(Subcommand)]
pub enum ModelCommands {
    /// Show a model configuration
    Get {
        /// Model name
        name: String,
    },

    /// Register a model configuration
    Create {
        /// Configuration JSON, or @file
        model: String,
    },

    /// Update a model configuration
    Update {
        /// Configuration JSON, or @file
        model: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = config::Config::load()?;

    let format = cli
        .format
        .or_else(|| config.default_format.as_deref().and_then(OutputFormat::from_name))
        .unwrap_or_default();

    let url = match cli.command {
        Commands::Featurize { .. } => config.featurizer_url(cli.featurizer_url),
        Commands::Predict { .. } | Commands::Model(_) => config.predictor_url(cli.predictor_url),
    };
    if cli.verbose {
        output::print_info(&format!("Using {}", url));
    }
    let client = client::ApiClient::new(&url)?;

    match cli.command {
        Commands::Featurize {
            data,
            configuration,
            meta,
        } => {
            featurize::featurize(&client, &data, &configuration, meta.as_deref(), format).await?;
        }
        Commands::Predict {
            features,
            model,
            proba,
        } => {
            predict::predict(&client, &features, &model, proba, format).await?;
        }
        Commands::Model(model_cmd) => match model_cmd {
            ModelCommands::Get { name } => {
                model::get_model(&client, &name, format).await?;
            }
            ModelCommands::Create { model } => {
                model::create_model(&client, &model, format).await?;
            }
            ModelCommands::Update { model } => {
                model::update_model(&client, &model, format).await?;
            }
        },
    }

    Ok(())
}
