//! Predictor service
//!
//! Serves predictions from registered model configurations and their
//! artifacts, and manages the configurations through `/model`.

use anyhow::Result;
use serving_api::{
    predictor_router, serve, telemetry::init_tracing, PredictorConfig, PredictorState, VERSION,
};
use serving_lib::plugin::BackendRegistry;
use std::sync::Arc;
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    info!("Starting predictor");

    let config = PredictorConfig::load()?;
    info!(
        models_dir = %config.models_dir.display(),
        database = %config.database.display(),
        artifact_format = %config.artifact_format,
        "Predictor configured"
    );

    let state = Arc::new(PredictorState::from_config(
        &config,
        &BackendRegistry::with_builtins(),
    )?);
    state.initialize().await;

    let addr = config.addr();
    let logger = state.context.logger.clone();
    logger.log_startup(VERSION, &addr, Some(&state.backend));

    serve(&addr, predictor_router(state)).await?;

    logger.log_shutdown("SIGINT received");
    Ok(())
}
