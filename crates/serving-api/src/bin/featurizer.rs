//! Featurizer service
//!
//! Computes features from raw data tables with the features extraction
//! library named by `FEATURES_EXTRACTION_LIBRARY`.

use anyhow::Result;
use serving_api::{
    featurizer_router, serve, telemetry::init_tracing, FeaturizerConfig, FeaturizerState, VERSION,
};
use serving_lib::plugin::BackendRegistry;
use std::sync::Arc;
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    info!("Starting featurizer");

    let config = FeaturizerConfig::load()?;
    let state = Arc::new(FeaturizerState::from_config(
        &config,
        &BackendRegistry::with_builtins(),
    )?);
    state.initialize().await;

    let addr = config.addr();
    let logger = state.context.logger.clone();
    logger.log_startup(VERSION, &addr, state.pipeline.backend_name());

    serve(&addr, featurizer_router(state)).await?;

    logger.log_shutdown("SIGINT received");
    Ok(())
}
