//! HTTP API of the featurizer and predictor services

use crate::args::RequestArgs;
use crate::config::{FeaturizerConfig, PredictorConfig};
use crate::error::ApiError;
use anyhow::{anyhow, Context};
use axum::{
    extract::State,
    http::{header::CONTENT_TYPE, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serving_lib::{
    health::components,
    pipeline::{CodedError, FeaturizePipeline, ModelResource, PredictPipeline},
    plugin::{extract_artifact_format, BackendRegistry},
    predictor::{PredictorCache, PredictorLoader},
    registry::{JsonDocumentStore, ModelRegistry},
    ComponentHealth, ComponentStatus, EventLogger, FeaturizeArgs, FeaturizeResponse,
    HealthRegistry, ModelArgs, ModelReadResponse, ModelWriteResponse, PredictArgs,
    PredictResponse, ServiceMetrics, ServicePaths,
};
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info};

pub const FEATURIZER: &str = "featurizer";
pub const PREDICTOR: &str = "predictor";

const FEATURIZE_ENDPOINT: &str = "/featurize";
const PREDICT_ENDPOINT: &str = "/predict";
const MODEL_ENDPOINT: &str = "/model";

/// Health, metrics and event logging of one service
#[derive(Clone)]
pub struct ServiceContext {
    pub health: HealthRegistry,
    pub metrics: Arc<ServiceMetrics>,
    pub logger: EventLogger,
}

impl ServiceContext {
    pub fn new(service: &str) -> anyhow::Result<Self> {
        Ok(Self {
            health: HealthRegistry::new(service),
            metrics: Arc::new(ServiceMetrics::new(service)?),
            logger: EventLogger::new(service),
        })
    }

    /// Run a pipeline call on the blocking pool, recording latency and failures
    async fn run<T, E, F>(&self, endpoint: &str, f: F) -> Result<T, ApiError>
    where
        F: FnOnce() -> Result<T, E> + Send + 'static,
        T: Send + 'static,
        E: CodedError + Send + 'static,
    {
        let start = Instant::now();
        let outcome = tokio::task::spawn_blocking(f).await;
        self.metrics
            .observe_request(endpoint, start.elapsed().as_secs_f64());

        let err = match outcome {
            Ok(Ok(value)) => return Ok(value),
            Ok(Err(e)) => ApiError::from_coded(&e),
            Err(e) => {
                error!(endpoint = %endpoint, error = %e, "Request task failed");
                ApiError::internal()
            }
        };
        self.metrics.inc_failure(endpoint, err.code());
        self.logger
            .log_request_failed(endpoint, err.code(), err.message());
        Err(err)
    }
}

/// State exposing the health and metrics endpoints
pub trait ServiceState: Send + Sync + 'static {
    fn context(&self) -> &ServiceContext;
}

/// Featurizer shared state
pub struct FeaturizerState {
    pub pipeline: Arc<FeaturizePipeline>,
    pub context: ServiceContext,
}

impl FeaturizerState {
    pub fn new(pipeline: FeaturizePipeline) -> anyhow::Result<Self> {
        Ok(Self {
            pipeline: Arc::new(pipeline),
            context: ServiceContext::new(FEATURIZER)?,
        })
    }

    /// Resolve the configured backend; a missing one leaves the service up
    /// but unable to featurize.
    pub fn from_config(
        config: &FeaturizerConfig,
        backends: &BackendRegistry,
    ) -> anyhow::Result<Self> {
        let backend = backends.resolve_backend(config.features_extraction_library.as_deref());
        Self::new(FeaturizePipeline::new(backend))
    }

    /// Publish component health and mark the service ready
    pub async fn initialize(&self) {
        let health = &self.context.health;
        if self.pipeline.is_available() {
            health.set_healthy(components::BACKEND).await;
        } else {
            health
                .set_unhealthy(
                    components::BACKEND,
                    "Features extraction library unavailable",
                )
                .await;
        }
        self.context
            .metrics
            .set_backend(self.pipeline.backend_name());
        health.set_ready(true).await;
    }
}

impl ServiceState for FeaturizerState {
    fn context(&self) -> &ServiceContext {
        &self.context
    }
}

/// Predictor shared state
pub struct PredictorState {
    pub predict: Arc<PredictPipeline>,
    pub models: Arc<ModelResource>,
    pub backend: String,
    pub context: ServiceContext,
}

impl PredictorState {
    pub fn new(
        registry: Arc<ModelRegistry>,
        loader: PredictorLoader,
        backend: impl Into<String>,
    ) -> anyhow::Result<Self> {
        Ok(Self {
            predict: Arc::new(PredictPipeline::new(registry.clone(), Arc::new(loader))),
            models: Arc::new(ModelResource::new(registry)),
            backend: backend.into(),
            context: ServiceContext::new(PREDICTOR)?,
        })
    }

    /// Prepare the directory layout, open the registry and resolve the
    /// artifact format. Any failure here is fatal.
    pub fn from_config(config: &PredictorConfig, backends: &BackendRegistry) -> anyhow::Result<Self> {
        let paths = ServicePaths::new(&config.models_dir, &config.database);
        paths
            .ensure_structure()
            .context("Failed to create service directories")?;

        let backend = backends
            .resolve_backend(Some(&config.artifact_format))
            .ok_or_else(|| anyhow!("Artifact format backend `{}` unavailable", config.artifact_format))?;
        let format = extract_artifact_format(backend.as_ref())?;

        let mut loader = PredictorLoader::new(&paths.models_dir, format);
        if config.cache_predictors {
            loader = loader.with_cache(PredictorCache::new());
        }

        let store = JsonDocumentStore::open(&paths.database_file).with_context(|| {
            format!(
                "Failed to open model registry at {}",
                paths.database_file.display()
            )
        })?;
        info!(
            database = %paths.database_file.display(),
            models_dir = %paths.models_dir.display(),
            "Model registry opened"
        );

        Self::new(
            Arc::new(ModelRegistry::new(Arc::new(store))),
            loader,
            backend.name(),
        )
    }

    /// Publish component health and mark the service ready
    pub async fn initialize(&self) {
        let health = &self.context.health;
        health.set_healthy(components::BACKEND).await;
        health.set_healthy(components::REGISTRY).await;

        let loader = self.predict.loader();
        let mut artifacts = ComponentHealth::of_directory(loader.models_dir());
        if artifacts.status == ComponentStatus::Healthy && loader.available_models().is_empty() {
            artifacts = ComponentHealth::degraded(format!(
                "No .{} artifacts found",
                loader.extension()
            ));
        }
        health.update(components::ARTIFACTS, artifacts).await;

        self.context.metrics.set_backend(Some(&self.backend));
        health.set_ready(true).await;
    }
}

impl ServiceState for PredictorState {
    fn context(&self) -> &ServiceContext {
        &self.context
    }
}

/// `POST /featurize`
async fn featurize(
    State(state): State<Arc<FeaturizerState>>,
    RequestArgs(args): RequestArgs,
) -> Result<Json<FeaturizeResponse>, ApiError> {
    let args = FeaturizeArgs::from_args(&args);
    let pipeline = state.pipeline.clone();
    let response = state
        .context
        .run(FEATURIZE_ENDPOINT, move || pipeline.run(&args))
        .await?;

    state.context.logger.log_features_extracted(
        state.pipeline.backend_name().unwrap_or("none"),
        &response.configuration,
    );
    Ok(Json(response))
}

/// `POST /predict`
async fn predict(
    State(state): State<Arc<PredictorState>>,
    RequestArgs(args): RequestArgs,
) -> Result<Json<PredictResponse>, ApiError> {
    let args = PredictArgs::from_args(&args);
    let pipeline = state.predict.clone();
    let (response, stats) = state
        .context
        .run(PREDICT_ENDPOINT, move || pipeline.run_with_stats(&args))
        .await?;

    state.context.metrics.inc_predictor_load(stats.from_cache);
    state
        .context
        .logger
        .log_prediction(&response.model, stats.rows, stats.proba);
    Ok(Json(response))
}

/// `POST /model`
async fn create_model(
    State(state): State<Arc<PredictorState>>,
    RequestArgs(args): RequestArgs,
) -> Result<Json<ModelWriteResponse>, ApiError> {
    let args = ModelArgs::from_args(&args);
    let models = state.models.clone();
    let response = state
        .context
        .run(MODEL_ENDPOINT, move || models.create(&args))
        .await?;

    state
        .context
        .logger
        .log_model_written(&response.model, "created", &response.id.to_vec());
    Ok(Json(response))
}

/// `PUT /model`
async fn update_model(
    State(state): State<Arc<PredictorState>>,
    RequestArgs(args): RequestArgs,
) -> Result<Json<ModelWriteResponse>, ApiError> {
    let args = ModelArgs::from_args(&args);
    let models = state.models.clone();
    let response = state
        .context
        .run(MODEL_ENDPOINT, move || models.update(&args))
        .await?;

    state
        .context
        .logger
        .log_model_written(&response.model, "updated", &response.id.to_vec());
    Ok(Json(response))
}

/// `GET /model`
async fn read_model(
    State(state): State<Arc<PredictorState>>,
    RequestArgs(args): RequestArgs,
) -> Result<Json<ModelReadResponse>, ApiError> {
    let args = ModelArgs::from_args(&args);
    let models = state.models.clone();
    let response = state
        .context
        .run(MODEL_ENDPOINT, move || models.read(&args))
        .await?;
    Ok(Json(response))
}

/// 200 while healthy or degraded, 503 when unhealthy
async fn healthz<S: ServiceState>(State(state): State<Arc<S>>) -> impl IntoResponse {
    let health = state.context().health.health().await;

    let status_code = if health.status.is_operational() {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (status_code, Json(health))
}

/// 200 if ready, 503 otherwise
async fn readyz<S: ServiceState>(State(state): State<Arc<S>>) -> impl IntoResponse {
    let readiness = state.context().health.readiness().await;

    let status_code = if readiness.ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (status_code, Json(readiness))
}

/// Prometheus metrics endpoint
async fn metrics<S: ServiceState>(State(state): State<Arc<S>>) -> impl IntoResponse {
    match state.context().metrics.encode() {
        Ok(buffer) => (
            StatusCode::OK,
            [(CONTENT_TYPE, "text/plain; charset=utf-8")],
            buffer,
        )
            .into_response(),
        Err(e) => {
            error!(error = %e, "Failed to encode metrics");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

fn service_routes<S: ServiceState>() -> Router<Arc<S>> {
    Router::new()
        .route("/healthz", get(healthz::<S>))
        .route("/readyz", get(readyz::<S>))
        .route("/metrics", get(metrics::<S>))
}

/// Featurizer router
pub fn featurizer_router(state: Arc<FeaturizerState>) -> Router {
    Router::new()
        .route(FEATURIZE_ENDPOINT, post(featurize))
        .merge(service_routes())
        .with_state(state)
}

/// Predictor router
pub fn predictor_router(state: Arc<PredictorState>) -> Router {
    Router::new()
        .route(PREDICT_ENDPOINT, post(predict))
        .route(
            MODEL_ENDPOINT,
            post(create_model).put(update_model).get(read_model),
        )
        .merge(service_routes())
        .with_state(state)
}

/// Serve `router` on `addr` until SIGINT
pub async fn serve(addr: &str, router: Router) -> anyhow::Result<()> {
    info!(addr = %addr, "Starting API server");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "Failed to listen for SIGINT");
        std::future::pending::<()>().await;
    }
}
