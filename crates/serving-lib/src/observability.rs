//! Observability for the featurizer and predictor services
//!
//! Provides:
//! - Prometheus metrics (request latency, request and failure counts, predictor loads)
//! - Structured JSON logging of service events with tracing

use prometheus::{
    Encoder, GaugeVec, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, Opts, Registry,
    TextEncoder,
};
use tracing::{info, warn};

/// Histogram buckets for request latency (in seconds)
const LATENCY_BUCKETS: &[f64] = &[
    0.0005, 0.001, 0.0025, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0,
];

/// Metrics of one service, registered in their own registry
#[derive(Clone)]
pub struct ServiceMetrics {
    registry: Registry,
    request_latency_seconds: HistogramVec,
    requests_total: IntCounterVec,
    request_failures_total: IntCounterVec,
    predictor_loads_total: IntCounter,
    predictor_cache_hits_total: IntCounter,
    backend_info: GaugeVec,
}

impl ServiceMetrics {
    /// Create and register the metrics; names are prefixed with `namespace`
    pub fn new(namespace: &str) -> prometheus::Result<Self> {
        let registry = Registry::new();

        let request_latency_seconds = HistogramVec::new(
            HistogramOpts::new("request_latency_seconds", "Time spent serving a request")
                .namespace(namespace)
                .buckets(LATENCY_BUCKETS.to_vec()),
            &["endpoint"],
        )?;
        let requests_total = IntCounterVec::new(
            Opts::new("requests_total", "Total number of requests served").namespace(namespace),
            &["endpoint"],
        )?;
        let request_failures_total = IntCounterVec::new(
            Opts::new("request_failures_total", "Total number of failed requests by status code")
                .namespace(namespace),
            &["endpoint", "code"],
        )?;
        let predictor_loads_total = IntCounter::with_opts(
            Opts::new("predictor_loads_total", "Total number of predictor artifacts deserialized")
                .namespace(namespace),
        )?;
        let predictor_cache_hits_total = IntCounter::with_opts(
            Opts::new("predictor_cache_hits_total", "Total number of predictors served from cache")
                .namespace(namespace),
        )?;
        let backend_info = GaugeVec::new(
            Opts::new("backend_info", "Computation backend resolved at start").namespace(namespace),
            &["backend"],
        )?;

        registry.register(Box::new(request_latency_seconds.clone()))?;
        registry.register(Box::new(requests_total.clone()))?;
        registry.register(Box::new(request_failures_total.clone()))?;
        registry.register(Box::new(predictor_loads_total.clone()))?;
        registry.register(Box::new(predictor_cache_hits_total.clone()))?;
        registry.register(Box::new(backend_info.clone()))?;

        Ok(Self {
            registry,
            request_latency_seconds,
            requests_total,
            request_failures_total,
            predictor_loads_total,
            predictor_cache_hits_total,
            backend_info,
        })
    }

    /// Record one served request
    pub fn observe_request(&self, endpoint: &str, duration_secs: f64) {
        self.requests_total.with_label_values(&[endpoint]).inc();
        self.request_latency_seconds
            .with_label_values(&[endpoint])
            .observe(duration_secs);
    }

    pub fn inc_failure(&self, endpoint: &str, code: u16) {
        self.request_failures_total
            .with_label_values(&[endpoint, &code.to_string()])
            .inc();
    }

    pub fn inc_predictor_load(&self, from_cache: bool) {
        if from_cache {
            self.predictor_cache_hits_total.inc();
        } else {
            self.predictor_loads_total.inc();
        }
    }

    /// Record the resolved backend; `none` when resolution failed
    pub fn set_backend(&self, backend: Option<&str>) {
        self.backend_info.reset();
        self.backend_info
            .with_label_values(&[backend.unwrap_or("none")])
            .set(1.0);
    }

    pub fn failures(&self, endpoint: &str, code: u16) -> u64 {
        self.request_failures_total
            .with_label_values(&[endpoint, &code.to_string()])
            .get()
    }

    /// Text exposition of every metric
    pub fn encode(&self) -> prometheus::Result<Vec<u8>> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        Ok(buffer)
    }
}

/// Structured logger for service events
#[derive(Clone)]
pub struct EventLogger {
    service: String,
}

impl EventLogger {
    pub fn new(service: impl Into<String>) -> Self {
        Self {
            service: service.into(),
        }
    }

    pub fn log_startup(&self, version: &str, addr: &str, backend: Option<&str>) {
        info!(
            event = "service_started",
            service = %self.service,
            version = %version,
            addr = %addr,
            backend = backend.unwrap_or("none"),
            "Service started"
        );
    }

    pub fn log_shutdown(&self, reason: &str) {
        info!(
            event = "service_shutdown",
            service = %self.service,
            reason = %reason,
            "Service shutting down"
        );
    }

    pub fn log_request_failed(&self, endpoint: &str, code: u16, message: &str) {
        warn!(
            event = "request_failed",
            service = %self.service,
            endpoint = %endpoint,
            code = code,
            message = %message,
            "Request failed"
        );
    }

    pub fn log_features_extracted(&self, backend: &str, configuration: &str) {
        info!(
            event = "features_extracted",
            service = %self.service,
            backend = %backend,
            configuration = %configuration,
            "Features extracted"
        );
    }

    pub fn log_prediction(&self, model: &str, rows: usize, proba: bool) {
        info!(
            event = "prediction_served",
            service = %self.service,
            model = %model,
            rows = rows,
            proba = proba,
            "Prediction served"
        );
    }

    pub fn log_model_written(&self, model: &str, action: &str, ids: &[u64]) {
        info!(
            event = "model_written",
            service = %self.service,
            model = %model,
            action = %action,
            ids = ?ids,
            "Model configuration written"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_independent_registries() {
        // Two services in one process must not collide
        let a = ServiceMetrics::new("featurizer").unwrap();
        let b = ServiceMetrics::new("featurizer").unwrap();
        a.inc_failure("/featurize", 401);
        assert_eq!(a.failures("/featurize", 401), 1);
        assert_eq!(b.failures("/featurize", 401), 0);
    }

    #[test]
    fn test_encode_contains_metrics() {
        let metrics = ServiceMetrics::new("predictor").unwrap();
        metrics.observe_request("/predict", 0.01);
        metrics.inc_predictor_load(false);
        metrics.set_backend(Some("onnx"));

        let text = String::from_utf8(metrics.encode().unwrap()).unwrap();
        assert!(text.contains("predictor_requests_total{endpoint=\"/predict\"} 1"));
        assert!(text.contains("predictor_predictor_loads_total 1"));
        assert!(text.contains("predictor_backend_info{backend=\"onnx\"} 1"));
    }
}
