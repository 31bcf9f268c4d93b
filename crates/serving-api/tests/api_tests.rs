//! Integration tests for the featurizer and predictor HTTP APIs

use axum::{
    body::Body,
    http::{header::CONTENT_TYPE, Method, Request, StatusCode},
    Router,
};
use serde_json::{json, Value};
use serving_api::{featurizer_router, predictor_router, FeaturizerState, PredictorState};
use serving_lib::{
    pipeline::FeaturizePipeline,
    plugin::{summary, BackendRegistry},
    predictor::{LinearFormat, PredictorLoader},
    registry::{JsonDocumentStore, ModelRegistry},
    Label, TableCodec,
};
use std::sync::Arc;
use tempfile::TempDir;
use tower::ServiceExt;

const FEATURES: TableCodec = TableCodec::new("features");
const PREDICTIONS: TableCodec = TableCodec::new("predictions");

const CLASSIFIER: &str = r#"{
    "coefficients": [[1.0, 1.0]],
    "intercept": [0.0],
    "classes": [0, 1],
    "feature_names": ["a", "b"]
}"#;

async fn featurizer(pipeline: FeaturizePipeline) -> Router {
    let state = Arc::new(FeaturizerState::new(pipeline).unwrap());
    state.initialize().await;
    featurizer_router(state)
}

struct Predictor {
    _dir: TempDir,
    router: Router,
}

async fn predictor() -> Predictor {
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join("clf.linear"), CLASSIFIER).unwrap();

    let registry = Arc::new(ModelRegistry::new(Arc::new(JsonDocumentStore::in_memory())));
    let loader = PredictorLoader::new(dir.path(), Arc::new(LinearFormat));
    let state = Arc::new(PredictorState::new(registry, loader, "linear").unwrap());
    state.initialize().await;

    Predictor {
        _dir: dir,
        router: predictor_router(state),
    }
}

fn form(method: Method, uri: &str, pairs: &[(&str, &str)]) -> Request<Body> {
    let body = url::form_urlencoded::Serializer::new(String::new())
        .extend_pairs(pairs)
        .finish();
    Request::builder()
        .method(method)
        .uri(uri)
        .header(CONTENT_TYPE, "application/x-www-form-urlencoded")
        .body(Body::from(body))
        .unwrap()
}

fn json_request(method: Method, uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let value = serde_json::from_slice(&body).unwrap_or(Value::Null);
    (status, value)
}

fn data_2x2() -> String {
    json!({"data": [[1, 2], [3, 4]], "cols": ["a", "b"]}).to_string()
}

#[tokio::test]
async fn test_featurize_summary() {
    let app = featurizer(FeaturizePipeline::new(Some(summary::backend()))).await;
    let data = data_2x2();

    let (status, body) = send(
        &app,
        form(
            Method::POST,
            "/featurize",
            &[("data", &data), ("configuration", "mean,max")],
        ),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["configuration"], "mean,max");
    assert_eq!(body["data"], data);

    let features = FEATURES.decode(body["features"].as_str().unwrap()).unwrap();
    assert_eq!(features.rows(), &[Label::from("mean"), Label::from("max")]);
    assert_eq!(features.cols(), &[Label::from("a"), Label::from("b")]);
    assert_eq!(features.to_rows_f64(), vec![vec![2.0, 3.0], vec![3.0, 4.0]]);
}

#[tokio::test]
async fn test_featurize_incomplete_args() {
    let app = featurizer(FeaturizePipeline::new(Some(summary::backend()))).await;

    let (status, body) = send(&app, form(Method::POST, "/featurize", &[("data", "x")])).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["status"], "401");
}

#[tokio::test]
async fn test_featurize_without_backend() {
    let backend = BackendRegistry::with_builtins().resolve_backend(Some("no_such_library"));
    let app = featurizer(FeaturizePipeline::new(backend)).await;
    let data = data_2x2();

    let (status, body) = send(
        &app,
        form(
            Method::POST,
            "/featurize",
            &[("data", &data), ("configuration", "mean")],
        ),
    )
    .await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["status"], "402");

    // Backend is checked before the data is decoded
    let (status, body) = send(
        &app,
        form(
            Method::POST,
            "/featurize",
            &[("data", "{broken"), ("configuration", "mean")],
        ),
    )
    .await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["status"], "402");

    // Up but unhealthy
    let (status, body) = send(&app, Request::get("/healthz").body(Body::empty()).unwrap()).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["status"], "unhealthy");
    assert_eq!(body["components"]["backend"]["status"], "unhealthy");
}

#[tokio::test]
async fn test_featurize_bad_data() {
    let app = featurizer(FeaturizePipeline::new(Some(summary::backend()))).await;

    let (status, body) = send(
        &app,
        form(
            Method::POST,
            "/featurize",
            &[("data", r#"{"other": 1}"#), ("configuration", "mean")],
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["status"], "404");
}

#[tokio::test]
async fn test_model_lifecycle() {
    let p = predictor().await;
    let model = json!({"name": "clf", "version": 1});

    let (status, body) = send(
        &p.router,
        json_request(Method::POST, "/model", json!({ "model": model.to_string() })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["id"], 1);
    assert_eq!(body["model"], model.to_string());

    // Duplicate create
    let (status, body) = send(
        &p.router,
        json_request(Method::POST, "/model", json!({ "model": model.to_string() })),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["status"], "401");

    let (status, body) = send(
        &p.router,
        json_request(
            Method::PUT,
            "/model",
            json!({ "model": {"name": "clf", "version": 2} }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["id"], json!([1]));

    let (status, body) = send(
        &p.router,
        Request::get("/model?model=clf").body(Body::empty()).unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let record: Value = serde_json::from_str(body["record"].as_str().unwrap()).unwrap();
    assert_eq!(record, json!({"name": "clf", "version": 2}));
}

#[tokio::test]
async fn test_update_missing_model() {
    let p = predictor().await;

    let (status, body) = send(
        &p.router,
        form(Method::PUT, "/model", &[("model", r#"{"name": "ghost"}"#)]),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["status"], "402");
}

#[tokio::test]
async fn test_model_invalid_args() {
    let p = predictor().await;

    let (status, body) = send(
        &p.router,
        form(Method::POST, "/model", &[("model", r#"{"no_name": 1}"#)]),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["status"], "400");
}

#[tokio::test]
async fn test_predict() {
    let p = predictor().await;
    let (status, _) = send(
        &p.router,
        form(Method::POST, "/model", &[("model", r#"{"name": "clf"}"#)]),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let features = json!({
        "features": [[-3.0, -1.0], [2.0, 2.0]],
        "rows": ["r1", "r2"],
        "cols": ["a", "b"]
    })
    .to_string();

    let (status, body) = send(
        &p.router,
        form(
            Method::POST,
            "/predict",
            &[("features", &features), ("model", "clf")],
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["model"], "clf");
    assert_eq!(body["features"], features);

    let predictions = PREDICTIONS
        .decode(body["predictions"].as_str().unwrap())
        .unwrap();
    assert_eq!(predictions.rows(), &[Label::from("r1"), Label::from("r2")]);
    assert_eq!(predictions.to_rows_f64(), vec![vec![0.0], vec![1.0]]);
}

#[tokio::test]
async fn test_predict_unknown_model() {
    let p = predictor().await;
    let features = json!({"features": [[1.0, 2.0]]}).to_string();

    let (status, body) = send(
        &p.router,
        form(
            Method::POST,
            "/predict",
            &[("features", &features), ("model", "missing")],
        ),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["status"], "402");
}

#[tokio::test]
async fn test_predict_without_artifact() {
    let p = predictor().await;
    send(
        &p.router,
        form(Method::POST, "/model", &[("model", r#"{"name": "orphan"}"#)]),
    )
    .await;
    let features = json!({"features": [[1.0, 2.0]]}).to_string();

    let (status, body) = send(
        &p.router,
        form(
            Method::POST,
            "/predict",
            &[("features", &features), ("model", "orphan")],
        ),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["status"], "403");
}

#[tokio::test]
async fn test_health_and_readiness() {
    let p = predictor().await;

    let (status, body) = send(&p.router, Request::get("/healthz").body(Body::empty()).unwrap()).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["service"], "predictor");
    assert_eq!(body["components"]["registry"]["status"], "healthy");
    assert_eq!(body["components"]["artifacts"]["status"], "healthy");

    let (status, body) = send(&p.router, Request::get("/readyz").body(Body::empty()).unwrap()).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["ready"], true);
}

#[tokio::test]
async fn test_metrics_count_failures() {
    let p = predictor().await;
    send(&p.router, form(Method::POST, "/predict", &[("model", "clf")])).await;

    let response = p
        .router
        .clone()
        .oneshot(Request::get("/metrics").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let text = String::from_utf8(body.to_vec()).unwrap();
    assert!(text.contains("predictor_requests_total"));
    assert!(text.contains(r#"code="401""#));
}

#[tokio::test]
async fn test_served_over_tcp() {
    let p = predictor().await;
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let router = p.router.clone();
    tokio::spawn(async move { axum::serve(listener, router).await });

    let client = reqwest::Client::new();
    let response = client
        .post(format!("http://{}/model", addr))
        .json(&json!({"model": {"name": "remote"}}))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), reqwest::StatusCode::OK);

    let body: Value = client
        .get(format!("http://{}/model", addr))
        .query(&[("model", "remote")])
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["model"], "remote");
}
