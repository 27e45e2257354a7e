//! API integration tests.
//!
//! The router runs against a scripted detector and the in-memory counter
//! store, so no external services are needed.

use std::io::Cursor;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{header, Request, Response, StatusCode};
use axum::Router;
use facegate_access::{AccessError, AccessResult, CounterStore, InMemoryCounterStore};
use facegate_api::{create_router, ApiConfig, AppState};
use facegate_detector::{DecodedImage, DetectorError, DetectorResult, FaceDetector, RawDetection};
use facegate_media::PostProcessor;
use facegate_models::DetectionParams;
use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
use serde_json::Value;
use tower::ServiceExt;

const TOKEN: &str = "test-token";
const BOUNDARY: &str = "facegate-test-boundary";

#[derive(Clone)]
enum Script {
    Records(Vec<RawDetection>),
    Fail,
}

struct FakeDetector {
    script: Script,
    healthy: bool,
    calls: Arc<AtomicUsize>,
}

#[async_trait]
impl FaceDetector for FakeDetector {
    async fn detect(
        &self,
        _image: &DecodedImage,
        _params: &DetectionParams,
    ) -> DetectorResult<Vec<RawDetection>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match &self.script {
            Script::Records(records) => Ok(records.clone()),
            Script::Fail => Err(DetectorError::failed("inference service unavailable")),
        }
    }

    fn name(&self) -> &'static str {
        "fake"
    }

    async fn health_check(&self) -> bool {
        self.healthy
    }
}

fn bare(bbox: [f64; 4], confidence: Option<f64>) -> RawDetection {
    RawDetection::from_numbers(bbox, confidence, Vec::<(String, [f64; 2])>::new())
}

/// Records in MTCNN's `[x, y, w, h]` layout.
fn sample_records() -> Vec<RawDetection> {
    vec![
        RawDetection::from_numbers(
            [10.6, 20.2, 30.9, 40.0],
            Some(0.99),
            [("left_eye".to_string(), [20.7, 30.2])],
        ),
        bare([60.0, 10.0, 20.0, 20.0], None),
        bare([5.0, 5.0, 10.0, 10.0], Some(0.5)),
        bare([150.0, 150.0, 20.0, 20.0], Some(0.95)),
    ]
}

/// Counter store that cannot be reached.
struct UnreachableStore;

#[async_trait]
impl CounterStore for UnreachableStore {
    async fn increment(&self, _key: &str) -> AccessResult<u64> {
        Err(AccessError::unavailable("connection refused"))
    }

    async fn increment_with_ttl(&self, _key: &str, _ttl: Duration) -> AccessResult<u64> {
        Err(AccessError::unavailable("connection refused"))
    }

    async fn expire(&self, _key: &str, _ttl: Duration) -> AccessResult<()> {
        Err(AccessError::unavailable("connection refused"))
    }

    async fn decrement(&self, _key: &str) -> AccessResult<u64> {
        Err(AccessError::unavailable("connection refused"))
    }

    async fn ping(&self) -> AccessResult<()> {
        Err(AccessError::unavailable("connection refused"))
    }

    fn backend(&self) -> &'static str {
        "unreachable"
    }
}

struct TestApp {
    router: Router,
    calls: Arc<AtomicUsize>,
}

fn test_config(call_limit: u64) -> ApiConfig {
    let mut config = ApiConfig::default();
    config.access.app_token = Some(TOKEN.to_string());
    config.access.call_limit = call_limit;
    config
}

fn app_with(config: ApiConfig, script: Script, healthy: bool) -> TestApp {
    app_with_store(config, script, healthy, Arc::new(InMemoryCounterStore::new()))
}

fn app_with_store(
    config: ApiConfig,
    script: Script,
    healthy: bool,
    store: Arc<dyn CounterStore>,
) -> TestApp {
    let calls = Arc::new(AtomicUsize::new(0));
    let detector = Arc::new(FakeDetector {
        script,
        healthy,
        calls: calls.clone(),
    });
    let state = AppState::from_parts(
        config,
        detector,
        store,
        PostProcessor::default(),
    );

    TestApp {
        router: create_router(state, None),
        calls,
    }
}

fn app() -> TestApp {
    app_with(test_config(100), Script::Records(sample_records()), true)
}

fn png_bytes(width: u32, height: u32) -> Vec<u8> {
    let img = DynamicImage::ImageRgb8(RgbImage::from_pixel(width, height, Rgb([90, 120, 150])));
    let mut out = Cursor::new(Vec::new());
    img.write_to(&mut out, ImageFormat::Png).unwrap();
    out.into_inner()
}

fn multipart_body(field: &str, bytes: &[u8]) -> Vec<u8> {
    let mut body = Vec::new();
    body.extend_from_slice(format!("--{}\r\n", BOUNDARY).as_bytes());
    body.extend_from_slice(
        format!(
            "Content-Disposition: form-data; name=\"{}\"; filename=\"face.png\"\r\n",
            field
        )
        .as_bytes(),
    );
    body.extend_from_slice(b"Content-Type: image/png\r\n\r\n");
    body.extend_from_slice(bytes);
    body.extend_from_slice(format!("\r\n--{}--\r\n", BOUNDARY).as_bytes());
    body
}

fn upload(uri: &str, key: Option<&str>, field: &str, bytes: &[u8]) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri(uri)
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={}", BOUNDARY),
        );
    if let Some(key) = key {
        builder = builder.header("X-API-Key", key);
    }
    builder.body(Body::from(multipart_body(field, bytes))).unwrap()
}

fn image_upload(uri: &str) -> Request<Body> {
    upload(uri, Some(TOKEN), "file", &png_bytes(100, 80))
}

async fn send(router: &Router, request: Request<Body>) -> Response<Body> {
    router.clone().oneshot(request).await.unwrap()
}

async fn body_bytes(response: Response<Body>) -> Vec<u8> {
    axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap()
        .to_vec()
}

async fn json_body(response: Response<Body>) -> Value {
    serde_json::from_slice(&body_bytes(response).await).unwrap()
}

fn header_str<'a>(response: &'a Response<Body>, name: &str) -> Option<&'a str> {
    response.headers().get(name).and_then(|v| v.to_str().ok())
}

#[tokio::test]
async fn test_root_and_health() {
    let app = app();

    let response = send(&app.router, Request::get("/").body(Body::empty()).unwrap()).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        json_body(response).await["message"],
        "Face Detection API is running."
    );

    let response = send(&app.router, Request::get("/health").body(Body::empty()).unwrap()).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers().contains_key("x-request-id"));
    assert_eq!(header_str(&response, "x-content-type-options"), Some("nosniff"));
    assert_eq!(json_body(response).await["status"], "healthy");
}

#[tokio::test]
async fn test_ready_reports_components() {
    let app = app();
    let response = send(&app.router, Request::get("/ready").body(Body::empty()).unwrap()).await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["status"], "ready");
    assert_eq!(body["checks"]["counter_store"]["status"], "ok");

    let app = app_with(test_config(100), Script::Records(vec![]), false);
    let response = send(&app.router, Request::get("/ready").body(Body::empty()).unwrap()).await;
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(json_body(response).await["checks"]["detector"]["status"], "error");
}

#[tokio::test]
async fn test_missing_or_wrong_key_is_unauthorized() {
    let app = app();

    for mode_path in ["/detect", "/detect/keypoints", "/detect/full", "/detect/crop", "/detect/annotated"] {
        let response = send(&app.router, upload(mode_path, None, "file", &png_bytes(10, 10))).await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED, "{}", mode_path);
        assert_eq!(json_body(response).await["code"], "unauthorized");

        let response = send(&app.router, upload(mode_path, Some("wrong"), "file", &png_bytes(10, 10))).await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED, "{}", mode_path);
    }

    assert_eq!(app.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_auth_checked_before_body() {
    let app = app();
    let request = Request::post("/detect?min_face_size=abc")
        .body(Body::empty())
        .unwrap();

    let response = send(&app.router, request).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_missing_server_secret_is_misconfiguration() {
    let mut config = test_config(100);
    config.access.app_token = None;
    let app = app_with(config, Script::Records(sample_records()), true);

    let response = send(&app.router, image_upload("/detect")).await;
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(json_body(response).await["code"], "server_misconfigured");
    assert_eq!(app.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_detect_returns_corner_boxes() {
    let app = app();
    let response = send(&app.router, image_upload("/detect")).await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(header_str(&response, "x-ratelimit-limit"), Some("100"));
    assert_eq!(header_str(&response, "x-ratelimit-remaining"), Some("99"));

    let body = json_body(response).await;
    assert_eq!(
        body["boxes"],
        serde_json::json!([[10, 20, 41, 60], [60, 10, 80, 30], [5, 5, 15, 15], [150, 150, 170, 170]])
    );
}

#[tokio::test]
async fn test_detect_is_also_served_under_api_prefix() {
    let app = app();
    let response = send(&app.router, image_upload("/api/detect")).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json_body(response).await["boxes"].as_array().unwrap().len(), 4);
}

#[tokio::test]
async fn test_keypoints_align_with_boxes() {
    let app = app();
    let response = send(&app.router, image_upload("/detect/keypoints")).await;
    assert_eq!(response.status(), StatusCode::OK);

    let body = json_body(response).await;
    let boxes = body["boxes"].as_array().unwrap();
    let keypoints = body["keypoints"].as_array().unwrap();
    assert_eq!(boxes.len(), keypoints.len());
    assert_eq!(keypoints[0], serde_json::json!({"left_eye": [20, 30]}));
    assert_eq!(keypoints[1], serde_json::json!({}));
}

#[tokio::test]
async fn test_full_filters_by_default_threshold() {
    let app = app();
    let response = send(&app.router, image_upload("/detect/full")).await;
    assert_eq!(response.status(), StatusCode::OK);

    let body = json_body(response).await;
    let detections = body["detections"].as_array().unwrap();
    assert_eq!(detections.len(), 3);
    assert_eq!(detections[0]["box"], serde_json::json!([10, 20, 41, 60]));
    assert!((detections[0]["score"].as_f64().unwrap() - 0.99).abs() < 1e-6);
    assert_eq!(detections[1]["score"], Value::Null);
    assert_eq!(detections[2]["box"], serde_json::json!([150, 150, 170, 170]));
}

#[tokio::test]
async fn test_full_honors_score_min_query() {
    let app = app();
    let response = send(&app.router, image_upload("/detect/full?score_min=1.0")).await;
    assert_eq!(response.status(), StatusCode::OK);

    let body = json_body(response).await;
    let detections = body["detections"].as_array().unwrap();
    assert_eq!(detections.len(), 1);
    assert_eq!(detections[0]["score"], Value::Null);
}

#[tokio::test]
async fn test_crop_skips_out_of_bounds_faces() {
    use base64::Engine;

    let app = app();
    let response = send(&app.router, image_upload("/detect/crop")).await;
    assert_eq!(response.status(), StatusCode::OK);

    let body = json_body(response).await;
    let faces = body["faces"].as_array().unwrap();
    assert_eq!(faces.len(), 3);
    assert_eq!(faces[0]["box"], serde_json::json!([10, 20, 41, 60]));

    let jpeg = base64::engine::general_purpose::STANDARD
        .decode(faces[0]["image_base64"].as_str().unwrap())
        .unwrap();
    let crop = image::load_from_memory(&jpeg).unwrap();
    assert_eq!((crop.width(), crop.height()), (31, 40));
}

#[tokio::test]
async fn test_annotated_returns_jpeg_of_same_size() {
    let app = app();
    let response = send(&app.router, image_upload("/detect/annotated?draw_keypoints=false")).await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(header_str(&response, "content-type"), Some("image/jpeg"));

    let bytes = body_bytes(response).await;
    let decoded = image::load_from_memory(&bytes).unwrap();
    assert_eq!((decoded.width(), decoded.height()), (100, 80));
}

#[tokio::test]
async fn test_call_budget_exhaustion() {
    let app = app_with(test_config(2), Script::Records(sample_records()), true);

    assert_eq!(send(&app.router, image_upload("/detect")).await.status(), StatusCode::OK);
    let response = send(&app.router, image_upload("/detect/full")).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(header_str(&response, "x-ratelimit-remaining"), Some("0"));

    let response = send(&app.router, image_upload("/detect")).await;
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(header_str(&response, "x-ratelimit-remaining"), Some("0"));
    assert_eq!(json_body(response).await["code"], "quota_exceeded");

    assert_eq!(app.calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_unreachable_counter_store_fails_closed() {
    let app = app_with_store(
        test_config(100),
        Script::Records(sample_records()),
        true,
        Arc::new(UnreachableStore),
    );

    let response = send(&app.router, image_upload("/detect")).await;
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(json_body(response).await["code"], "rate_limiter_unavailable");
    assert_eq!(app.calls.load(Ordering::SeqCst), 0);

    // Unmetered endpoints only authenticate.
    let response = send(&app.router, image_upload("/detect/crop")).await;
    assert_eq!(response.status(), StatusCode::OK);

    let response = send(&app.router, Request::get("/ready").body(Body::empty()).unwrap()).await;
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn test_crop_and_annotate_are_not_metered_by_default() {
    let app = app_with(test_config(1), Script::Records(sample_records()), true);

    for _ in 0..3 {
        let response = send(&app.router, image_upload("/detect/crop")).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert!(header_str(&response, "x-ratelimit-remaining").is_none());

        let response = send(&app.router, image_upload("/detect/annotated")).await;
        assert_eq!(response.status(), StatusCode::OK);
    }

    assert_eq!(send(&app.router, image_upload("/detect")).await.status(), StatusCode::OK);
    assert_eq!(
        send(&app.router, image_upload("/detect")).await.status(),
        StatusCode::TOO_MANY_REQUESTS
    );
}

#[tokio::test]
async fn test_invalid_image_is_rejected_without_detection() {
    let app = app();
    let response = send(&app.router, upload("/detect", Some(TOKEN), "file", b"definitely not an image")).await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(json_body(response).await["code"], "invalid_image");
    assert_eq!(app.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_missing_file_field() {
    let app = app();
    let response = send(&app.router, upload("/detect", Some(TOKEN), "image", &png_bytes(10, 10))).await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(json_body(response).await["code"], "bad_request");
}

#[tokio::test]
async fn test_detector_failure_is_bad_gateway() {
    let app = app_with(test_config(100), Script::Fail, true);
    let response = send(&app.router, image_upload("/detect/keypoints")).await;

    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    assert_eq!(json_body(response).await["code"], "detector_failure");
}

#[tokio::test]
async fn test_unknown_route_and_disabled_metrics() {
    let app = app();

    let response = send(&app.router, Request::get("/nope").body(Body::empty()).unwrap()).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let response = send(&app.router, Request::get("/metrics").body(Body::empty()).unwrap()).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
