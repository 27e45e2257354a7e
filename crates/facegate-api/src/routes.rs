//! API routes.

use axum::extract::DefaultBodyLimit;
use axum::middleware;
use axum::routing::{get, post, MethodRouter};
use axum::Router;
use facegate_access::AccessPolicy;
use facegate_models::DetectionMode;
use metrics_exporter_prometheus::PrometheusHandle;
use tower_http::limit::RequestBodyLimitLayer;

use crate::handlers::{
    detect_annotated, detect_boxes, detect_crop, detect_full, detect_keypoints, health, ready, root,
};
use crate::metrics::metrics_middleware;
use crate::middleware::{
    access_gate, cors_layer, not_found, rate_limit_middleware, request_id, request_logging,
    security_headers, AccessGate,
};
use crate::state::AppState;

fn handler_for(mode: DetectionMode) -> MethodRouter<AppState> {
    match mode {
        DetectionMode::Boxes => post(detect_boxes),
        DetectionMode::Keypoints => post(detect_keypoints),
        DetectionMode::Full => post(detect_full),
        DetectionMode::Crop => post(detect_crop),
        DetectionMode::Annotated => post(detect_annotated),
    }
}

/// Detection endpoints, split by access policy.
fn detection_routes(state: &AppState) -> Router<AppState> {
    let (metered, auth_only) = DetectionMode::ALL.iter().fold(
        (Router::new(), Router::new()),
        |(metered, auth_only), &mode| {
            if state.config.is_metered(mode) {
                (metered.route(mode.path(), handler_for(mode)), auth_only)
            } else {
                (metered, auth_only.route(mode.path(), handler_for(mode)))
            }
        },
    );

    let metered = metered.layer(middleware::from_fn_with_state(
        AccessGate::new(state.access.clone(), AccessPolicy::AuthenticateAndMeter),
        access_gate,
    ));
    let auth_only = auth_only.layer(middleware::from_fn_with_state(
        AccessGate::new(state.access.clone(), AccessPolicy::Authenticate),
        access_gate,
    ));

    // Flood protection runs before authentication and budget accounting.
    metered
        .merge(auth_only)
        .layer(middleware::from_fn_with_state(
            state.ip_limiter.clone(),
            rate_limit_middleware,
        ))
}

/// Create the API router.
pub fn create_router(state: AppState, metrics_handle: Option<PrometheusHandle>) -> Router {
    let detect_routes = detection_routes(&state);

    let health_routes = Router::new()
        .route("/", get(root))
        .route("/health", get(health))
        .route("/ready", get(ready));

    // Metrics endpoint (if enabled)
    let metrics_routes = if let Some(handle) = metrics_handle {
        Router::new().route("/metrics", get(move || async move { handle.render() }))
    } else {
        Router::new()
    };

    Router::new()
        .merge(detect_routes.clone())
        .nest("/api", detect_routes)
        .merge(health_routes)
        .merge(metrics_routes)
        .fallback(not_found)
        // Uploads are bounded by RequestBodyLimitLayer alone.
        .layer(DefaultBodyLimit::disable())
        .layer(RequestBodyLimitLayer::new(state.config.max_body_size))
        .layer(middleware::from_fn(metrics_middleware))
        .layer(middleware::from_fn(security_headers))
        .layer(middleware::from_fn(request_id))
        .layer(middleware::from_fn(request_logging))
        .layer(cors_layer(&state.config.cors_origins))
        .with_state(state)
}
