//! Detection handlers, one per mode.
//!
//! Every handler reads the multipart `file` field, runs the detector once and
//! applies only the post-processing its mode needs. Access checks have
//! already run in middleware by the time a handler is entered.

use std::time::Instant;

use axum::extract::multipart::MultipartRejection;
use axum::extract::rejection::QueryRejection;
use axum::extract::{Multipart, Query, State};
use axum::http::header;
use axum::response::IntoResponse;
use axum::Json;
use facegate_detector::DecodedImage;
use facegate_models::{
    AnnotationOptions, BoxesResponse, CropResponse, DetectionMode, DetectionParams, DetectionSet,
    FullResponse, KeypointsResponse,
};
use serde::Deserialize;
use tracing::debug;

use crate::error::{ApiError, ApiResult};
use crate::metrics;
use crate::state::AppState;

/// Name of the multipart field holding the image.
pub const FILE_FIELD: &str = "file";

/// Query parameters shared by the detection endpoints.
///
/// Parameters a mode does not use are ignored.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DetectQuery {
    pub min_face_size: Option<u32>,
    pub threshold_pnet: Option<f32>,
    pub threshold_rnet: Option<f32>,
    pub threshold_onet: Option<f32>,
    pub score_min: Option<f32>,
    pub draw_keypoints: Option<bool>,
    pub draw_scores: Option<bool>,
}

impl DetectQuery {
    pub fn params(&self) -> DetectionParams {
        let defaults = DetectionParams::default();
        DetectionParams {
            min_face_size: self.min_face_size.unwrap_or(defaults.min_face_size),
            threshold_pnet: self.threshold_pnet.unwrap_or(defaults.threshold_pnet),
            threshold_rnet: self.threshold_rnet.unwrap_or(defaults.threshold_rnet),
            threshold_onet: self.threshold_onet.unwrap_or(defaults.threshold_onet),
        }
    }

    pub fn score_min(&self, mode: DetectionMode) -> ApiResult<f32> {
        let score_min = self.score_min.unwrap_or_else(|| mode.default_score_min());
        if !score_min.is_finite() {
            return Err(ApiError::bad_request("score_min must be a finite number"));
        }
        Ok(score_min)
    }

    pub fn annotation(&self) -> AnnotationOptions {
        let defaults = AnnotationOptions::default();
        AnnotationOptions {
            draw_keypoints: self.draw_keypoints.unwrap_or(defaults.draw_keypoints),
            draw_scores: self.draw_scores.unwrap_or(defaults.draw_scores),
        }
    }
}

fn query(query: Result<Query<DetectQuery>, QueryRejection>) -> ApiResult<DetectQuery> {
    query
        .map(|Query(q)| q)
        .map_err(|e| ApiError::bad_request(e.body_text()))
}

/// Read the whole `file` field into memory.
async fn read_upload(multipart: Result<Multipart, MultipartRejection>) -> ApiResult<Vec<u8>> {
    let mut multipart = multipart.map_err(|e| ApiError::bad_request(e.body_text()))?;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::bad_request(format!("invalid multipart body: {}", e)))?
    {
        if field.name() == Some(FILE_FIELD) {
            let bytes = field
                .bytes()
                .await
                .map_err(|e| ApiError::bad_request(format!("failed to read upload: {}", e)))?;
            return Ok(bytes.to_vec());
        }
    }

    Err(ApiError::bad_request("missing 'file' field"))
}

/// Decode the upload and run the detector under a concurrency permit.
async fn detect(
    state: &AppState,
    bytes: Vec<u8>,
    params: &DetectionParams,
) -> ApiResult<(DecodedImage, DetectionSet)> {
    let decoded = tokio::task::spawn_blocking(move || DecodedImage::decode(bytes))
        .await
        .map_err(|e| ApiError::internal(format!("decode task failed: {}", e)))?;
    let image = decoded?;

    let wait = Instant::now();
    let _permit = state
        .detection_permits
        .acquire()
        .await
        .map_err(|_| ApiError::internal("detection permits closed"))?;
    metrics::record_permit_wait(wait.elapsed().as_secs_f64());

    let set = state.detector.detect(&image, params).await?;
    Ok((image, set))
}

/// Bounding boxes only.
pub async fn detect_boxes(
    State(state): State<AppState>,
    q: Result<Query<DetectQuery>, QueryRejection>,
    multipart: Result<Multipart, MultipartRejection>,
) -> ApiResult<Json<BoxesResponse>> {
    let q = query(q)?;
    let bytes = read_upload(multipart).await?;
    let (_, set) = detect(&state, bytes, &q.params()).await?;

    metrics::record_detection(DetectionMode::Boxes, set.len());
    Ok(Json(BoxesResponse::from(&set)))
}

/// Boxes with facial landmarks.
pub async fn detect_keypoints(
    State(state): State<AppState>,
    q: Result<Query<DetectQuery>, QueryRejection>,
    multipart: Result<Multipart, MultipartRejection>,
) -> ApiResult<Json<KeypointsResponse>> {
    let q = query(q)?;
    let bytes = read_upload(multipart).await?;
    let (_, set) = detect(&state, bytes, &q.params()).await?;

    metrics::record_detection(DetectionMode::Keypoints, set.len());
    Ok(Json(KeypointsResponse::from(&set)))
}

/// Full detection records, filtered by `score_min`.
pub async fn detect_full(
    State(state): State<AppState>,
    q: Result<Query<DetectQuery>, QueryRejection>,
    multipart: Result<Multipart, MultipartRejection>,
) -> ApiResult<Json<FullResponse>> {
    let q = query(q)?;
    let score_min = q.score_min(DetectionMode::Full)?;
    let bytes = read_upload(multipart).await?;
    let (_, set) = detect(&state, bytes, &q.params()).await?;

    let set = state.media.filter(set, score_min);
    metrics::record_detection(DetectionMode::Full, set.len());
    Ok(Json(FullResponse::from(set)))
}

/// One JPEG crop per face.
pub async fn detect_crop(
    State(state): State<AppState>,
    q: Result<Query<DetectQuery>, QueryRejection>,
    multipart: Result<Multipart, MultipartRejection>,
) -> ApiResult<Json<CropResponse>> {
    let q = query(q)?;
    let score_min = q.score_min(DetectionMode::Crop)?;
    let bytes = read_upload(multipart).await?;
    let (image, set) = detect(&state, bytes, &q.params()).await?;

    let set = state.media.filter(set, score_min);
    let media = state.media.clone();
    let faces = tokio::task::spawn_blocking(move || media.crop(image.raster(), &set))
        .await
        .map_err(|e| ApiError::internal(format!("crop task failed: {}", e)))??;

    debug!(faces = faces.len(), "Cropped faces");
    metrics::record_detection(DetectionMode::Crop, faces.len());
    Ok(Json(CropResponse { faces }))
}

/// The upload with boxes, keypoints and scores drawn on it, as JPEG.
pub async fn detect_annotated(
    State(state): State<AppState>,
    q: Result<Query<DetectQuery>, QueryRejection>,
    multipart: Result<Multipart, MultipartRejection>,
) -> ApiResult<impl IntoResponse> {
    let q = query(q)?;
    let score_min = q.score_min(DetectionMode::Annotated)?;
    let options = q.annotation();
    let bytes = read_upload(multipart).await?;
    let (image, set) = detect(&state, bytes, &q.params()).await?;

    let set = state.media.filter(set, score_min);
    let faces = set.len();
    let media = state.media.clone();
    let jpeg = tokio::task::spawn_blocking(move || media.annotate(image.raster(), &set, &options))
        .await
        .map_err(|e| ApiError::internal(format!("annotate task failed: {}", e)))??;

    metrics::record_detection(DetectionMode::Annotated, faces);
    Ok(([(header::CONTENT_TYPE, "image/jpeg")], jpeg))
}
