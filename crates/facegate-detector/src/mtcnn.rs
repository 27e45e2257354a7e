//! HTTP client for an MTCNN inference service.
//!
//! The service runs the pretrained three-stage cascade (P-Net, R-Net, O-Net)
//! and answers with the cascade's native records:
//!
//! ```json
//! [{"box": [x, y, w, h], "confidence": 0.99,
//!   "keypoints": {"left_eye": [x, y], "right_eye": [x, y], "nose": [x, y],
//!                 "mouth_left": [x, y], "mouth_right": [x, y]}}]
//! ```
//!
//! A `{"faces": [...]}` envelope is accepted as well.

use std::time::Duration;

use async_trait::async_trait;
use facegate_models::DetectionParams;
use reqwest::{header, Client};
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, warn};

use crate::decode::DecodedImage;
use crate::detector::FaceDetector;
use crate::error::{DetectorError, DetectorResult};
use crate::raw::{BoxFormat, RawDetection};

/// Configuration for the MTCNN client.
#[derive(Debug, Clone)]
pub struct MtcnnClientConfig {
    /// Base URL of the inference service
    pub base_url: String,
    /// Request timeout
    pub timeout: Duration,
}

impl Default for MtcnnClientConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8001".to_string(),
            timeout: Duration::from_secs(30),
        }
    }
}

impl MtcnnClientConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        Self {
            base_url: std::env::var("DETECTOR_URL")
                .map(|s| s.trim_end_matches('/').to_string())
                .unwrap_or_else(|_| "http://localhost:8001".to_string()),
            timeout: Duration::from_secs(
                std::env::var("DETECTOR_TIMEOUT")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(30),
            ),
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum MtcnnResponse {
    Records(Vec<Value>),
    Envelope { faces: Vec<Value> },
}

impl MtcnnResponse {
    fn into_records(self) -> Vec<Value> {
        match self {
            MtcnnResponse::Records(records) => records,
            MtcnnResponse::Envelope { faces } => faces,
        }
    }
}

#[derive(Deserialize)]
struct HealthResponse {
    status: String,
}

/// Client for the MTCNN inference service.
pub struct MtcnnClient {
    http: Client,
    config: MtcnnClientConfig,
}

impl MtcnnClient {
    /// Create a new MTCNN client.
    pub fn new(config: MtcnnClientConfig) -> DetectorResult<Self> {
        let http = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(DetectorError::Network)?;

        Ok(Self { http, config })
    }

    /// Create from environment variables.
    pub fn from_env() -> DetectorResult<Self> {
        Self::new(MtcnnClientConfig::from_env())
    }

    pub fn base_url(&self) -> &str {
        &self.config.base_url
    }
}

#[async_trait]
impl FaceDetector for MtcnnClient {
    async fn detect(
        &self,
        image: &DecodedImage,
        params: &DetectionParams,
    ) -> DetectorResult<Vec<RawDetection>> {
        let url = format!("{}/detect", self.config.base_url);

        debug!(
            url = %url,
            bytes = image.bytes().len(),
            min_face_size = params.min_face_size,
            "Sending image to MTCNN service"
        );

        let response = self
            .http
            .post(&url)
            .query(&[
                ("min_face_size", params.min_face_size.to_string()),
                ("threshold_pnet", params.threshold_pnet.to_string()),
                ("threshold_rnet", params.threshold_rnet.to_string()),
                ("threshold_onet", params.threshold_onet.to_string()),
            ])
            .header(header::CONTENT_TYPE, image.mime_type())
            .body(image.bytes().to_vec())
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    DetectorError::Timeout(self.config.timeout.as_secs())
                } else {
                    DetectorError::Network(e)
                }
            })?;

        // The upload already decoded locally, so any rejection here is the
        // service's fault or a parameter it refused.
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(DetectorError::failed(format!(
                "MTCNN service returned {}: {}",
                status, body
            )));
        }

        let parsed: MtcnnResponse = response
            .json()
            .await
            .map_err(|e| DetectorError::InvalidResponse(e.to_string()))?;

        // Records that are not objects are dropped here; everything else is
        // left for normalization.
        Ok(parsed
            .into_records()
            .into_iter()
            .filter_map(|record| serde_json::from_value(record).ok())
            .collect())
    }

    fn box_format(&self) -> BoxFormat {
        BoxFormat::Xywh
    }

    fn name(&self) -> &'static str {
        "mtcnn"
    }

    async fn health_check(&self) -> bool {
        let url = format!("{}/health", self.config.base_url);

        match self.http.get(&url).send().await {
            Ok(response) if response.status().is_success() => {
                match response.json::<HealthResponse>().await {
                    Ok(health) => health.status == "healthy" || health.status == "ok",
                    Err(e) => {
                        warn!("MTCNN health response unreadable: {}", e);
                        false
                    }
                }
            }
            Ok(response) => {
                warn!("MTCNN health check failed: {}", response.status());
                false
            }
            Err(e) => {
                warn!("MTCNN health check error: {}", e);
                false
            }
        }
    }
}
