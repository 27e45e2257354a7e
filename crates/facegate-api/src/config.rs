//! API configuration.

use std::collections::HashSet;
use std::str::FromStr;

use facegate_access::AccessConfig;
use facegate_detector::MtcnnClientConfig;
use facegate_media::MediaConfig;
use facegate_models::DetectionMode;
use tracing::warn;

/// Modes that count against the caller's budget unless overridden.
pub const DEFAULT_METERED_MODES: &[DetectionMode] = &[
    DetectionMode::Boxes,
    DetectionMode::Keypoints,
    DetectionMode::Full,
];

/// Where call-budget counters live.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CounterBackend {
    Redis,
    /// Per-process counters; budgets are not shared between replicas.
    Memory,
}

impl FromStr for CounterBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "redis" => Ok(Self::Redis),
            "memory" | "in-memory" => Ok(Self::Memory),
            other => Err(format!("unknown rate limit backend: {}", other)),
        }
    }
}

/// API server configuration.
#[derive(Debug, Clone)]
pub struct ApiConfig {
    /// Server host
    pub host: String,
    /// Server port
    pub port: u16,
    /// CORS origins
    pub cors_origins: Vec<String>,
    /// Per-IP requests per second
    pub rate_limit_rps: u32,
    /// Per-IP burst
    pub rate_limit_burst: u32,
    /// Max request body size
    pub max_body_size: usize,
    /// Environment (development/production)
    pub environment: String,
    /// Detection modes that consume call budget
    pub metered_modes: HashSet<DetectionMode>,
    /// Detector calls allowed to run at once
    pub max_concurrent_detections: usize,
    pub counter_backend: CounterBackend,
    pub redis_url: String,
    pub metrics_enabled: bool,
    pub access: AccessConfig,
    pub detector: MtcnnClientConfig,
    pub media: MediaConfig,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
            cors_origins: vec!["*".to_string()],
            rate_limit_rps: 10,
            rate_limit_burst: 20,
            max_body_size: 10 * 1024 * 1024, // 10MB
            environment: "development".to_string(),
            metered_modes: DEFAULT_METERED_MODES.iter().copied().collect(),
            max_concurrent_detections: 4,
            counter_backend: CounterBackend::Redis,
            redis_url: "redis://localhost:6379".to_string(),
            metrics_enabled: true,
            access: AccessConfig::default(),
            detector: MtcnnClientConfig::default(),
            media: MediaConfig::default(),
        }
    }
}

impl ApiConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        Self {
            host: std::env::var("API_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port: std::env::var("API_PORT")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(8000),
            cors_origins: std::env::var("CORS_ORIGINS")
                .map(|s| s.split(',').map(|s| s.trim().to_string()).collect())
                .unwrap_or_else(|_| vec!["*".to_string()]),
            rate_limit_rps: std::env::var("RATE_LIMIT_RPS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(10),
            rate_limit_burst: std::env::var("RATE_LIMIT_BURST")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(20),
            max_body_size: std::env::var("MAX_BODY_SIZE")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(10 * 1024 * 1024),
            environment: std::env::var("ENVIRONMENT").unwrap_or_else(|_| "development".to_string()),
            metered_modes: std::env::var("METERED_MODES")
                .map(|s| parse_modes(&s))
                .unwrap_or_else(|_| DEFAULT_METERED_MODES.iter().copied().collect()),
            max_concurrent_detections: std::env::var("MAX_CONCURRENT_DETECTIONS")
                .ok()
                .and_then(|s| s.parse().ok())
                .filter(|n: &usize| *n > 0)
                .unwrap_or(4),
            counter_backend: std::env::var("RATE_LIMIT_BACKEND")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(CounterBackend::Redis),
            redis_url: std::env::var("REDIS_URL")
                .unwrap_or_else(|_| "redis://localhost:6379".to_string()),
            metrics_enabled: std::env::var("METRICS_ENABLED")
                .map(|v| v == "true" || v == "1")
                .unwrap_or(true),
            access: AccessConfig::from_env(),
            detector: MtcnnClientConfig::from_env(),
            media: MediaConfig::from_env(),
        }
    }

    /// Check if running in production mode.
    pub fn is_production(&self) -> bool {
        self.environment.to_lowercase() == "production"
    }

    pub fn is_metered(&self, mode: DetectionMode) -> bool {
        self.metered_modes.contains(&mode)
    }
}

/// Parse a comma-separated mode list. Unknown names are logged and skipped;
/// an empty list meters nothing.
fn parse_modes(value: &str) -> HashSet<DetectionMode> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .filter_map(|s| match s.parse() {
            Ok(mode) => Some(mode),
            Err(e) => {
                warn!("Ignoring METERED_MODES entry: {}", e);
                None
            }
        })
        .collect()
}
