//! Application state.

use std::sync::Arc;

use anyhow::Context;
use facegate_access::{AccessController, CounterStore, InMemoryCounterStore, RedisCounterStore};
use facegate_detector::{DetectorAdapter, FaceDetector, MtcnnClient};
use facegate_media::PostProcessor;
use tokio::sync::Semaphore;
use tracing::{info, warn};

use crate::config::{ApiConfig, CounterBackend};
use crate::middleware::IpRateLimiter;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub config: ApiConfig,
    pub detector: DetectorAdapter,
    pub access: AccessController,
    pub media: PostProcessor,
    /// Bounds the number of detector calls in flight.
    pub detection_permits: Arc<Semaphore>,
    pub ip_limiter: IpRateLimiter,
}

impl AppState {
    /// Build state from configuration, connecting the MTCNN client and the
    /// configured counter store.
    pub fn new(config: ApiConfig) -> anyhow::Result<Self> {
        let detector = MtcnnClient::new(config.detector.clone())
            .context("failed to create MTCNN client")?;
        info!(url = %detector.base_url(), "Using MTCNN detector service");

        let store: Arc<dyn CounterStore> = match config.counter_backend {
            CounterBackend::Redis => Arc::new(
                RedisCounterStore::new(&config.redis_url).context("failed to create Redis counter store")?,
            ),
            CounterBackend::Memory => {
                warn!("Using in-memory call budgets; limits are per process");
                Arc::new(InMemoryCounterStore::new())
            }
        };

        let media = PostProcessor::new(&config.media).context("failed to initialize post-processor")?;

        Ok(Self::from_parts(config, Arc::new(detector), store, media))
    }

    /// Assemble state from already constructed components.
    pub fn from_parts(
        config: ApiConfig,
        detector: Arc<dyn FaceDetector>,
        store: Arc<dyn CounterStore>,
        media: PostProcessor,
    ) -> Self {
        let access = AccessController::new(config.access.clone(), store);
        let detection_permits = Arc::new(Semaphore::new(config.max_concurrent_detections.max(1)));
        let ip_limiter = IpRateLimiter::new(config.rate_limit_rps, config.rate_limit_burst);

        Self {
            detector: DetectorAdapter::new(detector),
            access,
            media,
            detection_permits,
            ip_limiter,
            config,
        }
    }
}
