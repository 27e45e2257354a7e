//! API key authentication and per-identity call budgets.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};

use crate::error::{AccessError, AccessResult};
use crate::store::CounterStore;

/// Metric names.
pub mod names {
    pub const ACCESS_DENIED_TOTAL: &str = "facegate_access_denied_total";
    pub const QUOTA_REJECTIONS_TOTAL: &str = "facegate_quota_rejections_total";
    pub const COUNTER_STORE_ERRORS_TOTAL: &str = "facegate_counter_store_errors_total";
}

type HmacSha256 = Hmac<Sha256>;

/// Prefix of every call-budget key.
pub const CALL_KEY_PREFIX: &str = "facegate:calls:";

pub const DEFAULT_CALL_LIMIT: u64 = 100;
pub const DEFAULT_CALL_WINDOW: Duration = Duration::from_secs(3600);

/// What happens to the counter when a call is rejected for exceeding the
/// budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RejectedCallPolicy {
    /// Rejected calls stay counted.
    #[default]
    Count,
    /// Rejected calls are decremented again.
    Refund,
}

impl FromStr for RejectedCallPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "count" => Ok(Self::Count),
            "refund" => Ok(Self::Refund),
            other => Err(format!("unknown rejected-call policy: {}", other)),
        }
    }
}

/// Checks an endpoint runs before doing any work.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessPolicy {
    Authenticate,
    AuthenticateAndMeter,
}

/// Access controller configuration.
#[derive(Clone)]
pub struct AccessConfig {
    /// Server secret callers must present; `None` rejects every call
    pub app_token: Option<String>,
    /// Calls allowed per identity per window
    pub call_limit: u64,
    /// Window length, starting at an identity's first call
    pub window: Duration,
    pub rejected_policy: RejectedCallPolicy,
}

impl fmt::Debug for AccessConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccessConfig")
            .field("app_token", &self.app_token.as_ref().map(|_| "<redacted>"))
            .field("call_limit", &self.call_limit)
            .field("window", &self.window)
            .field("rejected_policy", &self.rejected_policy)
            .finish()
    }
}

impl Default for AccessConfig {
    fn default() -> Self {
        Self {
            app_token: None,
            call_limit: DEFAULT_CALL_LIMIT,
            window: DEFAULT_CALL_WINDOW,
            rejected_policy: RejectedCallPolicy::Count,
        }
    }
}

impl AccessConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        Self {
            app_token: std::env::var("APP_TOKEN").ok().filter(|s| !s.is_empty()),
            call_limit: std::env::var("CALL_LIMIT")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(DEFAULT_CALL_LIMIT),
            window: std::env::var("CALL_WINDOW_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .filter(|secs: &u64| *secs > 0)
                .map(Duration::from_secs)
                .unwrap_or(DEFAULT_CALL_WINDOW),
            rejected_policy: std::env::var("QUOTA_REJECTED_POLICY")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or_default(),
        }
    }
}

/// An authenticated caller, identified by the digest of its key.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct Identity(String);

impl Identity {
    fn of_key(key: &str) -> Self {
        Self(format!("{:x}", Sha256::digest(key.as_bytes())))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Counter key holding this identity's call budget.
    pub fn counter_key(&self) -> String {
        format!("{}{}", CALL_KEY_PREFIX, self.0)
    }
}

impl fmt::Debug for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Identity({}..)", &self.0[..self.0.len().min(8)])
    }
}

/// A request that passed its access policy.
#[derive(Debug, Clone)]
pub struct Admission {
    pub identity: Identity,
    /// Calls counted in the current window, if the endpoint is metered
    pub calls_used: Option<u64>,
    pub limit: u64,
}

impl Admission {
    pub fn remaining(&self) -> Option<u64> {
        self.calls_used.map(|used| self.limit.saturating_sub(used))
    }
}

/// Authenticates callers and enforces call budgets.
#[derive(Clone)]
pub struct AccessController {
    config: AccessConfig,
    /// MAC of the server secret under itself; presented keys must match it.
    secret_tag: Option<Vec<u8>>,
    store: Arc<dyn CounterStore>,
}

impl AccessController {
    pub fn new(config: AccessConfig, store: Arc<dyn CounterStore>) -> Self {
        let secret_tag = config
            .app_token
            .as_deref()
            .and_then(|secret| key_mac(secret, secret).ok())
            .map(|mac| mac.finalize().into_bytes().to_vec());
        if secret_tag.is_none() {
            warn!("APP_TOKEN is not set; every protected request will fail");
        }
        info!(
            limit = config.call_limit,
            window_secs = config.window.as_secs(),
            policy = ?config.rejected_policy,
            backend = store.backend(),
            "Access controller initialized"
        );
        Self {
            config,
            secret_tag,
            store,
        }
    }

    pub fn config(&self) -> &AccessConfig {
        &self.config
    }

    pub fn store_backend(&self) -> &'static str {
        self.store.backend()
    }

    /// Check `provided` against the server secret.
    pub fn authenticate(&self, provided: Option<&str>) -> AccessResult<Identity> {
        let (Some(secret), Some(expected)) =
            (self.config.app_token.as_deref(), self.secret_tag.as_deref())
        else {
            metrics::counter!(names::ACCESS_DENIED_TOTAL, "reason" => "misconfigured").increment(1);
            return Err(AccessError::misconfigured("APP_TOKEN is not configured"));
        };

        let provided = match provided {
            Some(key) if !key.is_empty() => key,
            _ => {
                metrics::counter!(names::ACCESS_DENIED_TOTAL, "reason" => "missing_key").increment(1);
                return Err(AccessError::Unauthorized);
            }
        };

        // verify_slice compares in constant time.
        if key_mac(secret, provided)?.verify_slice(expected).is_err() {
            metrics::counter!(names::ACCESS_DENIED_TOTAL, "reason" => "invalid_key").increment(1);
            return Err(AccessError::Unauthorized);
        }

        Ok(Identity::of_key(provided))
    }

    /// Count one call for `identity` and enforce the budget.
    ///
    /// Returns the number of calls used in the current window. The window
    /// starts at the first call; the counter expires `window` later. A
    /// counter left without an expiry gets one on its next call.
    pub async fn rate_limit(&self, identity: &Identity) -> AccessResult<u64> {
        let key = identity.counter_key();

        let count = self
            .store
            .increment_with_ttl(&key, self.config.window)
            .await
            .map_err(|e| {
                metrics::counter!(names::COUNTER_STORE_ERRORS_TOTAL, "op" => "increment").increment(1);
                e
            })?;

        if count > self.config.call_limit {
            metrics::counter!(names::QUOTA_REJECTIONS_TOTAL).increment(1);
            debug!(identity = ?identity, count, limit = self.config.call_limit, "Call limit exceeded");

            if self.config.rejected_policy == RejectedCallPolicy::Refund {
                if let Err(e) = self.store.decrement(&key).await {
                    warn!(error = %e, "Failed to refund rejected call");
                }
            }

            return Err(AccessError::QuotaExceeded {
                count,
                limit: self.config.call_limit,
            });
        }

        Ok(count)
    }

    /// Run `policy` for a request carrying `provided` as its key.
    pub async fn admit(&self, provided: Option<&str>, policy: AccessPolicy) -> AccessResult<Admission> {
        let identity = self.authenticate(provided)?;

        let calls_used = match policy {
            AccessPolicy::Authenticate => None,
            AccessPolicy::AuthenticateAndMeter => Some(self.rate_limit(&identity).await?),
        };

        Ok(Admission {
            identity,
            calls_used,
            limit: self.config.call_limit,
        })
    }

    /// Check that the counter store is reachable.
    pub async fn ping(&self) -> AccessResult<()> {
        self.store.ping().await
    }
}

/// HMAC-SHA256 of `key` under the server secret.
fn key_mac(secret: &str, key: &str) -> AccessResult<HmacSha256> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|e| AccessError::misconfigured(format!("invalid APP_TOKEN: {}", e)))?;
    mac.update(key.as_bytes());
    Ok(mac)
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, Ordering};

    use async_trait::async_trait;

    use super::*;
    use crate::store::InMemoryCounterStore;

    const TOKEN: &str = "s3cret-token";

    fn config(limit: u64, policy: RejectedCallPolicy) -> AccessConfig {
        AccessConfig {
            app_token: Some(TOKEN.to_string()),
            call_limit: limit,
            window: Duration::from_secs(3600),
            rejected_policy: policy,
        }
    }

    fn controller(limit: u64, policy: RejectedCallPolicy) -> (AccessController, Arc<InMemoryCounterStore>) {
        let store = Arc::new(InMemoryCounterStore::new());
        (AccessController::new(config(limit, policy), store.clone()), store)
    }

    /// Counter store whose first increment is applied without an expiry and
    /// then reported as failed, like a connection dropping mid-call.
    #[derive(Default)]
    struct LostExpiryStore {
        inner: InMemoryCounterStore,
        failed: AtomicBool,
    }

    #[async_trait]
    impl CounterStore for LostExpiryStore {
        async fn increment(&self, key: &str) -> AccessResult<u64> {
            self.inner.increment(key).await
        }

        async fn increment_with_ttl(&self, key: &str, ttl: Duration) -> AccessResult<u64> {
            if !self.failed.swap(true, Ordering::SeqCst) {
                self.inner.increment(key).await?;
                return Err(AccessError::unavailable("connection reset"));
            }
            self.inner.increment_with_ttl(key, ttl).await
        }

        async fn expire(&self, key: &str, ttl: Duration) -> AccessResult<()> {
            self.inner.expire(key, ttl).await
        }

        async fn decrement(&self, key: &str) -> AccessResult<u64> {
            self.inner.decrement(key).await
        }

        async fn ping(&self) -> AccessResult<()> {
            self.inner.ping().await
        }

        fn backend(&self) -> &'static str {
            "lost-expiry"
        }
    }

    /// Counter store that is never reachable.
    struct DownStore;

    #[async_trait]
    impl CounterStore for DownStore {
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
            "down"
        }
    }

    #[test]
    fn test_authenticate_accepts_matching_key() {
        let (access, _) = controller(100, RejectedCallPolicy::Count);
        let identity = access.authenticate(Some(TOKEN)).unwrap();
        assert_eq!(identity.as_str().len(), 64);
        assert!(identity.counter_key().starts_with(CALL_KEY_PREFIX));
    }

    #[test]
    fn test_authenticate_rejects_missing_and_wrong_keys() {
        let (access, _) = controller(100, RejectedCallPolicy::Count);
        for provided in [None, Some(""), Some("wrong"), Some("s3cret-token ")] {
            assert!(
                matches!(access.authenticate(provided), Err(AccessError::Unauthorized)),
                "{:?}",
                provided
            );
        }
    }

    #[test]
    fn test_missing_secret_is_misconfiguration() {
        let store = Arc::new(InMemoryCounterStore::new());
        let access = AccessController::new(AccessConfig::default(), store);

        assert!(matches!(
            access.authenticate(Some("anything")),
            Err(AccessError::ServerMisconfigured(_))
        ));
        assert!(matches!(access.authenticate(None), Err(AccessError::ServerMisconfigured(_))));
    }

    #[tokio::test]
    async fn test_call_over_limit_is_rejected_and_still_counted() {
        let (access, store) = controller(100, RejectedCallPolicy::Count);
        let identity = access.authenticate(Some(TOKEN)).unwrap();

        for expected in 1..=100 {
            assert_eq!(access.rate_limit(&identity).await.unwrap(), expected);
        }

        let err = access.rate_limit(&identity).await.unwrap_err();
        assert!(matches!(err, AccessError::QuotaExceeded { count: 101, limit: 100 }));
        assert_eq!(store.current(&identity.counter_key()), Some(101));
    }

    #[tokio::test]
    async fn test_refund_policy_restores_count() {
        let (access, store) = controller(2, RejectedCallPolicy::Refund);
        let identity = access.authenticate(Some(TOKEN)).unwrap();

        access.rate_limit(&identity).await.unwrap();
        access.rate_limit(&identity).await.unwrap();
        assert!(access.rate_limit(&identity).await.is_err());
        assert!(access.rate_limit(&identity).await.is_err());

        assert_eq!(store.current(&identity.counter_key()), Some(2));
    }

    #[tokio::test(start_paused = true)]
    async fn test_window_resets_after_expiry() {
        let (access, _) = controller(3, RejectedCallPolicy::Count);
        let identity = access.authenticate(Some(TOKEN)).unwrap();

        for _ in 0..4 {
            let _ = access.rate_limit(&identity).await;
        }
        assert!(access.rate_limit(&identity).await.is_err());

        tokio::time::advance(Duration::from_secs(3600)).await;

        assert_eq!(access.rate_limit(&identity).await.unwrap(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_lost_expiry_is_restored_on_next_call() {
        let store = Arc::new(LostExpiryStore::default());
        let access = AccessController::new(config(3, RejectedCallPolicy::Count), store.clone());
        let identity = access.authenticate(Some(TOKEN)).unwrap();

        assert!(matches!(
            access.rate_limit(&identity).await,
            Err(AccessError::RateLimiterUnavailable(_))
        ));
        assert_eq!(access.rate_limit(&identity).await.unwrap(), 2);
        assert_eq!(access.rate_limit(&identity).await.unwrap(), 3);
        assert!(matches!(
            access.rate_limit(&identity).await,
            Err(AccessError::QuotaExceeded { count: 4, limit: 3 })
        ));

        tokio::time::advance(Duration::from_secs(3600)).await;

        assert_eq!(access.rate_limit(&identity).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_unreachable_store_rejects_metered_calls() {
        let access = AccessController::new(config(100, RejectedCallPolicy::Count), Arc::new(DownStore));
        let identity = access.authenticate(Some(TOKEN)).unwrap();

        assert!(matches!(
            access.rate_limit(&identity).await,
            Err(AccessError::RateLimiterUnavailable(_))
        ));
        assert!(matches!(
            access.admit(Some(TOKEN), AccessPolicy::AuthenticateAndMeter).await,
            Err(AccessError::RateLimiterUnavailable(_))
        ));
        assert!(access.admit(Some(TOKEN), AccessPolicy::Authenticate).await.is_ok());
        assert!(access.ping().await.is_err());
    }

    #[test]
    fn test_identity_is_key_digest() {
        let (access, _) = controller(100, RejectedCallPolicy::Count);
        let identity = access.authenticate(Some(TOKEN)).unwrap();
        assert_eq!(identity.as_str(), format!("{:x}", Sha256::digest(TOKEN.as_bytes())));
        assert!(!identity.counter_key().contains(TOKEN));
    }

    #[tokio::test]
    async fn test_admit_metering_by_policy() {
        let (access, store) = controller(5, RejectedCallPolicy::Count);

        let admission = access.admit(Some(TOKEN), AccessPolicy::Authenticate).await.unwrap();
        assert_eq!(admission.calls_used, None);
        assert_eq!(admission.remaining(), None);
        assert_eq!(store.current(&admission.identity.counter_key()), None);

        let admission = access
            .admit(Some(TOKEN), AccessPolicy::AuthenticateAndMeter)
            .await
            .unwrap();
        assert_eq!(admission.calls_used, Some(1));
        assert_eq!(admission.remaining(), Some(4));
    }

    #[tokio::test]
    async fn test_unauthorized_calls_are_not_counted() {
        let (access, store) = controller(5, RejectedCallPolicy::Count);
        let result = access.admit(Some("wrong"), AccessPolicy::AuthenticateAndMeter).await;
        assert!(matches!(result, Err(AccessError::Unauthorized)));

        let identity = access.authenticate(Some(TOKEN)).unwrap();
        assert_eq!(store.current(&identity.counter_key()), None);
    }

    #[test]
    fn test_rejected_policy_parse() {
        assert_eq!("count".parse::<RejectedCallPolicy>().unwrap(), RejectedCallPolicy::Count);
        assert_eq!(" Refund ".parse::<RejectedCallPolicy>().unwrap(), RejectedCallPolicy::Refund);
        assert!("drop".parse::<RejectedCallPolicy>().is_err());
    }

    #[test]
    fn test_config_debug_redacts_token() {
        let config = AccessConfig {
            app_token: Some(TOKEN.to_string()),
            ..AccessConfig::default()
        };
        let rendered = format!("{:?}", config);
        assert!(!rendered.contains(TOKEN));
        assert!(rendered.contains("<redacted>"));
    }
}
