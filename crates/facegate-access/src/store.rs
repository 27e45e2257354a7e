//! Atomic counters with expiry.
//!
//! `RedisCounterStore` is the production backend; `InMemoryCounterStore`
//! keeps the same semantics inside a single process.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use redis::{AsyncCommands, Script};
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::error::{AccessError, AccessResult};

/// Shared counter storage keyed by string.
#[async_trait]
pub trait CounterStore: Send + Sync {
    /// Atomically add one and return the new value. Missing keys start at 0.
    async fn increment(&self, key: &str) -> AccessResult<u64>;

    /// Like `increment`, and in the same atomic step give the key a
    /// time-to-live of `ttl` if it has none. An existing deadline is kept.
    async fn increment_with_ttl(&self, key: &str, ttl: Duration) -> AccessResult<u64>;

    /// Set the time-to-live of an existing key.
    async fn expire(&self, key: &str, ttl: Duration) -> AccessResult<()>;

    /// Atomically subtract one and return the new value. Missing or expired
    /// keys are left absent and report 0.
    async fn decrement(&self, key: &str) -> AccessResult<u64>;

    /// Check that the store is reachable.
    async fn ping(&self) -> AccessResult<()>;

    fn backend(&self) -> &'static str;
}

// Any key without a TTL gets one, not only a key created by this INCR.
const INCR_WITH_TTL: &str = r#"
local count = redis.call('INCR', KEYS[1])
if redis.call('TTL', KEYS[1]) == -1 then
    redis.call('EXPIRE', KEYS[1], ARGV[1])
end
return count
"#;

// DECR on a missing key would create it at -1 with no TTL.
const DECR_IF_EXISTS: &str = r#"
if redis.call('EXISTS', KEYS[1]) == 1 then
    return redis.call('DECR', KEYS[1])
end
return 0
"#;

/// Counter store backed by Redis INCR / EXPIRE / DECR.
pub struct RedisCounterStore {
    client: redis::Client,
    conn: tokio::sync::Mutex<Option<MultiplexedConnection>>,
    incr_with_ttl: Script,
    decr_if_exists: Script,
}

impl RedisCounterStore {
    /// Create a store. No connection is made until first use.
    pub fn new(redis_url: &str) -> AccessResult<Self> {
        let client = redis::Client::open(redis_url)
            .map_err(|e| AccessError::misconfigured(format!("invalid REDIS_URL: {}", e)))?;
        Ok(Self {
            client,
            conn: tokio::sync::Mutex::new(None),
            incr_with_ttl: Script::new(INCR_WITH_TTL),
            decr_if_exists: Script::new(DECR_IF_EXISTS),
        })
    }

    async fn connection(&self) -> AccessResult<MultiplexedConnection> {
        let mut guard = self.conn.lock().await;
        if let Some(conn) = guard.as_ref() {
            return Ok(conn.clone());
        }

        let conn = self.client.get_multiplexed_async_connection().await.map_err(|e| {
            warn!(error = %e, "Failed to connect to Redis");
            AccessError::from(e)
        })?;
        debug!("Connected to Redis counter store");
        *guard = Some(conn.clone());
        Ok(conn)
    }

    /// Drop a cached connection after a transport failure so the next call
    /// reconnects.
    async fn on_error(&self, err: redis::RedisError) -> AccessError {
        if err.is_io_error() || err.is_connection_dropped() || err.is_connection_refusal() {
            *self.conn.lock().await = None;
        }
        warn!(error = %err, "Redis counter store error");
        AccessError::from(err)
    }
}

#[async_trait]
impl CounterStore for RedisCounterStore {
    async fn increment(&self, key: &str) -> AccessResult<u64> {
        let mut conn = self.connection().await?;
        match conn.incr::<_, _, i64>(key, 1).await {
            Ok(count) => Ok(count.max(0) as u64),
            Err(e) => Err(self.on_error(e).await),
        }
    }

    async fn increment_with_ttl(&self, key: &str, ttl: Duration) -> AccessResult<u64> {
        let mut conn = self.connection().await?;
        let result: redis::RedisResult<i64> = self
            .incr_with_ttl
            .key(key)
            .arg(ttl_secs(ttl))
            .invoke_async(&mut conn)
            .await;
        match result {
            Ok(count) => Ok(count.max(0) as u64),
            Err(e) => Err(self.on_error(e).await),
        }
    }

    async fn expire(&self, key: &str, ttl: Duration) -> AccessResult<()> {
        let mut conn = self.connection().await?;
        match conn.expire::<_, ()>(key, ttl_secs(ttl)).await {
            Ok(()) => Ok(()),
            Err(e) => Err(self.on_error(e).await),
        }
    }

    async fn decrement(&self, key: &str) -> AccessResult<u64> {
        let mut conn = self.connection().await?;
        let result: redis::RedisResult<i64> =
            self.decr_if_exists.key(key).invoke_async(&mut conn).await;
        match result {
            Ok(count) => Ok(count.max(0) as u64),
            Err(e) => Err(self.on_error(e).await),
        }
    }

    async fn ping(&self) -> AccessResult<()> {
        let mut conn = self.connection().await?;
        match redis::cmd("PING").query_async::<String>(&mut conn).await {
            Ok(_) => Ok(()),
            Err(e) => Err(self.on_error(e).await),
        }
    }

    fn backend(&self) -> &'static str {
        "redis"
    }
}

/// Redis TTLs are whole seconds; a zero TTL would delete the key.
fn ttl_secs(ttl: Duration) -> i64 {
    ttl.as_secs().max(1) as i64
}

#[derive(Debug, Clone, Copy)]
struct Counter {
    value: u64,
    expires_at: Option<Instant>,
}

impl Counter {
    const FRESH: Counter = Counter {
        value: 0,
        expires_at: None,
    };

    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.map_or(true, |deadline| now < deadline)
    }
}

/// Process-local counter store.
///
/// Every operation is a single critical section, so increments are atomic
/// across tasks. Expired keys are treated as absent and purged lazily.
#[derive(Debug, Default)]
pub struct InMemoryCounterStore {
    counters: Mutex<HashMap<String, Counter>>,
}

impl InMemoryCounterStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current value of a live key.
    pub fn current(&self, key: &str) -> Option<u64> {
        let counters = self.counters.lock().ok()?;
        counters
            .get(key)
            .filter(|c| c.is_live(Instant::now()))
            .map(|c| c.value)
    }

    /// Add one to the live counter at `key`, restarting it if it expired.
    fn bump<'a>(counters: &'a mut HashMap<String, Counter>, key: &str, now: Instant) -> &'a mut Counter {
        let counter = counters.entry(key.to_string()).or_insert(Counter::FRESH);
        if !counter.is_live(now) {
            *counter = Counter::FRESH;
        }
        counter.value += 1;
        counter
    }

    fn with_counters<T>(&self, f: impl FnOnce(&mut HashMap<String, Counter>) -> T) -> AccessResult<T> {
        let mut counters = self
            .counters
            .lock()
            .map_err(|_| AccessError::unavailable("in-memory counter store lock poisoned"))?;
        Ok(f(&mut counters))
    }
}

#[async_trait]
impl CounterStore for InMemoryCounterStore {
    async fn increment(&self, key: &str) -> AccessResult<u64> {
        let now = Instant::now();
        self.with_counters(|counters| Self::bump(counters, key, now).value)
    }

    async fn increment_with_ttl(&self, key: &str, ttl: Duration) -> AccessResult<u64> {
        let now = Instant::now();
        self.with_counters(|counters| {
            let counter = Self::bump(counters, key, now);
            counter.expires_at.get_or_insert(now + ttl);
            counter.value
        })
    }

    async fn expire(&self, key: &str, ttl: Duration) -> AccessResult<()> {
        let now = Instant::now();
        self.with_counters(|counters| {
            if let Some(counter) = counters.get_mut(key).filter(|c| c.is_live(now)) {
                counter.expires_at = Some(now + ttl);
            }
        })
    }

    async fn decrement(&self, key: &str) -> AccessResult<u64> {
        let now = Instant::now();
        self.with_counters(|counters| {
            let Some(counter) = counters.get_mut(key).filter(|c| c.is_live(now)) else {
                counters.remove(key);
                return 0;
            };
            counter.value = counter.value.saturating_sub(1);
            counter.value
        })
    }

    async fn ping(&self) -> AccessResult<()> {
        self.with_counters(|_| ())
    }

    fn backend(&self) -> &'static str {
        "memory"
    }
}
