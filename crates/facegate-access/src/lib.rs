//! Access control for the facegate service.
//!
//! This crate provides:
//! - API key authentication against a server secret
//! - Per-identity call budgets over a fixed window
//! - Counter stores backed by Redis or process memory

pub mod controller;
pub mod error;
pub mod store;

pub use controller::{
    AccessConfig, AccessController, AccessPolicy, Admission, Identity, RejectedCallPolicy,
    CALL_KEY_PREFIX,
};
pub use error::{AccessError, AccessResult};
pub use store::{CounterStore, InMemoryCounterStore, RedisCounterStore};
