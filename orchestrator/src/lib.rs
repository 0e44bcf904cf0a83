//! Cascading multi-theme retrieval.
//!
//! One query is rewritten through a fixed, ordered set of themes; each
//! sub-query is embedded and searched independently behind a per-caller
//! token bucket, and the hits come back grouped by theme in configured order.

pub mod api;
pub mod cascade;
pub mod config;
pub mod error;
pub mod metrics;
pub mod middleware;
pub mod models;
pub mod rate_limiter;
pub mod redis_client;
pub mod upstream;

pub use cascade::{CascadeConfig, Orchestrator};
pub use error::CascadeError;
pub use models::{CascadeResponse, CascadeResult, Hit, Query};
pub use rate_limiter::{Decision, RateLimiter, RateLimiterConfig};
