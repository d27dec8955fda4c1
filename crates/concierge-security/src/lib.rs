//! Request admission for the Concierge framework.
//!
//! Provides the per-tenant sliding-window rate limiter that request handlers
//! consult before doing quota-limited work such as provider calls.
//!
//! # Main types
//!
//! - [`RateLimiter`]: Per-tenant sliding-window limiter.
//! - [`RateLimitConfig`]: `limit_per_minute` setting (0 = unlimited).
//! - [`RateLimitDecision`]: Result of a single check.

/// Sliding-window rate limiting.
pub mod rate_limit;

pub use rate_limit::{RateLimitConfig, RateLimitDecision, RateLimiter, WINDOW};
