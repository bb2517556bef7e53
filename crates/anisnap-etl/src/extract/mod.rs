//! Extraction from the Jikan API
//!
//! Pages are fetched strictly in order. Every request first passes the
//! shared [`RateLimiter`], then runs under a [`RetryPolicy`]; a page that
//! cannot be fetched or parsed ends pagination for that job without
//! discarding what was already collected.

pub mod client;
pub mod models;
pub mod rate_limiter;
pub mod retry;

pub use client::{ExtractOutcome, JikanExtractor, StopReason, DEFAULT_RETRY_AFTER};
pub use models::{JikanAnime, SearchResponse};
pub use rate_limiter::RateLimiter;
pub use retry::RetryPolicy;
