//! Support for the HTTP layer: retry with backoff and usage accounting.
//!
//! - [`retry`]: exponential backoff for transient failures (429, 5xx,
//!   network errors, timeouts). Never retries 4xx client errors.
//! - [`usage`]: run ids, cumulative token [`Usage`], and per-model pricing
//!   for cost estimates.

pub mod retry;
pub mod usage;

pub use retry::{RetryConfig, retry_call};
pub use usage::{ModelPricing, Usage, generate_run_id, pricing_for_model};
