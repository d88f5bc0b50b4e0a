//! Approximate token accounting for history windows.
//!
//! Exact counts come from the provider's usage report after a call. Window
//! policies need a number *before* the call, so they work from a cheap
//! character-ratio estimate accumulated in a [`TokenCounter`].

use super::message::ModelMessage;
use std::sync::atomic::{AtomicU64, Ordering};

/// Characters per token for English text. Most tokenizers average 3-4.
pub const DEFAULT_CHARS_PER_TOKEN: f64 = 3.5;

/// Maps text to an approximate token count.
pub trait TokenEstimator: Send + Sync {
    fn estimate(&self, text: &str) -> usize;
}

/// Estimates tokens as `ceil(chars / chars_per_token)`.
#[derive(Debug, Clone, Copy)]
pub struct CharRatioEstimator {
    chars_per_token: f64,
}

impl CharRatioEstimator {
    /// Falls back to [`DEFAULT_CHARS_PER_TOKEN`] for non-positive ratios.
    pub fn new(chars_per_token: f64) -> Self {
        let chars_per_token = if chars_per_token > 0.0 {
            chars_per_token
        } else {
            DEFAULT_CHARS_PER_TOKEN
        };
        Self { chars_per_token }
    }
}

impl Default for CharRatioEstimator {
    fn default() -> Self {
        Self::new(DEFAULT_CHARS_PER_TOKEN)
    }
}

impl TokenEstimator for CharRatioEstimator {
    fn estimate(&self, text: &str) -> usize {
        (text.chars().count() as f64 / self.chars_per_token).ceil() as usize
    }
}

/// Estimated tokens for every part of every message in `messages`.
pub fn estimate_messages(estimator: &dyn TokenEstimator, messages: &[ModelMessage]) -> u64 {
    messages
        .iter()
        .flat_map(|m| m.parts())
        .map(|p| estimator.estimate(&p.text_content()) as u64)
        .sum()
}

/// Running token estimate for one conversation.
///
/// Shared between the caller that records turns and a
/// [`ContextGuard`](super::ContextGuard) that reads the total.
#[derive(Debug, Default)]
pub struct TokenCounter {
    total: AtomicU64,
}

impl TokenCounter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, tokens: u64) {
        self.total.fetch_add(tokens, Ordering::Relaxed);
    }

    pub fn get(&self) -> u64 {
        self.total.load(Ordering::Relaxed)
    }

    pub fn reset(&self) {
        self.total.store(0, Ordering::Relaxed);
    }

    /// Add the estimate for `messages` and return the new total.
    pub fn record_messages(&self, estimator: &dyn TokenEstimator, messages: &[ModelMessage]) -> u64 {
        let tokens = estimate_messages(estimator, messages);
        self.total.fetch_add(tokens, Ordering::Relaxed) + tokens
    }
}
