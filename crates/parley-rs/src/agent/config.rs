//! Per-agent model settings.
//!
//! ```ignore
//! let config = AgentConfig::new("gpt-4o-mini")
//!     .with_system_prompt("You are a helpful assistant.")
//!     .with_temperature(0.3)
//!     .with_reasoning_effort(ReasoningEffort::High)
//!     .with_retries(3);
//! ```

use crate::api::RetryConfig;
use crate::{DEFAULT_MAX_TOKENS, ReasoningEffort};
use std::time::Duration;

/// Tool rounds allowed per run before the agent gives up.
pub const DEFAULT_MAX_TOOL_ROUNDS: u32 = 8;

#[derive(Debug, Clone)]
pub struct AgentConfig {
    /// Model name as the provider knows it (no `provider:` prefix).
    pub model: String,
    /// Sent only when a run starts a new conversation.
    pub system_prompt: Option<String>,
    pub max_tokens: u32,
    pub temperature: Option<f32>,
    pub top_p: Option<f32>,
    pub seed: Option<u64>,
    pub stop: Option<Vec<String>>,
    pub reasoning_effort: Option<ReasoningEffort>,
    /// Ask for a free-form JSON object answer.
    pub json_mode: bool,
    pub max_tool_rounds: u32,
    pub retry: RetryConfig,
    /// Limit for one model call, retries excluded. `None` relies on the
    /// client's HTTP timeout.
    pub request_timeout: Option<Duration>,
}

impl AgentConfig {
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            system_prompt: None,
            max_tokens: DEFAULT_MAX_TOKENS,
            temperature: None,
            top_p: None,
            seed: None,
            stop: None,
            reasoning_effort: None,
            json_mode: false,
            max_tool_rounds: DEFAULT_MAX_TOOL_ROUNDS,
            retry: RetryConfig::with_retries(2),
            request_timeout: None,
        }
    }

    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(prompt.into());
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn with_top_p(mut self, top_p: f32) -> Self {
        self.top_p = Some(top_p);
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn with_stop(mut self, stop: Vec<String>) -> Self {
        self.stop = if stop.is_empty() { None } else { Some(stop) };
        self
    }

    pub fn with_reasoning_effort(mut self, effort: ReasoningEffort) -> Self {
        self.reasoning_effort = Some(effort);
        self
    }

    pub fn with_json_mode(mut self, enabled: bool) -> Self {
        self.json_mode = enabled;
        self
    }

    pub fn with_max_tool_rounds(mut self, rounds: u32) -> Self {
        self.max_tool_rounds = rounds;
        self
    }

    pub fn with_retries(mut self, retries: u32) -> Self {
        self.retry.max_retries = retries;
        self
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = Some(timeout);
        self
    }
}
