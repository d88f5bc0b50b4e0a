//! Run ids, token usage totals and approximate cost.

use crate::UsageInfo;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::SystemTime;

/// Unique id for one agent run, used to correlate log lines.
pub fn generate_run_id() -> String {
    let ts = SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos();
    static COUNTER: AtomicU64 = AtomicU64::new(0);
    let count = COUNTER.fetch_add(1, Ordering::Relaxed);
    format!("run-{ts:x}-{count:04x}")
}

/// USD per 1M tokens.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ModelPricing {
    pub input_per_million: f64,
    pub output_per_million: f64,
}

impl ModelPricing {
    const fn new(input_per_million: f64, output_per_million: f64) -> Self {
        Self {
            input_per_million,
            output_per_million,
        }
    }

    pub fn estimate_cost(&self, input_tokens: u64, output_tokens: u64) -> f64 {
        (input_tokens as f64 / 1_000_000.0) * self.input_per_million
            + (output_tokens as f64 / 1_000_000.0) * self.output_per_million
    }
}

/// Approximate pricing by model name; local models are free.
///
/// Accepts bare names, OpenRouter paths (`openai/gpt-4o-mini`) and
/// provider-prefixed references (`openai:gpt-4o-mini`).
pub fn pricing_for_model(model: &str) -> ModelPricing {
    let model = crate::ModelRef::parse(model).name;
    let name = model.rsplit('/').next().unwrap_or(&model).to_lowercase();

    if name.contains("gpt-4o-mini") || name.contains("4.1-mini") {
        ModelPricing::new(0.15, 0.60)
    } else if name.contains("gpt-4o") || name.contains("gpt-4") {
        ModelPricing::new(2.50, 10.0)
    } else if name.starts_with("gpt-5-nano") {
        ModelPricing::new(0.05, 0.40)
    } else if name.starts_with("gpt-5-mini") || name.starts_with("o4-mini") {
        ModelPricing::new(0.25, 2.0)
    } else if name.starts_with("gpt-5") {
        ModelPricing::new(1.25, 10.0)
    } else if name.starts_with("o1") || name.starts_with("o3") {
        ModelPricing::new(15.0, 60.0)
    } else if name.contains("sonnet") {
        ModelPricing::new(3.0, 15.0)
    } else if name.contains("haiku") {
        ModelPricing::new(0.25, 1.25)
    } else if name.contains("gemini") && name.contains("flash") {
        ModelPricing::new(0.075, 0.30)
    } else if name.contains("gemma") || name.contains("llama") || name.contains("qwen") {
        ModelPricing::new(0.0, 0.0)
    } else {
        ModelPricing::new(3.0, 15.0)
    }
}

/// Cumulative token usage across the requests of one run (or many).
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct Usage {
    pub requests: u32,
    pub input_tokens: u64,
    pub output_tokens: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reasoning_tokens: Option<u64>,
}

impl Usage {
    /// Count one request. Missing usage data still counts the request.
    pub fn record(&mut self, info: Option<&UsageInfo>) {
        self.requests += 1;
        let Some(info) = info else {
            return;
        };
        self.input_tokens += u64::from(info.prompt_tokens.unwrap_or(0));
        self.output_tokens += u64::from(info.completion_tokens.unwrap_or(0));
        if let Some(reasoning) = info
            .completion_tokens_details
            .as_ref()
            .and_then(|d| d.reasoning_tokens)
        {
            *self.reasoning_tokens.get_or_insert(0) += u64::from(reasoning);
        }
    }

    pub fn merge(&mut self, other: &Usage) {
        self.requests += other.requests;
        self.input_tokens += other.input_tokens;
        self.output_tokens += other.output_tokens;
        if let Some(r) = other.reasoning_tokens {
            *self.reasoning_tokens.get_or_insert(0) += r;
        }
    }

    pub fn total_tokens(&self) -> u64 {
        self.input_tokens + self.output_tokens
    }

    pub fn estimated_cost(&self, model: &str) -> f64 {
        pricing_for_model(model).estimate_cost(self.input_tokens, self.output_tokens)
    }

    /// One-line summary for logs and console output.
    pub fn summary(&self, model: &str) -> String {
        let mut s = format!(
            "{} request(s), {} input + {} output = {} tokens",
            self.requests,
            self.input_tokens,
            self.output_tokens,
            self.total_tokens()
        );
        if let Some(r) = self.reasoning_tokens {
            s.push_str(&format!(" ({r} reasoning)"));
        }
        s.push_str(&format!(", ~${:.4}", self.estimated_cost(model)));
        s
    }
}
