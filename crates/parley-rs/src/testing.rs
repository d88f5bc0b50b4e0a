//! Scripted chat backend for tests.
//!
//! ```ignore
//! let backend = ScriptedBackend::new()
//!     .tool_calls(vec![ToolCall::new("call_1", "roll_dice", "{}")])
//!     .reply("You rolled a 4.");
//! let result = Agent::new(&backend, config).with_tools(&tools).run("Roll", &[]).await?;
//! assert_eq!(backend.requests().len(), 2);
//! ```

use crate::{
    ChatBackend, ChatCompletion, ChatFuture, ChatRequest, Error, Provider, ToolCall, UsageInfo,
};
use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Replays queued completions in order and records every request it sees.
/// Running out of script is an API error.
pub struct ScriptedBackend {
    script: Mutex<VecDeque<Result<ChatCompletion, Error>>>,
    requests: Mutex<Vec<ChatRequest>>,
    provider: Provider,
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

impl ScriptedBackend {
    pub fn new() -> Self {
        Self {
            script: Mutex::new(VecDeque::new()),
            requests: Mutex::new(Vec::new()),
            provider: Provider::OpenRouter,
        }
    }

    pub fn with_provider(mut self, provider: Provider) -> Self {
        self.provider = provider;
        self
    }

    pub fn push(self, completion: ChatCompletion) -> Self {
        self.push_result(Ok(completion))
    }

    pub fn push_result(self, result: Result<ChatCompletion, Error>) -> Self {
        lock(&self.script).push_back(result);
        self
    }

    /// A final text answer with no usage report.
    pub fn reply(self, text: &str) -> Self {
        self.push(ChatCompletion {
            content: Some(text.to_string()),
            finish_reason: Some("stop".into()),
            ..Default::default()
        })
    }

    /// A final text answer with a usage report.
    pub fn reply_with_usage(self, text: &str, prompt_tokens: u32, completion_tokens: u32) -> Self {
        self.push(ChatCompletion {
            content: Some(text.to_string()),
            finish_reason: Some("stop".into()),
            usage: Some(UsageInfo {
                prompt_tokens: Some(prompt_tokens),
                completion_tokens: Some(completion_tokens),
                total_tokens: Some(prompt_tokens + completion_tokens),
                completion_tokens_details: None,
            }),
            ..Default::default()
        })
    }

    pub fn tool_calls(self, calls: Vec<ToolCall>) -> Self {
        self.push(ChatCompletion {
            tool_calls: calls,
            finish_reason: Some("tool_calls".into()),
            ..Default::default()
        })
    }

    /// Every request received so far, in order.
    pub fn requests(&self) -> Vec<ChatRequest> {
        lock(&self.requests).clone()
    }
}

impl Default for ScriptedBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl ChatBackend for ScriptedBackend {
    fn chat<'a>(&'a self, body: &'a ChatRequest) -> ChatFuture<'a> {
        lock(&self.requests).push(body.clone());
        let next = lock(&self.script)
            .pop_front()
            .unwrap_or_else(|| Err(Error::Api("script exhausted".into())));
        Box::pin(async move { next })
    }

    fn provider(&self) -> Provider {
        self.provider
    }
}
