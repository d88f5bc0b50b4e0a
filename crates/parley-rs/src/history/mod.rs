//! Conversation history: message model, window policies, token accounting
//! and persistence.
//!
//! The full log of a conversation only grows. Before each model call an
//! [`Agent`](crate::agent::Agent) passes it through its
//! [`HistoryProcessor`]s, in order, to pick the window it actually sends,
//! then checks that window with [`validate_for_inference`].
//!
//! ```ignore
//! let counter = Arc::new(TokenCounter::new());
//! let agent = Agent::new(&client, config)
//!     .with_history_processor(KeepLastToolSafe(4))
//!     .with_history_processor(ContextGuard::new(counter.clone(), 1_000));
//! ```

pub mod archive;
pub mod log;
pub mod message;
pub mod tokens;
pub mod window;

pub use archive::{ConversationArchive, ConversationRecord};
pub use log::{from_json, load_log, save_log, to_json};
pub use message::{MessageKind, MessagePart, ModelMessage};
pub use tokens::{
    CharRatioEstimator, DEFAULT_CHARS_PER_TOKEN, TokenCounter, TokenEstimator, estimate_messages,
};
pub use window::{
    HistoryError, filter_by_role, keep_last_n, keep_last_n_tool_safe, token_budget_guard,
    validate_for_inference,
};

use std::sync::Arc;

/// Selects the window of a log to send on the next call.
///
/// Implementations must not depend on anything but the input and their own
/// configuration; the agent may call them once per tool round.
pub trait HistoryProcessor: Send + Sync {
    fn process(&self, messages: &[ModelMessage]) -> Vec<ModelMessage>;
}

/// A closure as a processor.
///
/// ```ignore
/// let skip_first = FnProcessor(|m: &[ModelMessage]| m[1..].to_vec());
/// ```
pub struct FnProcessor<F>(pub F);

impl<F> HistoryProcessor for FnProcessor<F>
where
    F: Fn(&[ModelMessage]) -> Vec<ModelMessage> + Send + Sync,
{
    fn process(&self, messages: &[ModelMessage]) -> Vec<ModelMessage> {
        (self.0)(messages)
    }
}

impl<P: HistoryProcessor + ?Sized> HistoryProcessor for Box<P> {
    fn process(&self, messages: &[ModelMessage]) -> Vec<ModelMessage> {
        (**self).process(messages)
    }
}

/// [`keep_last_n`] as a processor.
#[derive(Debug, Clone, Copy)]
pub struct KeepLastN(pub usize);

impl HistoryProcessor for KeepLastN {
    fn process(&self, messages: &[ModelMessage]) -> Vec<ModelMessage> {
        keep_last_n(messages, self.0).to_vec()
    }
}

/// [`keep_last_n_tool_safe`] as a processor.
#[derive(Debug, Clone, Copy)]
pub struct KeepLastToolSafe(pub usize);

impl HistoryProcessor for KeepLastToolSafe {
    fn process(&self, messages: &[ModelMessage]) -> Vec<ModelMessage> {
        keep_last_n_tool_safe(messages, self.0).to_vec()
    }
}

/// [`filter_by_role`] keeping a single kind.
#[derive(Debug, Clone, Copy)]
pub struct RoleFilter {
    keep: MessageKind,
}

impl RoleFilter {
    pub fn requests_only() -> Self {
        Self {
            keep: MessageKind::Request,
        }
    }

    pub fn responses_only() -> Self {
        Self {
            keep: MessageKind::Response,
        }
    }
}

impl HistoryProcessor for RoleFilter {
    fn process(&self, messages: &[ModelMessage]) -> Vec<ModelMessage> {
        filter_by_role(messages, |kind| kind == self.keep)
    }
}

/// [`token_budget_guard`] reading its estimate from a shared counter.
#[derive(Debug, Clone)]
pub struct ContextGuard {
    counter: Arc<TokenCounter>,
    threshold: u64,
}

impl ContextGuard {
    pub fn new(counter: Arc<TokenCounter>, threshold: u64) -> Self {
        Self { counter, threshold }
    }

    pub fn threshold(&self) -> u64 {
        self.threshold
    }
}

impl HistoryProcessor for ContextGuard {
    fn process(&self, messages: &[ModelMessage]) -> Vec<ModelMessage> {
        token_budget_guard(messages, self.counter.get(), self.threshold).to_vec()
    }
}
