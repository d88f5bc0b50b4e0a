//! Convenience re-exports for common `parley-rs` types.
//!
//! ```ignore
//! use parley_rs::prelude::*;
//! ```
//!
//! Covers the client, the agent, history processors, fan-out, schemas,
//! tools and sinks. Wire-level types (`ContentPart`, raw tool calls) are
//! left out; import those from the crate root when needed.

// ── Core types ──────────────────────────────────────────────────────
pub use crate::{
    ChatBackend, ChatClient, ClientConfig, DEFAULT_MODEL, Error, ErrorKind, ModelRef, Provider,
    ReasoningEffort, Settings, ToolDef, json_schema_for,
};

// ── Agent ───────────────────────────────────────────────────────────
pub use crate::agent::{Agent, AgentConfig, Prompt, RunResult};
pub use crate::api::{RetryConfig, Usage};

// ── History ─────────────────────────────────────────────────────────
pub use crate::history::{
    CharRatioEstimator, ContextGuard, ConversationArchive, FnProcessor, HistoryError,
    HistoryProcessor, KeepLastN, KeepLastToolSafe, MessageKind, MessagePart, ModelMessage,
    RoleFilter, TokenCounter, TokenEstimator, filter_by_role, keep_last_n, keep_last_n_tool_safe,
    load_log, save_log, token_budget_guard, validate_for_inference,
};

// ── Fan-out, schemas, sinks ─────────────────────────────────────────
pub use crate::fanout::{FanOut, StopSignal};
pub use crate::schema::{Classification, LabelSet, OutputSchema, SchemaError, SchemaViolation};
pub use crate::sink::{ConsoleSink, JsonSink};

// ── Tools ───────────────────────────────────────────────────────────
pub use crate::tools::{FnTool, Tool, ToolFuture, ToolSet, parse_tool_args};
