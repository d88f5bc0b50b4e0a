//! The agent layer: one prompt in, a validated answer and an extended
//! conversation out.
//!
//! [`Agent::run`] appends the prompt to the given history, applies the
//! agent's [`HistoryProcessor`](crate::history::HistoryProcessor)s to pick
//! the window to send, validates it, calls the backend (with retry), and
//! repeats while the model asks for tools. The full history, never the
//! window, is what the [`RunResult`] carries forward.

pub mod config;
pub(crate) mod execution;
pub mod run;
pub mod wire;

pub use config::{AgentConfig, DEFAULT_MAX_TOOL_ROUNDS};
pub use run::{Agent, Prompt, RunResult};
pub use wire::{response_message, to_api_messages};
