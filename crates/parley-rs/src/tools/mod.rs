//! Tool registry for function calling. See [`core`] for the [`Tool`] trait,
//! [`ToolSet`], and the closure-backed [`FnTool`].

pub mod core;

pub use self::core::{
    DEFAULT_MAX_RESULT_BYTES, DEFAULT_TOOL_TIMEOUT, FnTool, Tool, ToolFuture, ToolSet,
    parse_tool_args, truncate_result, validate_tool_arguments,
};
