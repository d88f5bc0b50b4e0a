//! Function-calling tools.
//!
//! The [`Tool`] trait describes one function the model may call: a static
//! definition (name, description, JSON Schema parameters) and an async
//! `execute`. Tools are collected into a [`ToolSet`], which the
//! [`Agent`](crate::agent::Agent) uses to advertise definitions and dispatch
//! the model's calls.
//!
//! Tool failures never abort a run. They come back as `"Error: ..."` result
//! strings, which the model sees and can react to.

use crate::ToolDef;
use crate::schema::validate_value;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::time::{Duration, Instant};
use tracing::{debug, info, trace};

/// Maximum size (in bytes) for tool output before truncation.
pub const DEFAULT_MAX_RESULT_BYTES: usize = 30_000;

/// Default timeout for tool execution.
pub const DEFAULT_TOOL_TIMEOUT: Duration = Duration::from_secs(60);

/// Boxed future returned by [`Tool::execute`].
pub type ToolFuture<'a> = Pin<Box<dyn Future<Output = String> + Send + 'a>>;

// ── Tool trait ─────────────────────────────────────────────────────

/// A function the model can invoke.
///
/// # Example
///
/// ```ignore
/// struct Clock;
///
/// impl Tool for Clock {
///     fn definition(&self) -> ToolDef {
///         ToolDef::new("now", "Current UTC time", json!({"type": "object", "properties": {}}))
///     }
///
///     fn execute(&self, _arguments: &str) -> ToolFuture<'_> {
///         Box::pin(async { chrono::Utc::now().to_rfc3339() })
///     }
/// }
/// ```
pub trait Tool: Send + Sync {
    fn definition(&self) -> ToolDef;

    /// Run the tool on raw JSON arguments.
    ///
    /// Failures are returned as `"Error: ..."` strings rather than panics.
    /// Uses a boxed future so the trait stays dyn-compatible.
    fn execute(&self, arguments: &str) -> ToolFuture<'_>;

    fn name(&self) -> String {
        self.definition().function.name
    }
}

// ── ToolSet ────────────────────────────────────────────────────────

/// Tools dispatched by name.
///
/// ```ignore
/// let tools = ToolSet::new()
///     .with_arg_validation(true)
///     .with(roll_dice_tool())
///     .with(weather_tool(key));
/// ```
pub struct ToolSet {
    tools: HashMap<String, Box<dyn Tool>>,
    validate_args: bool,
    /// `None` disables timeouts.
    default_timeout: Option<Duration>,
}

impl fmt::Debug for ToolSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ToolSet")
            .field("tools", &self.names())
            .field("validate_args", &self.validate_args)
            .finish()
    }
}

impl ToolSet {
    pub fn new() -> Self {
        Self {
            tools: HashMap::new(),
            validate_args: false,
            default_timeout: Some(DEFAULT_TOOL_TIMEOUT),
        }
    }

    /// Validate arguments against each tool's JSON Schema before executing.
    pub fn with_arg_validation(mut self, enabled: bool) -> Self {
        self.validate_args = enabled;
        self
    }

    pub fn with_default_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.default_timeout = timeout;
        self
    }

    /// Register a tool, replacing any existing tool with the same name.
    pub fn register(&mut self, tool: impl Tool + 'static) {
        self.tools.insert(tool.name(), Box::new(tool));
    }

    pub fn with(mut self, tool: impl Tool + 'static) -> Self {
        self.register(tool);
        self
    }

    /// Definitions for the request body, sorted by name so requests are
    /// reproducible.
    pub fn definitions(&self) -> Vec<ToolDef> {
        let mut defs: Vec<ToolDef> = self.tools.values().map(|t| t.definition()).collect();
        defs.sort_by(|a, b| a.function.name.cmp(&b.function.name));
        defs
    }

    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.tools.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Execute a call by name with optional validation, a timeout and
    /// truncation. Unknown tools, invalid arguments and timeouts all yield
    /// an `"Error: ..."` result.
    pub async fn execute(&self, name: &str, arguments: &str) -> String {
        let Some(tool) = self.tools.get(name) else {
            return format!("Error: unknown tool '{name}'");
        };

        if self.validate_args
            && let Some(error) = validate_tool_arguments(tool.as_ref(), arguments)
        {
            return error;
        }

        log_tool_call(name, arguments);
        let start = Instant::now();

        let result = match self.default_timeout {
            Some(limit) => match tokio::time::timeout(limit, tool.execute(arguments)).await {
                Ok(r) => r,
                Err(_) => {
                    info!("Tool {name} timed out after {:.0}s", limit.as_secs_f64());
                    format!(
                        "Error: tool '{name}' timed out after {:.0} seconds.",
                        limit.as_secs_f64()
                    )
                }
            },
            None => tool.execute(arguments).await,
        };

        debug!(
            "Tool {name} completed in {:.0}ms ({} bytes)",
            start.elapsed().as_secs_f64() * 1000.0,
            result.len()
        );
        trace!(
            "Tool {name} result preview: {}",
            result.chars().take(300).collect::<String>()
        );

        truncate_result(result, DEFAULT_MAX_RESULT_BYTES)
    }
}

impl Default for ToolSet {
    fn default() -> Self {
        Self::new()
    }
}

// ── FnTool ─────────────────────────────────────────────────────────

type ErasedToolHandler =
    Box<dyn Fn(String) -> Pin<Box<dyn Future<Output = String> + Send>> + Send + Sync>;

/// A closure-backed tool with typed arguments.
///
/// ```ignore
/// #[derive(Deserialize, JsonSchema)]
/// struct CityArgs {
///     /// City name, e.g. "Kraków".
///     city: String,
/// }
///
/// let tool = FnTool::fallible(
///     ToolDef::new("check_weather", "Current weather", json_schema_for::<CityArgs>()),
///     move |args: CityArgs| {
///         let client = client.clone();
///         async move { fetch_weather(&client, &args.city).await }
///     },
/// );
/// ```
pub struct FnTool {
    def: ToolDef,
    handler: ErasedToolHandler,
}

impl FnTool {
    /// A tool whose handler produces the result string directly.
    pub fn new<A, F, Fut>(def: ToolDef, handler: F) -> Self
    where
        A: DeserializeOwned + Send + 'static,
        F: Fn(A) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = String> + Send + 'static,
    {
        let erased = move |raw: String| -> Pin<Box<dyn Future<Output = String> + Send>> {
            match parse_tool_args::<A>(&raw) {
                Ok(args) => Box::pin(handler(args)),
                Err(e) => Box::pin(async move { e }),
            }
        };
        Self {
            def,
            handler: Box::new(erased),
        }
    }

    /// A tool whose handler returns a serializable value or an error.
    ///
    /// String values are passed through as-is, other values as JSON, and
    /// errors as `"Error: {e}"`.
    pub fn fallible<A, R, E, F, Fut>(def: ToolDef, handler: F) -> Self
    where
        A: DeserializeOwned + Send + 'static,
        R: Serialize + Send + 'static,
        E: fmt::Display + Send + 'static,
        F: Fn(A) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<R, E>> + Send + 'static,
    {
        Self::new(def, move |args: A| {
            let fut = handler(args);
            async move {
                match fut.await {
                    Ok(value) => render_value(&value),
                    Err(e) => format!("Error: {e}"),
                }
            }
        })
    }
}

impl Tool for FnTool {
    fn definition(&self) -> ToolDef {
        self.def.clone()
    }

    fn execute(&self, arguments: &str) -> ToolFuture<'_> {
        (self.handler)(arguments.to_string())
    }
}

impl fmt::Debug for FnTool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnTool")
            .field("name", &self.def.function.name)
            .finish()
    }
}

fn render_value<R: Serialize>(value: &R) -> String {
    match serde_json::to_value(value) {
        Ok(serde_json::Value::String(s)) => s,
        Ok(other) => other.to_string(),
        Err(e) => format!("Error: tool result is not serializable: {e}"),
    }
}

// ── Helpers ────────────────────────────────────────────────────────

/// Check raw arguments against the tool's parameter schema.
///
/// Returns `None` if valid, or an error string naming each offending field.
pub fn validate_tool_arguments(tool: &dyn Tool, arguments: &str) -> Option<String> {
    let args: serde_json::Value = match serde_json::from_str(arguments) {
        Ok(v) => v,
        Err(e) => {
            return Some(format!(
                "Error: invalid JSON arguments for tool '{}': {e}.",
                tool.name()
            ));
        }
    };

    let violations = validate_value(&tool.definition().function.parameters, &args).err()?;
    let lines: Vec<String> = violations.iter().map(|v| format!("  - {v}")).collect();
    Some(format!(
        "Error: argument validation failed for tool '{}':\n{}",
        tool.name(),
        lines.join("\n")
    ))
}

/// Parse raw arguments, formatting failures as a tool result.
pub fn parse_tool_args<T: DeserializeOwned>(arguments: &str) -> Result<T, String> {
    // Models send "" for tools without parameters.
    let arguments = if arguments.trim().is_empty() {
        "{}"
    } else {
        arguments
    };
    serde_json::from_str(arguments).map_err(|e| {
        format!(
            "Error: invalid tool arguments: {e}. \
             Please provide valid JSON matching the tool's parameter schema."
        )
    })
}

pub fn log_tool_call(name: &str, arguments: &str) {
    let preview: String = arguments.chars().take(120).collect();
    let ellipsis = if arguments.chars().count() > 120 {
        "..."
    } else {
        ""
    };
    info!("[tool] {name}({preview}{ellipsis})");
    trace!("[tool] {name} arguments: {arguments}");
}

/// Truncate to at most `max` bytes on a char boundary, appending a notice.
pub fn truncate_result(s: String, max: usize) -> String {
    if s.len() <= max {
        return s;
    }
    let mut end = max;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    format!(
        "{}...\n[truncated: {} bytes total]",
        s.get(..end).unwrap_or_default(),
        s.len()
    )
}
