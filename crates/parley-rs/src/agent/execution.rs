//! Tool dispatch for one round of model tool calls.

use crate::history::{MessagePart, ModelMessage};
use crate::tools::ToolSet;
use tracing::warn;

/// Run every tool call in `response` and collect the results into a single
/// request message, one `ToolReturn` per call in call order.
///
/// Calls within a round are independent and run concurrently. Without a
/// tool set each call gets an error result, so the log stays paired.
pub(crate) async fn execute_tool_calls(
    tools: Option<&ToolSet>,
    response: &ModelMessage,
) -> ModelMessage {
    let calls: Vec<(&str, &str, String)> = response
        .parts()
        .iter()
        .filter_map(|p| match p {
            MessagePart::ToolCall {
                tool_name,
                args,
                tool_call_id,
            } => Some((tool_call_id.as_str(), tool_name.as_str(), args_text(args))),
            _ => None,
        })
        .collect();

    let results: Vec<String> = match tools {
        Some(tools) if calls.len() > 1 => {
            let futures = calls
                .iter()
                .map(|(_, name, args)| tools.execute(name, args));
            futures::future::join_all(futures).await
        }
        Some(tools) => {
            let mut results = Vec::with_capacity(calls.len());
            for (_, name, args) in &calls {
                results.push(tools.execute(name, args).await);
            }
            results
        }
        None => {
            warn!(
                "Model requested {} tool call(s) but no tools are registered",
                calls.len()
            );
            calls
                .iter()
                .map(|(_, name, _)| format!("Error: unknown tool '{name}'"))
                .collect()
        }
    };

    let parts = calls
        .into_iter()
        .zip(results)
        .map(|((id, name, _), content)| MessagePart::ToolReturn {
            tool_name: name.to_string(),
            content,
            tool_call_id: id.to_string(),
        })
        .collect();
    ModelMessage::request(parts)
}

/// Arguments as the JSON text a tool expects. A bare JSON string that is not
/// itself JSON (kept from a malformed call) is passed through unchanged.
fn args_text(args: &serde_json::Value) -> String {
    match args {
        serde_json::Value::String(raw) => raw.clone(),
        other => other.to_string(),
    }
}
