//! Conversion between the conversation log and the wire message format.

use crate::history::{MessageKind, MessagePart, ModelMessage};
use crate::{ChatCompletion, ContentPart, ImageUrl, Message, ToolCall};
use serde_json::Value;

/// Render a log as `/chat/completions` messages.
///
/// Consecutive user prompts and attachments of one request become a single
/// user message (multipart when an attachment is present). System prompts
/// and tool results become their own messages, in place.
pub fn to_api_messages(log: &[ModelMessage]) -> Vec<Message> {
    let mut out = Vec::with_capacity(log.len());
    for message in log {
        match message.kind() {
            MessageKind::Request => push_request(&mut out, message.parts()),
            MessageKind::Response => out.push(response_to_api(message.parts())),
        }
    }
    out
}

fn push_request(out: &mut Vec<Message>, parts: &[MessagePart]) {
    let mut user: Vec<ContentPart> = Vec::new();
    for part in parts {
        match part {
            MessagePart::UserPrompt { content } => user.push(ContentPart::Text {
                text: content.clone(),
            }),
            MessagePart::Binary { media_type, data } => user.push(ContentPart::ImageUrl {
                image_url: ImageUrl {
                    url: format!("data:{media_type};base64,{data}"),
                },
            }),
            MessagePart::SystemPrompt { content } => {
                flush_user(out, &mut user);
                out.push(Message::system(content.clone()));
            }
            MessagePart::ToolReturn {
                content,
                tool_call_id,
                ..
            } => {
                flush_user(out, &mut user);
                out.push(Message::tool_result(tool_call_id.clone(), content.clone()));
            }
            // Model-side parts have no place in a request.
            MessagePart::Text { .. } | MessagePart::ToolCall { .. } => {}
        }
    }
    flush_user(out, &mut user);
}

fn flush_user(out: &mut Vec<Message>, user: &mut Vec<ContentPart>) {
    if user.is_empty() {
        return;
    }
    let parts = std::mem::take(user);
    let only_text = parts.iter().all(|p| matches!(p, ContentPart::Text { .. }));
    if only_text {
        let text = parts
            .into_iter()
            .filter_map(|p| match p {
                ContentPart::Text { text } => Some(text),
                ContentPart::ImageUrl { .. } => None,
            })
            .collect::<Vec<_>>()
            .join("\n");
        out.push(Message::user(text));
    } else {
        out.push(Message::user_parts(parts));
    }
}

fn response_to_api(parts: &[MessagePart]) -> Message {
    let mut texts = Vec::new();
    let mut calls = Vec::new();
    for part in parts {
        match part {
            MessagePart::Text { content } => texts.push(content.as_str()),
            MessagePart::ToolCall {
                tool_name,
                args,
                tool_call_id,
            } => calls.push(ToolCall::new(
                tool_call_id.clone(),
                tool_name.clone(),
                args.to_string(),
            )),
            _ => {}
        }
    }
    let content = if texts.is_empty() {
        None
    } else {
        Some(texts.join("\n"))
    };
    Message::assistant(content, calls)
}

/// Turn a completion into a response message for the log.
///
/// Tool arguments are stored as parsed JSON; arguments that are not valid
/// JSON are kept as a JSON string so nothing the model sent is lost.
pub fn response_message(completion: &ChatCompletion, requested_model: &str) -> ModelMessage {
    let mut parts = Vec::new();
    if let Some(text) = completion.content.as_deref()
        && !text.is_empty()
    {
        parts.push(MessagePart::Text {
            content: text.to_string(),
        });
    }
    for call in &completion.tool_calls {
        let raw = call.function.arguments.trim();
        let args = if raw.is_empty() {
            Value::Object(Default::default())
        } else {
            serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
        };
        parts.push(MessagePart::ToolCall {
            tool_name: call.function.name.clone(),
            args,
            tool_call_id: call.id.clone(),
        });
    }
    ModelMessage::response(parts)
        .with_model_name(completion.model.as_deref().unwrap_or(requested_model))
}
