//! The conversation message model.
//!
//! A [`ModelMessage`] is one turn: either a request (user-originated: system
//! and user prompts, attachments, tool results) or a response
//! (model-originated: text and tool calls). Messages are immutable once
//! built; a conversation is an append-only `Vec<ModelMessage>`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Who produced a message.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    Request,
    Response,
}

impl std::fmt::Display for MessageKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MessageKind::Request => write!(f, "request"),
            MessageKind::Response => write!(f, "response"),
        }
    }
}

/// One typed part of a message.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(tag = "part_kind", rename_all = "kebab-case")]
pub enum MessagePart {
    SystemPrompt {
        content: String,
    },
    UserPrompt {
        content: String,
    },
    /// Base64-encoded attachment, e.g. a page image.
    Binary {
        media_type: String,
        data: String,
    },
    Text {
        content: String,
    },
    ToolCall {
        tool_name: String,
        args: Value,
        tool_call_id: String,
    },
    ToolReturn {
        tool_name: String,
        content: String,
        tool_call_id: String,
    },
}

impl MessagePart {
    /// Text this part contributes to a token estimate. Attachments count as
    /// nothing; tool arguments count as their JSON text.
    pub fn text_content(&self) -> String {
        match self {
            MessagePart::SystemPrompt { content }
            | MessagePart::UserPrompt { content }
            | MessagePart::Text { content }
            | MessagePart::ToolReturn { content, .. } => content.clone(),
            MessagePart::ToolCall { args, .. } => args.to_string(),
            MessagePart::Binary { .. } => String::new(),
        }
    }

    /// Short label used in listings (`user-prompt`, `tool-call`, ...).
    pub fn label(&self) -> &'static str {
        match self {
            MessagePart::SystemPrompt { .. } => "system-prompt",
            MessagePart::UserPrompt { .. } => "user-prompt",
            MessagePart::Binary { .. } => "binary",
            MessagePart::Text { .. } => "text",
            MessagePart::ToolCall { .. } => "tool-call",
            MessagePart::ToolReturn { .. } => "tool-return",
        }
    }
}

/// One turn of a conversation.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct ModelMessage {
    kind: MessageKind,
    parts: Vec<MessagePart>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    model_name: Option<String>,
    timestamp: DateTime<Utc>,
}

impl ModelMessage {
    pub fn request(parts: Vec<MessagePart>) -> Self {
        Self {
            kind: MessageKind::Request,
            parts,
            model_name: None,
            timestamp: Utc::now(),
        }
    }

    pub fn response(parts: Vec<MessagePart>) -> Self {
        Self {
            kind: MessageKind::Response,
            parts,
            model_name: None,
            timestamp: Utc::now(),
        }
    }

    /// A request holding a single user prompt.
    pub fn user(text: impl Into<String>) -> Self {
        Self::request(vec![MessagePart::UserPrompt {
            content: text.into(),
        }])
    }

    /// A response holding a single text part.
    pub fn assistant(text: impl Into<String>) -> Self {
        Self::response(vec![MessagePart::Text {
            content: text.into(),
        }])
    }

    pub fn with_model_name(mut self, name: impl Into<String>) -> Self {
        self.model_name = Some(name.into());
        self
    }

    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }

    pub fn kind(&self) -> MessageKind {
        self.kind
    }

    pub fn is_request(&self) -> bool {
        self.kind == MessageKind::Request
    }

    pub fn is_response(&self) -> bool {
        self.kind == MessageKind::Response
    }

    pub fn parts(&self) -> &[MessagePart] {
        &self.parts
    }

    pub fn model_name(&self) -> Option<&str> {
        self.model_name.as_deref()
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    /// User prompts of a request, or text parts of a response, joined by
    /// newlines.
    pub fn text(&self) -> String {
        self.parts
            .iter()
            .filter_map(|p| match p {
                MessagePart::UserPrompt { content } | MessagePart::Text { content } => {
                    Some(content.as_str())
                }
                _ => None,
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Ids of the tool calls this message makes.
    pub fn tool_call_ids(&self) -> impl Iterator<Item = &str> {
        self.parts.iter().filter_map(|p| match p {
            MessagePart::ToolCall { tool_call_id, .. } => Some(tool_call_id.as_str()),
            _ => None,
        })
    }

    /// Ids of the tool results this message carries.
    pub fn tool_return_ids(&self) -> impl Iterator<Item = &str> {
        self.parts.iter().filter_map(|p| match p {
            MessagePart::ToolReturn { tool_call_id, .. } => Some(tool_call_id.as_str()),
            _ => None,
        })
    }

    pub fn has_tool_calls(&self) -> bool {
        self.tool_call_ids().next().is_some()
    }

    pub fn has_tool_returns(&self) -> bool {
        self.tool_return_ids().next().is_some()
    }

    pub fn calls_tool(&self, tool_call_id: &str) -> bool {
        self.tool_call_ids().any(|id| id == tool_call_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parts_serialize_with_kind_tags() {
        let msg = ModelMessage::request(vec![
            MessagePart::SystemPrompt {
                content: "Be brief.".into(),
            },
            MessagePart::UserPrompt {
                content: "Hi".into(),
            },
        ]);
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["kind"], "request");
        assert_eq!(json["parts"][0]["part_kind"], "system-prompt");
        assert_eq!(json["parts"][1]["part_kind"], "user-prompt");
        assert!(json.get("model_name").is_none());
    }

    #[test]
    fn text_joins_prompt_and_text_parts() {
        let msg = ModelMessage::response(vec![
            MessagePart::Text {
                content: "one".into(),
            },
            MessagePart::ToolCall {
                tool_name: "roll_dice".into(),
                args: serde_json::json!({}),
                tool_call_id: "c1".into(),
            },
            MessagePart::Text {
                content: "two".into(),
            },
        ]);
        assert_eq!(msg.text(), "one\ntwo");
        assert!(msg.has_tool_calls());
        assert!(msg.calls_tool("c1"));
        assert!(!msg.has_tool_returns());
    }

    #[test]
    fn text_content_covers_every_part() {
        let call = MessagePart::ToolCall {
            tool_name: "check_weather".into(),
            args: serde_json::json!({"city": "Kraków"}),
            tool_call_id: "c1".into(),
        };
        assert!(call.text_content().contains("Kraków"));
        let image = MessagePart::Binary {
            media_type: "image/jpeg".into(),
            data: "AAAA".into(),
        };
        assert_eq!(image.text_content(), "");
        assert_eq!(image.label(), "binary");
    }
}
