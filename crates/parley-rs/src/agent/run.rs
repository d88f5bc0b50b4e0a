//! The [`Agent`] request / tool-call loop.

use super::config::AgentConfig;
use super::execution::execute_tool_calls;
use super::wire::{response_message, to_api_messages};
use crate::api::{Usage, generate_run_id, retry_call};
use crate::history::{HistoryProcessor, MessagePart, ModelMessage, validate_for_inference};
use crate::schema::OutputSchema;
use crate::tools::ToolSet;
use crate::{
    ChatBackend, ChatCompletion, ChatRequest, Error, ReasoningConfig, ResponseFormat,
};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use schemars::JsonSchema;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::borrow::Cow;
use tracing::{debug, info};

// ── Prompt ─────────────────────────────────────────────────────────

/// User input for one run: text plus optional attachments.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Prompt {
    text: String,
    attachments: Vec<(String, String)>,
}

impl Prompt {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            attachments: Vec::new(),
        }
    }

    /// Attach raw bytes (e.g. a JPEG page), base64-encoding them.
    pub fn with_image(self, media_type: impl Into<String>, bytes: &[u8]) -> Self {
        self.with_attachment(media_type, STANDARD.encode(bytes))
    }

    /// Attach data that is already base64-encoded.
    pub fn with_attachment(mut self, media_type: impl Into<String>, base64: String) -> Self {
        self.attachments.push((media_type.into(), base64));
        self
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    fn into_parts(self) -> Vec<MessagePart> {
        let mut parts = Vec::with_capacity(1 + self.attachments.len());
        if !self.text.is_empty() {
            parts.push(MessagePart::UserPrompt { content: self.text });
        }
        parts.extend(
            self.attachments
                .into_iter()
                .map(|(media_type, data)| MessagePart::Binary { media_type, data }),
        );
        parts
    }
}

impl From<&str> for Prompt {
    fn from(text: &str) -> Self {
        Prompt::new(text)
    }
}

impl From<String> for Prompt {
    fn from(text: String) -> Self {
        Prompt::new(text)
    }
}

impl From<&String> for Prompt {
    fn from(text: &String) -> Self {
        Prompt::new(text.as_str())
    }
}

// ── RunResult ──────────────────────────────────────────────────────

/// Outcome of one [`Agent`] run.
#[derive(Debug, Clone)]
pub struct RunResult<T> {
    pub output: T,
    /// Token usage across every request of this run.
    pub usage: Usage,
    pub run_id: String,
    messages: Vec<ModelMessage>,
    new_message_index: usize,
}

impl<T> RunResult<T> {
    /// The full conversation: history passed in plus everything this run
    /// added. Pass it as the history of the next run to continue.
    pub fn all_messages(&self) -> &[ModelMessage] {
        &self.messages
    }

    /// Only the messages this run added.
    pub fn new_messages(&self) -> &[ModelMessage] {
        &self.messages[self.new_message_index..]
    }

    pub fn new_message_index(&self) -> usize {
        self.new_message_index
    }

    pub fn into_messages(self) -> Vec<ModelMessage> {
        self.messages
    }

    pub fn all_messages_json(&self) -> Result<String, Error> {
        crate::history::to_json(&self.messages)
    }

    fn with_output<U>(self, output: U) -> RunResult<U> {
        RunResult {
            output,
            usage: self.usage,
            run_id: self.run_id,
            messages: self.messages,
            new_message_index: self.new_message_index,
        }
    }
}

// ── Agent ──────────────────────────────────────────────────────────

/// A model, a configuration, optional tools and history processors.
///
/// An agent holds no conversation state. Each run takes the history to
/// continue from and returns the extended history in its [`RunResult`].
pub struct Agent<'a> {
    backend: &'a dyn ChatBackend,
    config: AgentConfig,
    tools: Option<&'a ToolSet>,
    processors: Vec<Box<dyn HistoryProcessor + 'a>>,
}

impl std::fmt::Debug for Agent<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Agent")
            .field("config", &self.config)
            .field("tools", &self.tools.map(ToolSet::names))
            .field("processors", &self.processors.len())
            .finish()
    }
}

impl<'a> Agent<'a> {
    pub fn new(backend: &'a dyn ChatBackend, config: AgentConfig) -> Self {
        Self {
            backend,
            config,
            tools: None,
            processors: Vec::new(),
        }
    }

    pub fn with_tools(mut self, tools: &'a ToolSet) -> Self {
        self.tools = Some(tools);
        self
    }

    /// Append a processor. Processors run in registration order on the full
    /// log before every request, including tool rounds.
    pub fn with_history_processor(mut self, processor: impl HistoryProcessor + 'a) -> Self {
        self.processors.push(Box::new(processor));
        self
    }

    pub fn config(&self) -> &AgentConfig {
        &self.config
    }

    /// Run to a plain-text answer.
    pub async fn run(
        &self,
        prompt: impl Into<Prompt>,
        history: &[ModelMessage],
    ) -> Result<RunResult<String>, Error> {
        let result = self.run_loop(prompt.into(), history, None).await?;
        let text = result
            .messages
            .last()
            .map(ModelMessage::text)
            .unwrap_or_default();
        Ok(result.with_output(text))
    }

    /// Run to an answer validated against `schema`.
    pub async fn run_with_schema(
        &self,
        prompt: impl Into<Prompt>,
        history: &[ModelMessage],
        schema: &OutputSchema,
    ) -> Result<RunResult<Value>, Error> {
        let result = self.run_loop(prompt.into(), history, Some(schema)).await?;
        let text = result
            .messages
            .last()
            .map(ModelMessage::text)
            .unwrap_or_default();
        let value = schema.parse_value(&text)?;
        Ok(result.with_output(value))
    }

    /// Run to an answer of type `T`, using `T`'s JSON Schema.
    pub async fn run_output<T>(
        &self,
        prompt: impl Into<Prompt>,
        history: &[ModelMessage],
    ) -> Result<RunResult<T>, Error>
    where
        T: DeserializeOwned + JsonSchema,
    {
        let schema = OutputSchema::of::<T>();
        let result = self.run_with_schema(prompt, history, &schema).await?;
        let output: T = schema.deserialize(&result.output)?;
        Ok(result.with_output(output))
    }

    async fn run_loop(
        &self,
        prompt: Prompt,
        history: &[ModelMessage],
        schema: Option<&OutputSchema>,
    ) -> Result<RunResult<()>, Error> {
        let run_id = generate_run_id();
        let mut messages = history.to_vec();
        let new_message_index = messages.len();

        let mut parts = Vec::new();
        if messages.is_empty()
            && let Some(system) = &self.config.system_prompt
        {
            parts.push(MessagePart::SystemPrompt {
                content: system.clone(),
            });
        }
        parts.extend(prompt.into_parts());
        messages.push(ModelMessage::request(parts));

        info!(
            "[{run_id}] Run started: model={}, history={} message(s), tools={}",
            self.config.model,
            new_message_index,
            self.tools.map_or(0, ToolSet::len),
        );

        let mut usage = Usage::default();
        let mut rounds = 0;
        loop {
            let window = self.window(&messages);
            validate_for_inference(&window)?;
            debug!(
                "[{run_id}] Round {rounds}: sending {} of {} message(s)",
                window.len(),
                messages.len()
            );

            let body = self.request_body(&window, schema);
            let completion = retry_call(&self.config.retry, || self.call_once(&body)).await?;
            usage.record(completion.usage.as_ref());

            let response = response_message(&completion, &self.config.model);
            let wants_tools = response.has_tool_calls();
            messages.push(response);
            if !wants_tools {
                break;
            }
            if rounds >= self.config.max_tool_rounds {
                return Err(Error::ToolRounds {
                    limit: self.config.max_tool_rounds,
                });
            }
            rounds += 1;

            let Some(last) = messages.last() else {
                break;
            };
            let returns = execute_tool_calls(self.tools, last).await;
            messages.push(returns);
        }

        info!(
            "[{run_id}] Run finished: {}",
            usage.summary(&self.config.model)
        );
        Ok(RunResult {
            output: (),
            usage,
            run_id,
            messages,
            new_message_index,
        })
    }

    /// Apply every processor in order.
    fn window<'m>(&self, messages: &'m [ModelMessage]) -> Cow<'m, [ModelMessage]> {
        let mut window = Cow::Borrowed(messages);
        for processor in &self.processors {
            window = Cow::Owned(processor.process(&window));
        }
        window
    }

    fn request_body(&self, window: &[ModelMessage], schema: Option<&OutputSchema>) -> ChatRequest {
        let config = &self.config;
        let response_format = match schema {
            Some(schema) => Some(schema.response_format()),
            None if config.json_mode => Some(ResponseFormat::json_object()),
            None => None,
        };
        let tools = self
            .tools
            .filter(|t| !t.is_empty())
            .map(ToolSet::definitions);
        let (reasoning, reasoning_effort) = match config.reasoning_effort {
            Some(effort) if self.backend.provider().nests_reasoning() => (
                Some(ReasoningConfig {
                    effort: Some(effort),
                    exclude: None,
                }),
                None,
            ),
            effort => (None, effort),
        };

        ChatRequest {
            model: config.model.clone(),
            messages: to_api_messages(window),
            max_tokens: config.max_tokens,
            temperature: config.temperature,
            top_p: config.top_p,
            seed: config.seed,
            stop: config.stop.clone(),
            response_format,
            tools,
            reasoning,
            reasoning_effort,
        }
    }

    async fn call_once(&self, body: &ChatRequest) -> Result<ChatCompletion, Error> {
        match self.config.request_timeout {
            Some(limit) => tokio::time::timeout(limit, self.backend.chat(body))
                .await
                .map_err(|_| Error::Timeout(limit))?,
            None => self.backend.chat(body).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::history::{HistoryError, KeepLastN, RoleFilter};
    use crate::testing::ScriptedBackend;
    use crate::tools::FnTool;
    use crate::{
        MessageContent, MessageRole, Provider, ReasoningEffort, ToolCall, ToolDef, UsageInfo,
        json_schema_for,
    };
    use serde::Deserialize;

    #[derive(Deserialize, JsonSchema, Debug, PartialEq)]
    struct Solution {
        answer: String,
    }

    #[derive(Deserialize, JsonSchema)]
    struct NoArgs {}

    fn dice() -> ToolSet {
        ToolSet::new().with(FnTool::new(
            ToolDef::new("roll_dice", "Roll a six-sided die", json_schema_for::<NoArgs>()),
            |_: NoArgs| async { "4".to_string() },
        ))
    }

    #[tokio::test]
    async fn first_run_carries_system_prompt() {
        let backend = ScriptedBackend::new().reply("Hello!");
        let agent = Agent::new(
            &backend,
            AgentConfig::new("gpt-4o-mini").with_system_prompt("Be kind."),
        );
        let result = agent.run("Hi", &[]).await.unwrap();

        assert_eq!(result.output, "Hello!");
        assert_eq!(result.all_messages().len(), 2);
        assert_eq!(result.new_message_index(), 0);
        let sent = backend.requests();
        assert_eq!(sent[0].messages[0].role, MessageRole::System);
        assert_eq!(sent[0].messages[1].text(), Some("Hi"));
    }

    #[tokio::test]
    async fn continuation_skips_system_prompt_and_extends_history() {
        let backend = ScriptedBackend::new().reply("One.").reply("Two.");
        let agent = Agent::new(
            &backend,
            AgentConfig::new("m").with_system_prompt("Count."),
        );
        let first = agent.run("Start", &[]).await.unwrap();
        let second = agent.run("Next", first.all_messages()).await.unwrap();

        assert_eq!(second.all_messages().len(), 4);
        assert_eq!(second.new_message_index(), 2);
        assert_eq!(second.new_messages().len(), 2);
        let sent = backend.requests();
        let system_count = sent[1]
            .messages
            .iter()
            .filter(|m| m.role == MessageRole::System)
            .count();
        assert_eq!(system_count, 1);
        assert_eq!(sent[1].messages.len(), 4);
    }

    #[tokio::test]
    async fn tool_round_executes_and_pairs() {
        let backend = ScriptedBackend::new()
            .tool_calls(vec![ToolCall::new("call_1", "roll_dice", "{}")])
            .reply("You rolled a 4.");
        let tools = dice();
        let agent = Agent::new(&backend, AgentConfig::new("m")).with_tools(&tools);
        let result = agent.run("Roll a die", &[]).await.unwrap();

        assert_eq!(result.output, "You rolled a 4.");
        let log = result.all_messages();
        assert_eq!(log.len(), 4);
        assert!(log[1].calls_tool("call_1"));
        assert_eq!(log[2].tool_return_ids().collect::<Vec<_>>(), vec!["call_1"]);
        assert!(validate_for_inference(&log[..3]).is_ok());

        let sent = backend.requests();
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[0].tools.as_ref().unwrap()[0].function.name, "roll_dice");
        assert_eq!(sent[1].messages[2].role, MessageRole::Tool);
        assert_eq!(
            sent[1].messages[2].content,
            Some(MessageContent::Text("4".into()))
        );
        assert_eq!(result.usage.requests, 2);
    }

    #[tokio::test]
    async fn endless_tool_calls_hit_round_limit() {
        let call = || vec![ToolCall::new("c", "roll_dice", "{}")];
        let backend = ScriptedBackend::new()
            .tool_calls(call())
            .tool_calls(call())
            .tool_calls(call());
        let tools = dice();
        let agent =
            Agent::new(&backend, AgentConfig::new("m").with_max_tool_rounds(2)).with_tools(&tools);
        let err = agent.run("Roll forever", &[]).await.unwrap_err();
        assert!(matches!(err, Error::ToolRounds { limit: 2 }));
    }

    #[tokio::test]
    async fn structured_output_is_validated() {
        let backend = ScriptedBackend::new().reply(r#"{"answer": "23 chickens, 12 rabbits"}"#);
        let agent = Agent::new(&backend, AgentConfig::new("m"));
        let result = agent.run_output::<Solution>("Solve", &[]).await.unwrap();
        assert_eq!(result.output.answer, "23 chickens, 12 rabbits");

        let sent = backend.requests();
        let format = sent[0].response_format.as_ref().unwrap();
        assert_eq!(format.json_schema.as_ref().unwrap().name, "Solution");
    }

    #[tokio::test]
    async fn schema_mismatch_is_reported_not_coerced() {
        let backend = ScriptedBackend::new().reply(r#"{"answer": 42}"#);
        let agent = Agent::new(&backend, AgentConfig::new("m"));
        let err = agent
            .run_output::<Solution>("Solve", &[])
            .await
            .unwrap_err();
        let Error::Schema(schema_err) = err else {
            panic!("expected schema error, got {err:?}");
        };
        assert_eq!(schema_err.at("/answer").unwrap().received, serde_json::json!(42));
    }

    #[tokio::test]
    async fn out_of_range_integer_is_a_validation_error() {
        #[derive(Deserialize, JsonSchema, Debug)]
        struct Rating {
            stars: u8,
        }

        let backend = ScriptedBackend::new().reply(r#"{"stars": 300}"#);
        let agent = Agent::new(&backend, AgentConfig::new("m"));
        let err = agent.run_output::<Rating>("Rate", &[]).await.unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::Validation);
        let Error::Schema(schema_err) = err else {
            panic!("expected schema error, got {err:?}");
        };
        let v = schema_err.at("/stars").unwrap();
        assert_eq!(v.keyword, "deserialize");
        assert_eq!(v.received, serde_json::json!(300));
    }

    #[tokio::test]
    async fn processors_shape_the_window() {
        let backend = ScriptedBackend::new().reply("ok");
        let agent = Agent::new(&backend, AgentConfig::new("m"))
            .with_history_processor(RoleFilter::requests_only())
            .with_history_processor(KeepLastN(2));
        let history = vec![
            ModelMessage::user("a"),
            ModelMessage::assistant("b"),
            ModelMessage::user("c"),
            ModelMessage::assistant("d"),
        ];
        let result = agent.run("e", &history).await.unwrap();
        // The full log is kept even though only a window was sent.
        assert_eq!(result.all_messages().len(), 6);
        let sent: Vec<_> = backend.requests()[0]
            .messages
            .iter()
            .map(|m| m.text().unwrap_or_default().to_string())
            .collect();
        assert_eq!(sent, vec!["c", "e"]);
    }

    #[tokio::test]
    async fn invalid_window_is_rejected_before_sending() {
        let backend = ScriptedBackend::new().reply("unused");
        let agent = Agent::new(&backend, AgentConfig::new("m"))
            .with_history_processor(RoleFilter::responses_only());
        let history = vec![ModelMessage::user("a"), ModelMessage::assistant("b")];
        let err = agent.run("c", &history).await.unwrap_err();
        assert!(matches!(
            err,
            Error::History(HistoryError::EndsWithResponse { .. })
        ));
        assert!(backend.requests().is_empty());
    }

    #[tokio::test]
    async fn reasoning_effort_follows_provider() {
        let nested = ScriptedBackend::new().reply("a");
        let agent = Agent::new(
            &nested,
            AgentConfig::new("m").with_reasoning_effort(ReasoningEffort::High),
        );
        agent.run("q", &[]).await.unwrap();
        let body = serde_json::to_value(&nested.requests()[0]).unwrap();
        assert_eq!(body["reasoning"]["effort"], "high");
        assert!(body.get("reasoning_effort").is_none());

        let flat = ScriptedBackend::new()
            .with_provider(Provider::OpenAi)
            .reply("a");
        let agent = Agent::new(
            &flat,
            AgentConfig::new("m").with_reasoning_effort(ReasoningEffort::Low),
        );
        agent.run("q", &[]).await.unwrap();
        let body = serde_json::to_value(&flat.requests()[0]).unwrap();
        assert_eq!(body["reasoning_effort"], "low");
        assert!(body.get("reasoning").is_none());
    }

    #[tokio::test]
    async fn usage_and_model_name_are_recorded() {
        let backend = ScriptedBackend::new().push(ChatCompletion {
            model: Some("gpt-4o-mini-2024-07-18".into()),
            content: Some("hi".into()),
            usage: Some(UsageInfo {
                prompt_tokens: Some(12),
                completion_tokens: Some(3),
                total_tokens: Some(15),
                completion_tokens_details: None,
            }),
            ..Default::default()
        });
        let agent = Agent::new(&backend, AgentConfig::new("gpt-4o-mini"));
        let result = agent.run("hello", &[]).await.unwrap();
        assert_eq!(result.usage.total_tokens(), 15);
        assert_eq!(
            result.all_messages()[1].model_name(),
            Some("gpt-4o-mini-2024-07-18")
        );
    }

    #[tokio::test]
    async fn image_prompt_becomes_binary_part() {
        let backend = ScriptedBackend::new().reply("A page of text.");
        let agent = Agent::new(&backend, AgentConfig::new("m"));
        let prompt = Prompt::new("Describe").with_image("image/jpeg", b"ABC");
        let result = agent.run(prompt, &[]).await.unwrap();
        assert!(matches!(
            &result.all_messages()[0].parts()[1],
            MessagePart::Binary { data, .. } if data == "QUJD"
        ));
    }
}
