//! Integration tests for the agent, tools, history windows and persistence.
//!
//! A local backend replays canned completions, so no network is needed.

use parley_rs::prelude::*;
use parley_rs::testing::ScriptedBackend;
use parley_rs::{MessageRole, ToolCall};
use schemars::JsonSchema;
use serde::Deserialize;

/// Text answers in order, each reporting 20 prompt and 5 completion tokens.
fn replies(texts: &[&str]) -> ScriptedBackend {
    texts
        .iter()
        .fold(ScriptedBackend::new(), |b, t| b.reply_with_usage(t, 20, 5))
}

#[derive(Deserialize, JsonSchema)]
struct NoArgs {}

fn dice_tools() -> ToolSet {
    ToolSet::new().with(FnTool::new(
        ToolDef::new("roll_dice", "Roll a six-sided die", json_schema_for::<NoArgs>()),
        |_: NoArgs| async { "6".to_string() },
    ))
}

// ── Conversation continuity ──────────────────────────────────────────

#[tokio::test]
async fn three_turns_survive_a_save_and_reload() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("history").join("chat.json");
    let backend = replies(&["Paris.", "About 2.1 million.", "The Seine."]);
    let agent = Agent::new(
        &backend,
        AgentConfig::new("gpt-4o-mini").with_system_prompt("Answer briefly."),
    );

    let first = agent.run("Capital of France?", &[]).await.unwrap();
    save_log(&path, first.all_messages()).unwrap();

    let restored = load_log(&path).unwrap();
    assert_eq!(restored, first.all_messages());

    let second = agent.run("Population?", &restored).await.unwrap();
    let third = agent.run("Which river?", second.all_messages()).await.unwrap();

    assert_eq!(third.output, "The Seine.");
    assert_eq!(third.all_messages().len(), 6);
    assert_eq!(third.new_message_index(), 4);

    // The last request carried the whole conversation with one system message.
    let last = backend.requests().pop().unwrap();
    assert_eq!(last.messages.len(), 6);
    assert_eq!(last.messages[0].role, MessageRole::System);
    assert_eq!(
        last.messages
            .iter()
            .filter(|m| m.role == MessageRole::System)
            .count(),
        1
    );
}

// ── Windows ──────────────────────────────────────────────────────────

#[tokio::test]
async fn tool_safe_window_keeps_call_and_return_together() {
    let backend = ScriptedBackend::new()
        .tool_calls(vec![ToolCall::new("call_a", "roll_dice", "{}")])
        .reply("You rolled a 6.")
        .reply("Still a 6.");
    let tools = dice_tools();
    let first_agent = Agent::new(&backend, AgentConfig::new("m")).with_tools(&tools);
    let first = first_agent.run("Roll a die", &[]).await.unwrap();
    assert_eq!(first.all_messages().len(), 4);

    // Without widening, the last 3 messages start at the orphaned tool return.
    let mut extended = first.all_messages().to_vec();
    extended.push(ModelMessage::user("What was it again?"));
    assert!(matches!(
        validate_for_inference(keep_last_n(&extended, 3)),
        Err(HistoryError::OrphanToolReturn { .. })
    ));

    let second_agent = Agent::new(&backend, AgentConfig::new("m"))
        .with_tools(&tools)
        .with_history_processor(KeepLastToolSafe(3));
    let second = second_agent
        .run("What was it again?", first.all_messages())
        .await
        .unwrap();
    assert_eq!(second.output, "Still a 6.");

    let sent = backend.requests().pop().unwrap();
    // Widened to tool call, tool return, answer, new prompt.
    assert_eq!(sent.messages.len(), 4);
    assert_eq!(sent.messages[0].role, MessageRole::Assistant);
    assert_eq!(sent.messages[1].role, MessageRole::Tool);
}

#[tokio::test]
async fn token_guard_collapses_to_latest_prompt() {
    let history = vec![
        ModelMessage::user("A long question about the weather in Kraków"),
        ModelMessage::assistant("A long answer about rain and wind"),
    ];
    let counter = std::sync::Arc::new(TokenCounter::new());
    counter.add(5_000);

    let backend = replies(&["Short."]);
    let agent = Agent::new(&backend, AgentConfig::new("m"))
        .with_history_processor(ContextGuard::new(counter.clone(), 1_000));
    let result = agent.run("Summarize", &history).await.unwrap();

    assert_eq!(result.all_messages().len(), 4);
    let sent = backend.requests().pop().unwrap();
    assert_eq!(sent.messages.len(), 1);
    assert_eq!(sent.messages[0].text(), Some("Summarize"));
}

#[tokio::test]
async fn response_only_window_is_rejected_before_sending() {
    let backend = replies(&["unused"]);
    let agent = Agent::new(&backend, AgentConfig::new("m"))
        .with_history_processor(RoleFilter::responses_only());
    let history = vec![ModelMessage::user("Hi"), ModelMessage::assistant("Hello")];

    let err = agent.run("Again", &history).await.unwrap_err();
    assert!(matches!(err, Error::History(HistoryError::EndsWithResponse { .. })));
    assert_eq!(err.kind(), ErrorKind::Usage);
    assert!(backend.requests().is_empty());
}

// ── Structured output ────────────────────────────────────────────────

#[derive(Deserialize, JsonSchema, Debug)]
struct Sentiment {
    sentiment: String,
    confidence: f64,
}

#[tokio::test]
async fn typed_output_parses_fenced_json() {
    let backend = ScriptedBackend::new()
        .reply("```json\n{\"sentiment\": \"positive\", \"confidence\": 0.92}\n```");
    let agent = Agent::new(&backend, AgentConfig::new("m"));
    let result = agent
        .run_output::<Sentiment>("Great product!", &[])
        .await
        .unwrap();
    assert_eq!(result.output.sentiment, "positive");
    assert!((result.output.confidence - 0.92).abs() < 1e-9);

    let sent = backend.requests();
    assert!(sent[0].response_format.is_some());
}

#[tokio::test]
async fn label_outside_the_set_is_a_validation_error() {
    let labels = LabelSet::new("priority", ["urgent", "high", "medium", "low"]).unwrap();
    let backend = ScriptedBackend::new()
        .reply(r#"{"category": "critical", "reasoning": "The server is down for everyone."}"#);
    let agent = Agent::new(
        &backend,
        AgentConfig::new("m").with_system_prompt(labels.system_prompt()),
    );
    let err = agent
        .run_with_schema("Server down!", &[], &labels.output_schema())
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Validation);
    let Error::Schema(schema_err) = err else {
        panic!("expected a schema error");
    };
    assert!(schema_err.at("/category").is_some());
}

// ── Archive ──────────────────────────────────────────────────────────

#[tokio::test]
async fn archive_keeps_answers_with_usage_across_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("conversations.json");
    let backend = replies(&["4", "9"]);
    let agent = Agent::new(&backend, AgentConfig::new("gpt-4o-mini"));

    {
        let mut archive = ConversationArchive::open(&path).unwrap();
        for question in ["2 + 2?", "3 * 3?"] {
            let result = agent.run(question, &[]).await.unwrap();
            archive
                .add(question, &result.output, "gpt-4o-mini", result.usage.clone())
                .unwrap();
        }
    }

    let archive = ConversationArchive::open(&path).unwrap();
    assert_eq!(archive.len(), 2);
    let second = archive.get(2).unwrap();
    assert_eq!(second.question, "3 * 3?");
    assert_eq!(second.answer, "9");
    assert_eq!(second.usage.input_tokens, 20);
    assert_eq!(second.usage.output_tokens, 5);
}

// ── Fan-out ──────────────────────────────────────────────────────────

#[tokio::test]
async fn fan_out_over_agent_runs_keeps_input_order() {
    let backend = replies(&["a", "b", "c"]);
    let agent = Agent::new(&backend, AgentConfig::new("m"));
    let fan = FanOut::new(1).unwrap();

    let outputs = fan
        .run(["one", "two", "three"], |_, prompt| {
            let agent = &agent;
            async move { agent.run(prompt, &[]).await.map(|r| r.output) }
        })
        .await
        .unwrap();
    assert_eq!(outputs, vec!["a", "b", "c"]);
}
