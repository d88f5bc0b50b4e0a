//! Conversation history walkthrough.
//!
//! Steps, in the order they build on each other:
//!
//! 1. [`inspect`]: one run, its history as JSON and as messages.
//! 2. [`continue_conversation`]: a follow-up that needs the first answer.
//! 3. [`usage`]: four turns ending in a summary, saved to `output_3.json`.
//! 4. [`filter`]: resend only user messages; model-only fails validation.
//! 5. [`fixed`]: resend only the last three messages.
//! 6. [`dynamic`]: collapse the window once a token estimate passes a threshold.
//! 7. [`tools`]: naive vs tool-safe truncation with a dice tool.
//! 8. [`archive`]: keep question/answer records in a JSON archive.
//!
//! Steps 4 and 5 read the file step 3 writes.

use parley_rs::agent::{Agent, AgentConfig};
use parley_rs::history::{
    CharRatioEstimator, ContextGuard, ConversationArchive, ConversationRecord, HistoryProcessor,
    KeepLastN, KeepLastToolSafe, MessageKind, ModelMessage, RoleFilter, TokenCounter, load_log,
    save_log,
};
use parley_rs::sink::ConsoleSink;
use parley_rs::tools::{FnTool, ToolSet};
use parley_rs::{ChatBackend, Error, ToolDef, json_schema_for};
use rand::Rng;
use schemars::JsonSchema;
use serde::Deserialize;
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};

/// File step 3 writes and steps 4 and 5 read.
pub const SAVED_HISTORY: &str = "output_3.json";

const HELPFUL: &str = "Be a helpful assistant";
const SUMMARIZE: &str = "Please summarize the whole chat history until now.";

fn print_messages(messages: &[ModelMessage]) {
    println!("Total messages: {}", messages.len());
    for (idx, message) in messages.iter().enumerate() {
        let kind = match message.kind() {
            MessageKind::Request => "request",
            MessageKind::Response => "response",
        };
        println!("\nMessage #{} ({kind}):", idx + 1);
        println!("{message:#?}");
    }
}

// ── 1. Inspect ──────────────────────────────────────────────────────

pub async fn inspect(backend: &dyn ChatBackend, model: &str) -> Result<Vec<ModelMessage>, Error> {
    let agent = Agent::new(backend, AgentConfig::new(model).with_system_prompt(HELPFUL));
    let prompt = "Tell me a funny joke. Respond in plain text.";
    let result = agent.run(prompt, &[]).await?;
    println!("Prompt: {prompt}\nAnswer: {}", result.output);

    crate::heading("\nHistory as JSON");
    println!("{}", result.all_messages_json()?);

    crate::heading("\nHistory as messages");
    print_messages(result.all_messages());
    Ok(result.into_messages())
}

// ── 2. Continue ─────────────────────────────────────────────────────

pub async fn continue_conversation(
    backend: &dyn ChatBackend,
    model: &str,
) -> Result<Vec<ModelMessage>, Error> {
    let agent = Agent::new(backend, AgentConfig::new(model).with_system_prompt(HELPFUL));

    let prompt_1 = "Provide a really, really funny joke. Respond in plain text.";
    let first = agent.run(prompt_1, &[]).await?;
    crate::heading("Turn 1");
    println!("Prompt: {prompt_1}\nAnswer: {}", first.output);

    let prompt_2 = "I didn't get it. Care to explain?";
    let second = agent.run(prompt_2, first.new_messages()).await?;
    crate::heading("\nTurn 2");
    println!("Prompt: {prompt_2}\nAnswer: {}", second.output);

    crate::heading("\nComplete conversation history");
    print_messages(second.all_messages());
    Ok(second.into_messages())
}

// ── 3. Usage ────────────────────────────────────────────────────────

pub const USAGE_PROMPTS: [&str; 4] = [
    "Provide me with a good motto for today!",
    "Why did you choose this one? Please explain it a bit more.",
    "Wow, thanks a lot! How about another one for my friend?",
    "Please summarize the whole conversation until this message. \
     Point out key topics and provide a timeline of events from this conversation.",
];

/// Four turns, each continuing the last, then save the log to `save_path`.
pub async fn usage(
    backend: &dyn ChatBackend,
    model: &str,
    save_path: &Path,
) -> Result<Vec<ModelMessage>, Error> {
    let agent = Agent::new(backend, AgentConfig::new(model).with_system_prompt(HELPFUL));

    let mut history: Vec<ModelMessage> = Vec::new();
    for (i, prompt) in USAGE_PROMPTS.iter().enumerate() {
        let result = agent.run(*prompt, &history).await?;
        crate::heading(&format!("\nTurn {}", i + 1));
        println!("Answer: {}", result.output);
        history = result.into_messages();
    }

    crate::heading("\nComplete history");
    print_messages(&history);

    save_log(save_path, &history)?;
    info!("History saved to {}", save_path.display());
    Ok(history)
}

// ── 4. Filter ───────────────────────────────────────────────────────

/// Summaries over filtered windows of a saved log.
#[derive(Debug)]
pub struct FilterOutcome {
    pub user_only: String,
    /// The model-only attempt; expected to fail.
    pub model_only: Result<String, Error>,
}

pub async fn filter(
    backend: &dyn ChatBackend,
    model: &str,
    history_path: &Path,
) -> Result<FilterOutcome, Error> {
    let history = load_log(history_path)?;
    info!("Historical conversation loaded ({} messages)", history.len());

    crate::heading("Filtering: user messages only");
    let agent_user = Agent::new(backend, AgentConfig::new(model))
        .with_history_processor(RoleFilter::requests_only());
    let user_only = agent_user.run(SUMMARIZE, &history).await?.output;
    println!("Summary (user messages only):\n{user_only}");

    crate::heading("\nFiltering: model messages only");
    let agent_model = Agent::new(backend, AgentConfig::new(model))
        .with_history_processor(RoleFilter::responses_only());
    let model_only = agent_model
        .run(SUMMARIZE, &history)
        .await
        .map(|r| r.output);
    match &model_only {
        Ok(summary) => println!("Summary (model messages only):\n{summary}"),
        Err(e) => {
            println!("Error: {e}");
            warn!(
                "This failed as expected: a history must end with a request, \
                 and keeping only responses removes the new prompt."
            );
        }
    }

    Ok(FilterOutcome {
        user_only,
        model_only,
    })
}

// ── 5. Fixed window ─────────────────────────────────────────────────

pub async fn fixed(
    backend: &dyn ChatBackend,
    model: &str,
    history_path: &Path,
) -> Result<String, Error> {
    let history = load_log(history_path)?;
    info!("Total messages in history: {}", history.len());

    crate::heading("Agent with fixed message limit (last 3)");
    let agent = Agent::new(backend, AgentConfig::new(model)).with_history_processor(KeepLastN(3));
    let answer = agent
        .run("What were we talking about?", &history)
        .await?
        .output;
    println!("Answer (with truncated history):\n{answer}");
    Ok(answer)
}

// ── 6. Dynamic window ───────────────────────────────────────────────

/// Kept low so the guard trips within three short turns.
pub const DEMO_TOKEN_THRESHOLD: u64 = 100;

pub const DYNAMIC_PROMPTS: [&str; 3] = [
    "Tell me who you are",
    "What are the most exceptional skills you possess? List at least 4 of them.",
    "What were we talking about??",
];

/// Three turns under a token guard. Returns the counter reading before each
/// turn.
pub async fn dynamic(backend: &dyn ChatBackend, model: &str) -> Result<Vec<u64>, Error> {
    let counter = Arc::new(TokenCounter::new());
    let estimator = CharRatioEstimator::default();
    let agent = Agent::new(
        backend,
        AgentConfig::new(model).with_system_prompt("You are a helpful and concise assistant."),
    )
    .with_history_processor(ContextGuard::new(counter.clone(), DEMO_TOKEN_THRESHOLD));

    crate::heading("Agent with dynamic token-based context guard");
    let mut readings = Vec::with_capacity(DYNAMIC_PROMPTS.len());
    let mut history: Vec<ModelMessage> = Vec::new();
    for (i, prompt) in DYNAMIC_PROMPTS.iter().enumerate() {
        let before = counter.get();
        readings.push(before);
        info!("Current token usage: {before}");
        if before >= DEMO_TOKEN_THRESHOLD {
            info!("Token threshold reached, trimming historical dialogue");
        }

        let result = agent.run(*prompt, &history).await?;
        crate::heading(&format!("\nTurn {}", i + 1));
        println!("Answer: {}", result.output);

        counter.record_messages(&estimator, result.all_messages());
        println!("Tokens after turn {}: {}", i + 1, counter.get());
        history = result.into_messages();
    }
    Ok(readings)
}

// ── 7. Tools ────────────────────────────────────────────────────────

#[derive(Deserialize, JsonSchema)]
struct NoArgs {}

fn dice_tools() -> ToolSet {
    ToolSet::new().with(FnTool::new(
        ToolDef::new(
            "throw_dice",
            "Roll a die and return a random number between 1 and 6",
            json_schema_for::<NoArgs>(),
        ),
        |_: NoArgs| {
            let value: u8 = rand::thread_rng().gen_range(1..=6);
            async move { value.to_string() }
        },
    ))
}

pub const TOOL_PROMPTS: [&str; 2] = [
    "Please provide a random number",
    "Okay, let's do this one more time!",
];

/// Two turns with a tool under `processor`. Returns the final history
/// length.
async fn tool_conversation(
    backend: &dyn ChatBackend,
    model: &str,
    tools: &ToolSet,
    processor: impl HistoryProcessor,
) -> Result<usize, Error> {
    let agent = Agent::new(
        backend,
        AgentConfig::new(model).with_system_prompt("You are a helpful and playful assistant"),
    )
    .with_tools(tools)
    .with_history_processor(processor);

    let mut history: Vec<ModelMessage> = Vec::new();
    for prompt in TOOL_PROMPTS {
        let result = agent.run(prompt, &history).await?;
        println!("{prompt} -> {}", result.output);
        history = result.into_messages();
    }

    println!("\nTotal messages in history: {}", history.len());
    for (idx, message) in history.iter().enumerate() {
        let text = message.text();
        let shown = if text.is_empty() {
            message
                .parts()
                .first()
                .map(|p| p.label().to_string())
                .unwrap_or_else(|| "(no content)".into())
        } else {
            text
        };
        println!("Message #{}: {shown}", idx + 1);
    }
    Ok(history.len())
}

/// Run the dice conversation with naive, then tool-safe truncation to the
/// last three messages.
pub async fn tools(
    backend: &dyn ChatBackend,
    model: &str,
) -> Result<Vec<(&'static str, Result<usize, Error>)>, Error> {
    let tools = dice_tools();
    let mut outcomes = Vec::with_capacity(2);

    crate::heading("History processor: keep last 3");
    let naive = tool_conversation(backend, model, &tools, KeepLastN(3)).await;
    if let Err(e) = &naive {
        println!("Agent failed: {e}");
        warn!(
            "Slicing split a tool call from its result, so the window was rejected \
             before sending. The tool-safe window avoids this."
        );
    }
    outcomes.push(("keep_last", naive));

    crate::heading("\nHistory processor: keep last 3, tool-safe");
    let safe = tool_conversation(backend, model, &tools, KeepLastToolSafe(3)).await;
    if let Err(e) = &safe {
        println!("Agent failed: {e}");
    }
    outcomes.push(("keep_last_tool_safe", safe));

    Ok(outcomes)
}

// ── 8. Archive ──────────────────────────────────────────────────────

/// Ask one question, archive the exchange, and print every record.
pub async fn archive(
    backend: &dyn ChatBackend,
    model: &str,
    archive_path: &Path,
) -> Result<Vec<ConversationRecord>, Error> {
    let agent = Agent::new(
        backend,
        AgentConfig::new(model)
            .with_system_prompt("You are a helpful assistant. Respond concisely and clearly."),
    );

    let prompt = "What are the three key benefits of learning Python?";
    let result = agent.run(prompt, &[]).await?;
    println!("Prompt: {prompt}\nAnswer: {}", result.output);

    let model_used = result
        .all_messages()
        .last()
        .and_then(ModelMessage::model_name)
        .unwrap_or(model)
        .to_string();
    let mut archive = ConversationArchive::open(archive_path)?;
    let id = archive
        .add(prompt, &result.output, model_used, result.usage.clone())?
        .id;
    info!("Conversation saved with id {id}");

    ConsoleSink.print(
        &format!("\nAll conversations ({}):", archive.len()),
        archive.all(),
    )?;
    Ok(archive.all().to_vec())
}
