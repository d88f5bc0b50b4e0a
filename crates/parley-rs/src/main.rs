//! Send one prompt to a chat model and print the answer.
//!
//! Keys and base URLs come from the environment or a `.env` file in the
//! working directory (`OPENROUTER_KEY`, `OPENAI_API_KEY`, `OLLAMA_BASE_URL`).
//!
//! # Examples
//!
//! ```sh
//! # Basic request
//! parley --user "Tell me a joke"
//!
//! # Provider-qualified model, system prompt and sampling
//! parley --model openai:gpt-4o --system "You are terse." \
//!   --user "Explain borrowing" --temperature 0.3
//!
//! # Pipe content from stdin, ask for JSON
//! cat review.txt | parley --system "Rate this review." --stdin --json
//!
//! # Keep a conversation on disk, resending only the last 6 messages
//! parley --history chat.json --keep-last 6 --tool-safe --user "And then?"
//! ```

use clap::Parser;
use parley_rs::agent::{Agent, AgentConfig, Prompt};
use parley_rs::history::{
    CharRatioEstimator, ContextGuard, HistoryProcessor, KeepLastN, KeepLastToolSafe, ModelMessage,
    RoleFilter, TokenCounter, estimate_messages, load_log, save_log,
};
use parley_rs::{ChatClient, ClientConfig, Error, ModelRef, ReasoningEffort, Settings};
use std::io::{self, Read};
use std::path::PathBuf;
use std::process;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

/// Send a prompt to a chat completion API and print the answer.
#[derive(Parser)]
#[command(name = "parley", version)]
struct Cli {
    // ── Message content ────────────────────────────────────────
    /// System prompt (sent only when the conversation is new)
    #[arg(long)]
    system: Option<String>,

    /// User message to send
    #[arg(long)]
    user: Option<String>,

    /// Read user content from stdin
    #[arg(long)]
    stdin: bool,

    /// Attach a JPEG or PNG image
    #[arg(long)]
    image: Vec<PathBuf>,

    // ── Model selection ────────────────────────────────────────
    /// Model as `provider:name` (openrouter, openai, ollama); bare names use OpenRouter
    #[arg(long, default_value = parley_rs::DEFAULT_MODEL, value_parser = parse_model)]
    model: ModelRef,

    // ── Sampling parameters ────────────────────────────────────
    /// Sampling temperature (0.0 = deterministic, 2.0 = very creative)
    #[arg(long)]
    temperature: Option<f32>,

    /// Nucleus sampling threshold (0.0 – 1.0)
    #[arg(long)]
    top_p: Option<f32>,

    /// Reasoning effort: minimal, low, medium or high
    #[arg(long)]
    reasoning_effort: Option<ReasoningEffort>,

    // ── Output control ─────────────────────────────────────────
    /// Maximum tokens in the response
    #[arg(long, default_value_t = parley_rs::DEFAULT_MAX_TOKENS)]
    max_tokens: u32,

    /// Stop sequence(s)
    #[arg(long)]
    stop: Vec<String>,

    /// Request JSON-formatted output
    #[arg(long)]
    json: bool,

    /// Seed for deterministic sampling
    #[arg(long)]
    seed: Option<u64>,

    /// Print token usage and estimated cost to stderr
    #[arg(long)]
    usage: bool,

    // ── History ────────────────────────────────────────────────
    /// Continue the conversation stored in this JSON file (updated in place)
    #[arg(long)]
    history: Option<PathBuf>,

    /// Write the updated conversation here instead of back to --history
    #[arg(long)]
    save_history: Option<PathBuf>,

    /// Resend only the last N messages
    #[arg(long)]
    keep_last: Option<usize>,

    /// With --keep-last, widen the window so tool calls keep their results
    #[arg(long)]
    tool_safe: bool,

    /// Resend only user messages
    #[arg(long)]
    user_only: bool,

    /// Collapse to the latest message once the history estimate reaches N tokens
    #[arg(long)]
    token_threshold: Option<u64>,

    // ── Transport ──────────────────────────────────────────────
    /// Retries for rate limits, 5xx and network errors
    #[arg(long, default_value_t = 2)]
    retries: u32,

    /// HTTP timeout in seconds
    #[arg(long)]
    timeout_secs: Option<u64>,
}

fn parse_model(s: &str) -> Result<ModelRef, String> {
    if s.trim().is_empty() {
        return Err("model name is empty".into());
    }
    Ok(ModelRef::parse(s))
}

// ── Helpers ────────────────────────────────────────────────────────

fn build_prompt(cli: &Cli) -> Result<Prompt, Error> {
    let piped = if cli.stdin {
        let mut buf = String::new();
        io::stdin().read_to_string(&mut buf)?;
        Some(buf)
    } else {
        None
    };

    let text = match (&cli.user, piped) {
        (Some(msg), Some(piped)) => format!("{msg}\n\n{piped}"),
        (Some(msg), None) => msg.clone(),
        (None, Some(piped)) => piped,
        (None, None) if !cli.image.is_empty() => String::new(),
        (None, None) => {
            return Err(Error::config("user", "provide --user, --stdin, or both"));
        }
    };

    let mut prompt = Prompt::new(text);
    for path in &cli.image {
        let bytes = std::fs::read(path)?;
        let media_type = match path.extension().and_then(|e| e.to_str()) {
            Some("png") => "image/png",
            _ => "image/jpeg",
        };
        prompt = prompt.with_image(media_type, &bytes);
    }
    Ok(prompt)
}

fn build_processors(cli: &Cli, history: &[ModelMessage]) -> Vec<Box<dyn HistoryProcessor>> {
    let mut processors: Vec<Box<dyn HistoryProcessor>> = Vec::new();
    if cli.user_only {
        processors.push(Box::new(RoleFilter::requests_only()));
    }
    if let Some(n) = cli.keep_last {
        if cli.tool_safe {
            processors.push(Box::new(KeepLastToolSafe(n)));
        } else {
            processors.push(Box::new(KeepLastN(n)));
        }
    }
    if let Some(threshold) = cli.token_threshold {
        let counter = Arc::new(TokenCounter::new());
        counter.add(estimate_messages(&CharRatioEstimator::default(), history));
        processors.push(Box::new(ContextGuard::new(counter, threshold)));
    }
    processors
}

async fn send_request(cli: &Cli) -> Result<String, Error> {
    let settings = Settings::load();
    let mut client_config = ClientConfig::for_provider(cli.model.provider, &settings)?;
    if let Some(secs) = cli.timeout_secs {
        client_config = client_config.with_timeout(Duration::from_secs(secs));
    }
    let client = ChatClient::new(client_config)?;

    let prompt = build_prompt(cli)?;
    let history = match &cli.history {
        Some(path) if path.exists() => load_log(path)?,
        _ => Vec::new(),
    };

    let mut config = AgentConfig::new(cli.model.name.clone())
        .with_max_tokens(cli.max_tokens)
        .with_json_mode(cli.json)
        .with_stop(cli.stop.clone())
        .with_retries(cli.retries);
    if let Some(system) = &cli.system {
        config = config.with_system_prompt(system);
    }
    if let Some(t) = cli.temperature {
        config = config.with_temperature(t);
    }
    if let Some(p) = cli.top_p {
        config = config.with_top_p(p);
    }
    if let Some(seed) = cli.seed {
        config = config.with_seed(seed);
    }
    if let Some(effort) = cli.reasoning_effort {
        config = config.with_reasoning_effort(effort);
    }

    let mut agent = Agent::new(&client, config);
    for processor in build_processors(cli, &history) {
        agent = agent.with_history_processor(processor);
    }

    let result = agent.run(prompt, &history).await?;

    if let Some(path) = cli.save_history.as_ref().or(cli.history.as_ref()) {
        save_log(path, result.all_messages())?;
        eprintln!(
            "  Saved {} message(s) to {}",
            result.all_messages().len(),
            path.display()
        );
    }
    if cli.usage {
        eprintln!("  {}", result.usage.summary(&cli.model.name));
    }

    Ok(result.output)
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("parley_rs=info")),
        )
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();

    match send_request(&cli).await {
        Ok(response) => println!("{response}"),
        Err(e) => {
            eprintln!("Error: {e}");
            process::exit(1);
        }
    }
}
