//! Run one of the demonstrations.
//!
//! ```sh
//! parley-demos sentiment
//! parley-demos --model openrouter:openai/gpt-5 reasoning
//! parley-demos history usage --file output_3.json
//! parley-demos history fixed --file output_3.json
//! parley-demos ocr structured --samples ./files/samples --concurrency 3
//! parley-demos tools
//! ```
//!
//! Keys come from the environment or `.env` (`OPENAI_API_KEY`,
//! `OPENROUTER_KEY`, `OLLAMA_BASE_URL`, `WEATHER_API_KEY`).

use clap::{Parser, Subcommand, ValueEnum};
use parley_demos::ocr::{self, Mode, PdftoppmRenderer};
use parley_demos::tools::{DEFAULT_TOOLS_MODEL, DemoToolsExt};
use parley_demos::{DemoConfig, classify, connect, history, reasoning, sentiment, temperature, tools};
use parley_rs::tools::ToolSet;
use parley_rs::{Error, ModelRef, Settings};
use std::io;
use std::path::PathBuf;
use std::process;
use std::time::Instant;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "parley-demos", version, about = "LLM walkthroughs on parley-rs")]
struct Cli {
    /// Model as `provider:name` (openrouter, openai, ollama)
    #[arg(long, global = true, value_parser = parse_model)]
    model: Option<ModelRef>,

    #[command(subcommand)]
    demo: Demo,
}

#[derive(Subcommand)]
enum Demo {
    /// Classify reviews into positive, negative or neutral and score accuracy
    Sentiment,
    /// Classify texts against label sets chosen at runtime
    Classify,
    /// Compare reasoning effort levels on a puzzle and a routing problem
    Reasoning,
    /// Compare sampling temperatures on a story opening
    Temperature,
    /// Conversation history handling
    History {
        #[arg(value_enum)]
        step: HistoryStep,

        /// Saved conversation log (usage writes it, filter and fixed read it)
        /// or the archive file for `archive`
        #[arg(long)]
        file: Option<PathBuf>,
    },
    /// OCR over every PDF in the samples directory
    Ocr {
        #[arg(value_enum)]
        mode: OcrMode,

        /// Directory with PDF files
        #[arg(long)]
        samples: Option<PathBuf>,

        /// Directory for rendered page images
        #[arg(long)]
        pages: Option<PathBuf>,

        /// Directory for result JSON files
        #[arg(long)]
        results: Option<PathBuf>,

        /// Pages analysed at once
        #[arg(long)]
        concurrency: Option<usize>,
    },
    /// Dice and weather tools over three turns
    Tools,
}

#[derive(Clone, Copy, ValueEnum)]
enum HistoryStep {
    Inspect,
    Continue,
    Usage,
    Filter,
    Fixed,
    Dynamic,
    Tools,
    Archive,
}

#[derive(Clone, Copy, ValueEnum)]
enum OcrMode {
    Basic,
    Structured,
    Validate,
}

const DEFAULT_ARCHIVE: &str = "conversations.json";

fn parse_model(s: &str) -> Result<ModelRef, String> {
    if s.trim().is_empty() {
        return Err("model name is empty".into());
    }
    Ok(ModelRef::parse(s))
}

async fn run(cli: Cli) -> Result<(), Error> {
    let settings = Settings::load();
    let default_model = match cli.demo {
        Demo::Tools => DEFAULT_TOOLS_MODEL,
        _ => parley_rs::DEFAULT_MODEL,
    };
    let mut config = DemoConfig::default()
        .with_model(cli.model.unwrap_or_else(|| ModelRef::parse(default_model)));

    // Validation runs locally and needs no client.
    if let Demo::Ocr {
        mode: OcrMode::Validate,
        ..
    } = cli.demo
    {
        ocr::validation();
        return Ok(());
    }

    // Every required key is checked before the first request.
    let toolset = match cli.demo {
        Demo::Tools => Some(ToolSet::new().with_demo_tools(&settings)?),
        _ => None,
    };
    let client = connect(&config.model, &settings)?;
    let model = config.model_name().to_string();
    info!("Using {}", config.model);

    match cli.demo {
        Demo::Sentiment => {
            sentiment::run(&client, &model).await?;
        }
        Demo::Classify => {
            classify::run(&client, &model).await?;
        }
        Demo::Reasoning => {
            reasoning::run(&client, &model).await?;
        }
        Demo::Temperature => {
            temperature::run(&client, &model).await?;
        }
        Demo::History { step, file } => {
            let log = file
                .clone()
                .unwrap_or_else(|| PathBuf::from(history::SAVED_HISTORY));
            match step {
                HistoryStep::Inspect => {
                    history::inspect(&client, &model).await?;
                }
                HistoryStep::Continue => {
                    history::continue_conversation(&client, &model).await?;
                }
                HistoryStep::Usage => {
                    history::usage(&client, &model, &log).await?;
                }
                HistoryStep::Filter => {
                    history::filter(&client, &model, &log).await?;
                }
                HistoryStep::Fixed => {
                    history::fixed(&client, &model, &log).await?;
                }
                HistoryStep::Dynamic => {
                    history::dynamic(&client, &model).await?;
                }
                HistoryStep::Tools => {
                    history::tools(&client, &model).await?;
                }
                HistoryStep::Archive => {
                    let path = file.unwrap_or_else(|| PathBuf::from(DEFAULT_ARCHIVE));
                    history::archive(&client, &model, &path).await?;
                }
            }
        }
        Demo::Ocr {
            mode,
            samples,
            pages,
            results,
            concurrency,
        } => {
            if let Some(dir) = samples {
                config.samples_dir = dir;
            }
            if let Some(dir) = pages {
                config.pages_dir = dir;
            }
            if let Some(dir) = results {
                config.results_dir = dir;
            }
            if let Some(n) = concurrency {
                config.concurrency = n;
            }
            let mode = match mode {
                OcrMode::Structured => Mode::Structured,
                _ => Mode::Basic,
            };

            let start = Instant::now();
            let written =
                ocr::process_documents(&client, &config, mode, &PdftoppmRenderer::default())
                    .await?;
            println!(
                "Analysis took: {:.1} seconds ({} file(s) written)",
                start.elapsed().as_secs_f64(),
                written.len()
            );
        }
        Demo::Tools => {
            let toolset = toolset.unwrap_or_default();
            tools::run(&client, &model, &toolset).await?;
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("parley_rs=info,parley_demos=info")),
        )
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();
    if let Err(e) = run(cli).await {
        eprintln!("Error: {e}");
        process::exit(1);
    }
}
