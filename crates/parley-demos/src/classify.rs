//! Classification into label sets chosen at runtime.
//!
//! The same code serves any number of classes: the output schema is built
//! from the labels when the call is made, so an answer outside the set is a
//! validation error rather than a silently accepted string.

use parley_rs::agent::{Agent, AgentConfig};
use parley_rs::schema::{Classification, LabelSet};
use parley_rs::{ChatBackend, Error};

pub struct Example {
    pub title: &'static str,
    pub text: &'static str,
    pub domain: &'static str,
    pub labels: &'static [&'static str],
}

pub const EXAMPLES: [Example; 3] = [
    Example {
        title: "5-Way Emotion",
        text: "I can't believe they cancelled my flight without notice!",
        domain: "emotion",
        labels: &["joy", "sadness", "anger", "fear", "neutral"],
    },
    Example {
        title: "Support Priority",
        text: "My account has been hacked and I can't access my funds!",
        domain: "priority",
        labels: &["critical", "high", "medium", "low"],
    },
    Example {
        title: "News Category",
        text: "Scientists discover new exoplanet with potential for life.",
        domain: "category",
        labels: &[
            "science",
            "politics",
            "sports",
            "entertainment",
            "business",
            "technology",
        ],
    },
];

/// Classify `text` into one of `labels`.
pub async fn classify(
    backend: &dyn ChatBackend,
    model: &str,
    text: &str,
    labels: &LabelSet,
) -> Result<Classification, Error> {
    let agent = Agent::new(
        backend,
        AgentConfig::new(model).with_system_prompt(labels.system_prompt()),
    );
    let schema = labels.output_schema();
    let result = agent.run_with_schema(text, &[], &schema).await?;
    Ok(schema.deserialize(&result.output)?)
}

/// Run the three examples and print each answer.
pub async fn run(backend: &dyn ChatBackend, model: &str) -> Result<Vec<Classification>, Error> {
    crate::heading("Dynamic Classification\n\nSame code adapts to any number of classes at runtime");

    let mut answers = Vec::with_capacity(EXAMPLES.len());
    for (i, example) in EXAMPLES.iter().enumerate() {
        let labels = LabelSet::new(example.domain, example.labels.iter().copied())?;
        println!("\nExample {}: {}", i + 1, example.title);
        println!("Classes ({}): {}", labels.labels().len(), labels.labels().join(", "));
        println!("Text: {}", example.text);

        let answer = classify(backend, model, example.text, &labels).await?;
        println!("\nResult: {}", answer.category);
        println!("Reasoning: {}", answer.reasoning);
        crate::separator();
        answers.push(answer);
    }
    Ok(answers)
}
